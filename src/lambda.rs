//! A small typed lambda calculus, usable as the meaning representation of a grammar.
//!
//! Terms are written the way lexicons write them:
//!
//! ```text
//! dog:e
//! (lambda $0:e (bark:<e,t> $0))
//! (lambda $0:<e,t> (lambda $1:e (and:<t,<t,t>> ($0 $1) (big:<e,t> $1))))
//! ```
//!
//! Variables are stored as de Bruijn indices, so alpha-equivalent terms compare equal.
//! Types are only checked, never inferred: every constant and binder carries its type.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::category::CategoryServices;
use crate::parse_lexicon::{
  needed_char, needed_re, optional_char, optional_re, regex_static, skip_whitespace, ParseResult,
};
use crate::syntax::Syntax;
use crate::Err;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
  Base(String),
  Function(Box<Type>, Box<Type>),
}

impl Type {
  pub fn entity() -> Self {
    Self::Base("e".to_string())
  }

  pub fn truth() -> Self {
    Self::Base("t".to_string())
  }

  pub fn function(domain: Type, range: Type) -> Self {
    Self::Function(Box::new(domain), Box::new(range))
  }

  pub fn domain(&self) -> Option<&Type> {
    match self {
      Self::Function(d, _) => Some(d),
      _ => None,
    }
  }

  pub fn range(&self) -> Option<&Type> {
    match self {
      Self::Function(_, r) => Some(r),
      _ => None,
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Base(name) => write!(f, "{}", name),
      Self::Function(d, r) => write!(f, "<{},{}>", d, r),
    }
  }
}

impl FromStr for Type {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (ty, rest) = parse_type(s.trim())?;
    if !rest.trim().is_empty() {
      return Err(format!("trailing input after type: '{}'", rest).into());
    }
    Ok(ty)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
  Const { name: String, ty: Type },
  /// de Bruijn index: 0 is the innermost enclosing binder
  Var { index: usize, ty: Type },
  Lambda { ty: Type, body: Box<Term> },
  Apply { function: Box<Term>, args: Vec<Term> },
}

impl Term {
  pub fn constant(name: &str, ty: Type) -> Self {
    Self::Const {
      name: name.to_string(),
      ty,
    }
  }

  /// The term's type, or None if it is ill-typed
  pub fn type_of(&self) -> Option<Type> {
    match self {
      Self::Const { ty, .. } | Self::Var { ty, .. } => Some(ty.clone()),
      Self::Lambda { ty, body } => Some(Type::function(ty.clone(), body.type_of()?)),
      Self::Apply { function, args } => {
        let mut ty = function.type_of()?;
        for arg in args {
          match ty {
            Type::Function(d, r) if *d == arg.type_of()? => ty = *r,
            _ => return None,
          }
        }
        Some(ty)
      }
    }
  }

  /// Adds `by` to every variable index at or above `cutoff`
  fn shifted(&self, by: isize, cutoff: usize) -> Term {
    match self {
      Self::Const { .. } => self.clone(),
      Self::Var { index, ty } if *index >= cutoff => Self::Var {
        index: (*index as isize + by) as usize,
        ty: ty.clone(),
      },
      Self::Var { .. } => self.clone(),
      Self::Lambda { ty, body } => Self::Lambda {
        ty: ty.clone(),
        body: Box::new(body.shifted(by, cutoff + 1)),
      },
      Self::Apply { function, args } => Self::Apply {
        function: Box::new(function.shifted(by, cutoff)),
        args: args.iter().map(|a| a.shifted(by, cutoff)).collect(),
      },
    }
  }

  /// Replaces variable `index` with `value`
  fn substituted(&self, index: usize, value: &Term) -> Term {
    match self {
      Self::Const { .. } => self.clone(),
      Self::Var { index: i, .. } if *i == index => value.clone(),
      Self::Var { .. } => self.clone(),
      Self::Lambda { ty, body } => Self::Lambda {
        ty: ty.clone(),
        body: Box::new(body.substituted(index + 1, &value.shifted(1, 0))),
      },
      Self::Apply { function, args } => Self::Apply {
        function: Box::new(function.substituted(index, value)),
        args: args.iter().map(|a| a.substituted(index, value)).collect(),
      },
    }
  }

  /// `(λ. body) arg`
  fn beta(body: &Term, arg: &Term) -> Term {
    body
      .substituted(0, &arg.shifted(1, 0))
      .shifted(-1, 0)
  }

  /// Beta-normal form, with nested applications flattened into one argument list
  pub fn normalize(&self) -> Term {
    match self {
      Self::Const { .. } | Self::Var { .. } => self.clone(),
      Self::Lambda { ty, body } => Self::Lambda {
        ty: ty.clone(),
        body: Box::new(body.normalize()),
      },
      Self::Apply { function, args } => {
        let mut head = function.normalize();
        let mut pending = args.iter().map(|a| a.normalize()).collect::<Vec<_>>();
        pending.reverse();
        loop {
          match head {
            Self::Lambda { ty, body } => match pending.pop() {
              Some(arg) => head = Self::beta(&body, &arg).normalize(),
              None => {
                head = Self::Lambda { ty, body };
                break;
              }
            },
            Self::Apply { function, mut args } => {
              args.extend(pending.drain(..).rev());
              pending = args;
              pending.reverse();
              head = *function;
            }
            _ => break,
          }
        }
        if pending.is_empty() {
          head
        } else {
          pending.reverse();
          Self::Apply {
            function: Box::new(head),
            args: pending,
          }
        }
      }
    }
  }

  fn fmt_at(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    match self {
      Self::Const { name, ty } => write!(f, "{}:{}", name, ty),
      Self::Var { index, .. } => write!(f, "${}", depth - 1 - index),
      Self::Lambda { ty, body } => {
        write!(f, "(lambda ${}:{} ", depth, ty)?;
        body.fmt_at(f, depth + 1)?;
        write!(f, ")")
      }
      Self::Apply { function, args } => {
        write!(f, "(")?;
        function.fmt_at(f, depth)?;
        for arg in args {
          write!(f, " ")?;
          arg.fmt_at(f, depth)?;
        }
        write!(f, ")")
      }
    }
  }
}

impl fmt::Display for Term {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.fmt_at(f, 0)
  }
}

impl FromStr for Term {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut scope = Vec::new();
    let (term, rest) = parse_term(skip_whitespace(s), &mut scope)?;
    if !skip_whitespace(rest).is_empty() {
      return Err(format!("trailing input after term: '{}'", rest).into());
    }
    if term.type_of().is_none() {
      return Err(format!("ill-typed term: {}", term).into());
    }
    Ok(term)
  }
}

fn parse_type(s: &str) -> ParseResult<'_, Type> {
  regex_static!(BASE_TYPE, r"[a-z][a-z0-9_]*");
  if let (Some(_), s) = optional_char('<', s) {
    let (domain, s) = parse_type(skip_whitespace(s))?;
    let (_, s) = needed_char(',', skip_whitespace(s))?;
    let (range, s) = parse_type(skip_whitespace(s))?;
    let (_, s) = needed_char('>', skip_whitespace(s))?;
    return Ok((Type::function(domain, range), s));
  }
  let (name, s) = needed_re(&BASE_TYPE, s).map_err(|e| format!("type: {}", e))?;
  Ok((Type::Base(name.to_string()), s))
}

/// Binders in scope, innermost last
type Scope = Vec<(String, Type)>;

fn parse_term<'a>(s: &'a str, scope: &mut Scope) -> ParseResult<'a, Term> {
  regex_static!(VARIABLE, r"\$[0-9]+");
  regex_static!(CONSTANT, r"[A-Za-z0-9_\-\.']+");
  regex_static!(LAMBDA, r"lambda\s");

  if let (Some(_), s) = optional_char('(', s) {
    let s = skip_whitespace(s);
    if let (Some(_), s) = optional_re(&LAMBDA, s) {
      let (name, s) = needed_re(&VARIABLE, skip_whitespace(s))?;
      let (_, s) = needed_char(':', s)?;
      let (ty, s) = parse_type(s)?;
      scope.push((name.to_string(), ty.clone()));
      let body = parse_term(skip_whitespace(s), scope);
      scope.pop();
      let (body, s) = body?;
      let (_, s) = needed_char(')', skip_whitespace(s))?;
      return Ok((
        Term::Lambda {
          ty,
          body: Box::new(body),
        },
        s,
      ));
    }

    let (function, mut s) = parse_term(s, scope)?;
    let mut args = Vec::new();
    loop {
      s = skip_whitespace(s);
      if let (Some(_), rest) = optional_char(')', s) {
        if args.is_empty() {
          return Err("application without arguments".into());
        }
        return Ok((
          Term::Apply {
            function: Box::new(function),
            args,
          },
          rest,
        ));
      }
      if s.is_empty() {
        return Err("unbalanced parentheses".into());
      }
      let (arg, rest) = parse_term(s, scope)?;
      args.push(arg);
      s = rest;
    }
  }

  if let (Some(name), s) = optional_re(&VARIABLE, s) {
    let position = scope
      .iter()
      .rposition(|(n, _)| n == name)
      .ok_or_else(|| format!("unbound variable {}", name))?;
    let ty = scope[position].1.clone();
    return Ok((
      Term::Var {
        index: scope.len() - 1 - position,
        ty,
      },
      s,
    ));
  }

  let (name, s) = needed_re(&CONSTANT, s).map_err(|e| format!("constant: {}", e))?;
  let (_, s) = needed_char(':', s).map_err(|e| format!("constant {} needs a type: {}", name, e))?;
  let (ty, s) = parse_type(s)?;
  Ok((Term::constant(name, ty), s))
}

/// Lambda-calculus category services. Atomic syntax labels map to semantic types,
/// which unary type-raising uses to type the raised functor.
#[derive(Debug, Clone)]
pub struct LambdaServices {
  syntax_types: HashMap<String, Type>,
}

impl Default for LambdaServices {
  fn default() -> Self {
    let property = Type::function(Type::entity(), Type::truth());
    let mut syntax_types = HashMap::new();
    syntax_types.insert("S".to_string(), Type::truth());
    syntax_types.insert("NP".to_string(), Type::entity());
    syntax_types.insert("N".to_string(), property.clone());
    syntax_types.insert("PP".to_string(), property.clone());
    syntax_types.insert("AP".to_string(), property);
    Self { syntax_types }
  }
}

impl LambdaServices {
  pub fn with_syntax_type(mut self, label: &str, ty: Type) -> Self {
    self.syntax_types.insert(label.to_string(), ty);
    self
  }

  /// The semantic type a syntactic category denotes: `X/Y` and `X\Y` are `<Y,X>`
  pub fn type_for_syntax(&self, syntax: &Syntax) -> Option<Type> {
    match syntax {
      Syntax::Atom { label, .. } => self.syntax_types.get(label).cloned(),
      Syntax::Complex { left, right, .. } => Some(Type::function(
        self.type_for_syntax(right)?,
        self.type_for_syntax(left)?,
      )),
    }
  }
}

impl CategoryServices<Term> for LambdaServices {
  fn apply_semantics(&self, function: &Term, argument: &Term) -> Option<Term> {
    match function.type_of()? {
      Type::Function(domain, _) if *domain == argument.type_of()? => Some(
        Term::Apply {
          function: Box::new(function.clone()),
          args: vec![argument.clone()],
        }
        .normalize(),
      ),
      _ => None,
    }
  }

  fn compose_semantics(&self, primary: &Term, secondary: &Term, order: usize) -> Option<Term> {
    let primary_domain = primary.type_of()?.domain()?.clone();

    let mut argument_types = Vec::with_capacity(order);
    let mut secondary_yield = secondary.type_of()?;
    for _ in 0..order {
      let Type::Function(d, r) = secondary_yield else {
        return None;
      };
      argument_types.push(*d);
      secondary_yield = *r;
    }
    if secondary_yield != primary_domain {
      return None;
    }

    // under `order` binders, the outermost argument has the highest index
    let vars = argument_types
      .iter()
      .enumerate()
      .map(|(i, ty)| Term::Var {
        index: order - 1 - i,
        ty: ty.clone(),
      })
      .collect();
    let inner = Term::Apply {
      function: Box::new(secondary.shifted(order as isize, 0)),
      args: vars,
    };
    let body = Term::Apply {
      function: Box::new(primary.shifted(order as isize, 0)),
      args: vec![inner],
    };
    let composed = argument_types
      .into_iter()
      .rev()
      .fold(body, |body, ty| Term::Lambda {
        ty,
        body: Box::new(body),
      });
    Some(composed.normalize())
  }

  fn raise_semantics(
    &self,
    argument: &Term,
    result: &Syntax,
    composing_with: Option<&Term>,
  ) -> Option<Term> {
    let argument_type = argument.type_of()?;
    let functor = match composing_with {
      Some(secondary) => secondary.type_of()?.range()?.clone(),
      None => Type::function(argument_type.clone(), self.type_for_syntax(result)?),
    };
    if functor.domain()? != &argument_type {
      return None;
    }
    Some(Term::Lambda {
      ty: functor.clone(),
      body: Box::new(Term::Apply {
        function: Box::new(Term::Var {
          index: 0,
          ty: functor,
        }),
        args: vec![argument.shifted(1, 0)],
      }),
    })
  }

  fn read_semantics(&self, s: &str) -> Result<Term, Err> {
    s.parse()
  }
}
