use std::fmt;
use std::hash::Hash;

use crate::syntax::{Slash, Syntax};
use crate::Err;

/// Anything usable as the meaning half of a category.
pub trait Semantics: Clone + Eq + Hash + fmt::Debug + fmt::Display {}

impl<T> Semantics for T where T: Clone + Eq + Hash + fmt::Debug + fmt::Display {}

/// A syntactic category paired with an (optional) meaning. Compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category<M> {
  pub syntax: Syntax,
  pub semantics: Option<M>,
}

impl<M> Category<M> {
  pub fn new(syntax: Syntax, semantics: M) -> Self {
    Self {
      syntax,
      semantics: Some(semantics),
    }
  }

  pub fn bare(syntax: Syntax) -> Self {
    Self {
      syntax,
      semantics: None,
    }
  }

  /// The category given to skipped words
  pub fn empty() -> Self {
    Self::bare(Syntax::empty())
  }

  pub fn is_empty_category(&self) -> bool {
    self.syntax.is_empty_category()
  }
}

impl<M> fmt::Display for Category<M>
where
  M: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.semantics {
      Some(sem) => write!(f, "{} : {}", self.syntax, sem),
      None => write!(f, "{}", self.syntax),
    }
  }
}

/// The operations the parser needs from a meaning representation. The parser never
/// looks inside `M`; every combinator goes through one of these.
///
/// Implementors supply the four semantic primitives. The category-level operations are
/// provided and handle the syntactic side (slashes, unification, attribute variables).
pub trait CategoryServices<M: Semantics> {
  /// `function(argument)`, simplified. `None` on a type mismatch.
  fn apply_semantics(&self, function: &M, argument: &M) -> Option<M>;

  /// `λz1..zk. primary(secondary z1 .. zk)` for `k = order`, simplified.
  fn compose_semantics(&self, primary: &M, secondary: &M, order: usize) -> Option<M>;

  /// `λf. f(argument)`. Without a `composing_with` term, `f` returns whatever `result`
  /// denotes. With one, `f` takes the type that term yields after its first argument,
  /// so the raised term composes with it at order 1.
  fn raise_semantics(&self, argument: &M, result: &Syntax, composing_with: Option<&M>) -> Option<M>;

  fn read_semantics(&self, s: &str) -> Result<M, Err>;

  /// Application of a functor category to its argument. Slash direction is the
  /// combinator's business; vertical slashes never apply.
  fn apply(&self, function: &Category<M>, argument: &Category<M>) -> Option<Category<M>> {
    let (fsem, asem) = (function.semantics.as_ref()?, argument.semantics.as_ref()?);
    let Syntax::Complex { left, slash, right } = &function.syntax else {
      return None;
    };
    if *slash == Slash::Vertical {
      return None;
    }

    let unification = right.unify(&argument.syntax)?;
    let syntax = left.set_variable(unification.assignment.as_ref());
    let semantics = self.apply_semantics(fsem, asem)?;
    Some(Category::new(syntax, semantics))
  }

  /// Composition at `order` (1 is `X/Y Y/Z => X/Z`). Crossing composition is only
  /// defined for order 1.
  fn compose(
    &self,
    primary: &Category<M>,
    secondary: &Category<M>,
    order: usize,
    cross: bool,
  ) -> Option<Category<M>> {
    assert!(order > 0, "composition order must be at least 1, got {}", order);
    assert!(
      !cross || order == 1,
      "crossing composition is only defined for order 1"
    );

    let Syntax::Complex {
      left: yield_syntax,
      slash: primary_slash,
      right: argument_syntax,
    } = &primary.syntax
    else {
      return None;
    };
    if *primary_slash == Slash::Vertical {
      return None;
    }
    let (psem, ssem) = (primary.semantics.as_ref()?, secondary.semantics.as_ref()?);

    // peel `order` arguments off the secondary, outermost first
    let mut stack = Vec::with_capacity(order);
    let mut current = &secondary.syntax;
    for _ in 0..order {
      let Syntax::Complex { left, slash, right } = current else {
        return None;
      };
      stack.push((right.as_ref(), *slash));
      current = left.as_ref();
    }

    if order == 1 {
      let slash = stack[0].1;
      if slash == Slash::Vertical || (cross && slash == *primary_slash) {
        return None;
      }
      if !cross && slash != *primary_slash {
        return None;
      }
    }

    let unification = argument_syntax.unify(current)?;
    let new_yield = yield_syntax.set_variable(unification.assignment.as_ref());
    let semantics = self.compose_semantics(psem, ssem, order)?;

    let syntax = stack
      .into_iter()
      .rev()
      .fold(new_yield, |acc, (arg, slash)| {
        Syntax::complex(acc, slash, arg.clone())
      });
    Some(Category::new(syntax, semantics))
  }

  /// Type-raises `category` (which must unify with `argument`) over `result`:
  /// `X => T/(T\X)` when `outer` is forward, `X => T\(T/X)` when backward.
  fn raise(
    &self,
    category: &Category<M>,
    argument: &Syntax,
    result: &Syntax,
    outer: Slash,
  ) -> Option<Category<M>> {
    let syntax = raised_syntax(&category.syntax, argument, result, outer)?;
    let semantics = self.raise_semantics(category.semantics.as_ref()?, result, None)?;
    Some(Category::new(syntax, semantics))
  }

  /// Like [`CategoryServices::raise`], for a raised category that is immediately
  /// composed with `secondary`. The raised functor is typed from the secondary's
  /// meaning, so `result` needs no semantic type of its own.
  fn raise_to_compose(
    &self,
    category: &Category<M>,
    argument: &Syntax,
    result: &Syntax,
    outer: Slash,
    secondary: &Category<M>,
  ) -> Option<Category<M>> {
    let syntax = raised_syntax(&category.syntax, argument, result, outer)?;
    let semantics = self.raise_semantics(
      category.semantics.as_ref()?,
      result,
      Some(secondary.semantics.as_ref()?),
    )?;
    Some(Category::new(syntax, semantics))
  }

  /// Reads `Syntax : semantics`, or a bare `Syntax` with no meaning.
  fn read_category(&self, s: &str) -> Result<Category<M>, Err> {
    let s = s.trim();
    match s.split_once(':') {
      Some((syntax, semantics)) => Ok(Category::new(
        syntax.trim().parse()?,
        self.read_semantics(semantics.trim())?,
      )),
      None => Ok(Category::bare(s.parse()?)),
    }
  }
}

/// `T/(T\X)` or `T\(T/X)`, with `X` unified against the raised category's syntax
fn raised_syntax(syntax: &Syntax, argument: &Syntax, result: &Syntax, outer: Slash) -> Option<Syntax> {
  let unification = argument.unify(syntax)?;
  if unification.syntax.has_attribute_variable() && result.has_attribute_variable() {
    return None;
  }
  let inner = match outer {
    Slash::Forward => Slash::Backward,
    Slash::Backward => Slash::Forward,
    Slash::Vertical => panic!("invalid direction: cannot type-raise over a vertical slash"),
  };
  Some(Syntax::complex(
    result.clone(),
    outer,
    Syntax::complex(result.clone(), inner, unification.syntax),
  ))
}
