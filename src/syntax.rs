use std::fmt;
use std::str::FromStr;

use crate::Err;

/// Attribute value that stands for "whatever the argument carries"
pub const VARIABLE_ATTRIBUTE: &str = "x";

/// Label of the category assigned to skipped words
pub const EMPTY_LABEL: &str = "EMPTY";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Slash {
  Forward,
  Backward,
  Vertical,
}

impl fmt::Display for Slash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Forward => write!(f, "/"),
      Self::Backward => write!(f, "\\"),
      Self::Vertical => write!(f, "|"),
    }
  }
}

/// A CCG syntactic category: either an atom like `NP[pl]`, or a functor `X/Y`, `X\Y`, `X|Y`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Syntax {
  Atom {
    label: String,
    attribute: Option<String>,
  },
  Complex {
    left: Box<Syntax>,
    slash: Slash,
    right: Box<Syntax>,
  },
}

/// What the attribute variable on the unifying side was bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableAssignment {
  Bare,
  Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unification {
  pub syntax: Syntax,
  pub assignment: Option<VariableAssignment>,
}

#[derive(Debug, Default)]
struct Bindings {
  this: Option<Option<String>>,
  other: Option<Option<String>>,
}

/// Binds a variable slot, or checks it against an existing binding
fn bind(slot: &mut Option<Option<String>>, value: Option<&String>) -> bool {
  match slot {
    Some(bound) => bound.as_ref() == value,
    None => {
      *slot = Some(value.cloned());
      true
    }
  }
}

impl Syntax {
  pub fn atom(label: &str) -> Self {
    Self::Atom {
      label: label.to_string(),
      attribute: None,
    }
  }

  pub fn atom_with(label: &str, attribute: &str) -> Self {
    Self::Atom {
      label: label.to_string(),
      attribute: Some(attribute.to_string()),
    }
  }

  pub fn complex(left: Syntax, slash: Slash, right: Syntax) -> Self {
    Self::Complex {
      left: Box::new(left),
      slash,
      right: Box::new(right),
    }
  }

  pub fn empty() -> Self {
    Self::atom(EMPTY_LABEL)
  }

  pub fn is_empty_category(&self) -> bool {
    self.unify(&Self::empty()).is_some()
  }

  pub fn is_complex(&self) -> bool {
    matches!(self, Self::Complex { .. })
  }

  pub fn slash(&self) -> Option<Slash> {
    match self {
      Self::Complex { slash, .. } => Some(*slash),
      _ => None,
    }
  }

  pub fn left(&self) -> Option<&Syntax> {
    match self {
      Self::Complex { left, .. } => Some(left),
      _ => None,
    }
  }

  pub fn right(&self) -> Option<&Syntax> {
    match self {
      Self::Complex { right, .. } => Some(right),
      _ => None,
    }
  }

  pub fn num_slashes(&self) -> usize {
    match self {
      Self::Atom { .. } => 0,
      Self::Complex { left, right, .. } => 1 + left.num_slashes() + right.num_slashes(),
    }
  }

  pub fn has_attribute_variable(&self) -> bool {
    match self {
      Self::Atom { attribute, .. } => attribute.as_deref() == Some(VARIABLE_ATTRIBUTE),
      Self::Complex { left, right, .. } => {
        left.has_attribute_variable() || right.has_attribute_variable()
      }
    }
  }

  /// Replaces the attribute variable according to an assignment. `None` leaves it in place.
  pub fn set_variable(&self, assignment: Option<&VariableAssignment>) -> Syntax {
    let Some(assignment) = assignment else {
      return self.clone();
    };
    match self {
      Self::Atom { label, attribute } if attribute.as_deref() == Some(VARIABLE_ATTRIBUTE) => {
        Self::Atom {
          label: label.clone(),
          attribute: match assignment {
            VariableAssignment::Bare => None,
            VariableAssignment::Attribute(a) => Some(a.clone()),
          },
        }
      }
      Self::Atom { .. } => self.clone(),
      Self::Complex { left, slash, right } => Self::complex(
        left.set_variable(Some(assignment)),
        *slash,
        right.set_variable(Some(assignment)),
      ),
    }
  }

  /// Unifies `self` with `other`. Missing attributes unify with anything, and the
  /// attribute variable binds consistently on each side. The returned assignment is the
  /// binding of the variable on `self`'s side, if it was bound to something concrete.
  pub fn unify(&self, other: &Syntax) -> Option<Unification> {
    if self.num_slashes() != other.num_slashes() {
      return None;
    }
    let mut bindings = Bindings::default();
    let syntax = self.unify_with(other, &mut bindings)?;
    let assignment = match bindings.this {
      None => None,
      Some(None) => Some(VariableAssignment::Bare),
      Some(Some(a)) if a == VARIABLE_ATTRIBUTE => None,
      Some(Some(a)) => Some(VariableAssignment::Attribute(a)),
    };
    Some(Unification { syntax, assignment })
  }

  fn unify_with(&self, other: &Syntax, bindings: &mut Bindings) -> Option<Syntax> {
    match (self, other) {
      (
        Self::Atom { label, attribute },
        Self::Atom {
          label: other_label,
          attribute: other_attribute,
        },
      ) => {
        if label != other_label {
          return None;
        }
        let is_var = |a: &Option<String>| a.as_deref() == Some(VARIABLE_ATTRIBUTE);
        match (attribute, other_attribute) {
          (None, None) => Some(self.clone()),
          (None, o) if is_var(o) => bind(&mut bindings.other, None).then(|| self.clone()),
          (None, Some(_)) => Some(other.clone()),
          (a, None) if is_var(a) => bind(&mut bindings.this, None).then(|| other.clone()),
          (Some(_), None) => Some(self.clone()),
          (a, Some(o)) if is_var(a) => bind(&mut bindings.this, Some(o)).then(|| other.clone()),
          (Some(a), o) if is_var(o) => bind(&mut bindings.other, Some(a)).then(|| self.clone()),
          (Some(a), Some(o)) => (a == o).then(|| self.clone()),
        }
      }
      (
        Self::Complex { left, slash, right },
        Self::Complex {
          left: other_left,
          slash: other_slash,
          right: other_right,
        },
      ) if slash == other_slash => {
        let right = right.unify_with(other_right, bindings)?;
        let left = left.unify_with(other_left, bindings)?;
        Some(Self::complex(left, *slash, right))
      }
      _ => None,
    }
  }
}

impl fmt::Display for Syntax {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Atom { label, attribute } => {
        write!(f, "{}", label)?;
        if let Some(attribute) = attribute {
          write!(f, "[{}]", attribute)?;
        }
        Ok(())
      }
      Self::Complex { left, slash, right } => {
        if left.is_complex() {
          write!(f, "({})", left)?;
        } else {
          write!(f, "{}", left)?;
        }
        write!(f, "{}", slash)?;
        if right.is_complex() {
          write!(f, "({})", right)
        } else {
          write!(f, "{}", right)
        }
      }
    }
  }
}

impl FromStr for Syntax {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    crate::parse_lexicon::parse_syntax_str(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn syn(s: &str) -> Syntax {
    s.parse().unwrap()
  }

  #[test]
  fn test_parse_and_print() {
    assert_eq!(syn("S\\NP/NP"), syn("(S\\NP)/NP"));
    assert_eq!(syn("(S\\NP)/NP").to_string(), "(S\\NP)/NP");
    assert_eq!(syn("NP[pl]"), Syntax::atom_with("NP", "pl"));
    assert_eq!(syn("S/(S\\NP)").num_slashes(), 2);
    assert!(syn("EMPTY").is_empty_category());
    assert!("S/(NP".parse::<Syntax>().is_err());
  }

  #[test]
  fn test_unify_attributes() {
    assert!(syn("NP").unify(&syn("NP[pl]")).is_some());
    assert!(syn("NP[sg]").unify(&syn("NP[pl]")).is_none());
    assert!(syn("NP").unify(&syn("N")).is_none());
    assert!(syn("S/NP").unify(&syn("S\\NP")).is_none());

    let u = syn("S[x]").unify(&syn("S[dcl]")).unwrap();
    assert_eq!(u.syntax, syn("S[dcl]"));
    assert_eq!(u.assignment, Some(VariableAssignment::Attribute("dcl".to_string())));
    assert_eq!(
      syn("S[x]/NP").set_variable(u.assignment.as_ref()),
      syn("S[dcl]/NP")
    );
  }

  #[test]
  fn test_unify_variable_binds_once() {
    assert!(syn("S[x]/S[x]").unify(&syn("S[dcl]/S[dcl]")).is_some());
    assert!(syn("S[x]/S[x]").unify(&syn("S[dcl]/S[q]")).is_none());
  }
}
