use std::fmt;

use crate::chart::Span;

/// An inner node of a derivation tree
#[derive(Debug, PartialEq, Clone)]
pub struct Constituent<T> {
  pub value: T,
  pub span: Span,
}

impl<T> fmt::Display for Constituent<T>
where
  T: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.span, self.value)
  }
}

/// The tokens a lexical step covers
#[derive(Debug, PartialEq, Clone)]
pub struct Word<U> {
  pub value: U,
  pub span: Span,
}

impl<U> fmt::Display for Word<U>
where
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.span, self.value)
  }
}

#[derive(Debug, PartialEq, Clone)]
pub enum SynTree<T, U> {
  Branch(Constituent<T>, Vec<SynTree<T, U>>),
  Leaf(Word<U>),
}

impl<T, U> SynTree<T, U> {
  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  pub fn span(&self) -> Span {
    match self {
      Self::Branch(c, _) => c.span,
      Self::Leaf(w) => w.span,
    }
  }

  pub fn get_branch(&self) -> Option<(&Constituent<T>, &[SynTree<T, U>])> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  /// Leaves in sentence order
  pub fn leaves(&self) -> Vec<&Word<U>> {
    match self {
      Self::Leaf(w) => vec![w],
      Self::Branch(_, children) => children.iter().flat_map(|c| c.leaves()).collect(),
    }
  }

  /// Number of branches, leaves excluded
  pub fn num_constituents(&self) -> usize {
    match self {
      Self::Leaf(_) => 0,
      Self::Branch(_, children) => 1 + children.iter().map(|c| c.num_constituents()).sum::<usize>(),
    }
  }
}

impl<T, U> fmt::Display for SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(t) => write!(f, "{}", t),
      Self::Branch(t, ts) => {
        write!(f, "({}", t)?;
        if ts.len() == 1 && ts[0].is_leaf() {
          write!(f, " ({}))", ts[0])
        } else {
          for t in ts.iter() {
            let fmt = t.to_string();
            for line in fmt.lines() {
              write!(f, "\n  {}", line)?;
            }
          }
          write!(f, ")")
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn leaf(word: &str, begin: usize) -> SynTree<String, String> {
    SynTree::Leaf(Word {
      value: word.to_string(),
      span: Span::new(begin, begin + 1),
    })
  }

  fn branch(label: &str, span: Span, children: Vec<SynTree<String, String>>) -> SynTree<String, String> {
    SynTree::Branch(
      Constituent {
        value: label.to_string(),
        span,
      },
      children,
    )
  }

  fn tree() -> SynTree<String, String> {
    branch(
      "S",
      Span::new(0, 2),
      vec![
        branch("NP", Span::new(0, 1), vec![leaf("dog", 0)]),
        branch("S\\NP", Span::new(1, 2), vec![leaf("barks", 1)]),
      ],
    )
  }

  #[test]
  fn test_leaves_and_counts() {
    let tree = tree();
    let words = tree.leaves().iter().map(|w| w.value.as_str()).collect::<Vec<_>>();
    assert_eq!(words, vec!["dog", "barks"]);
    assert_eq!(tree.num_constituents(), 3);
    assert_eq!(tree.span(), Span::new(0, 2));
    assert!(!tree.is_leaf());
  }

  #[test]
  fn test_display() {
    assert_eq!(
      tree().to_string(),
      "(0..2: S\n  (0..1: NP (0..1: dog))\n  (1..2: S\\NP (1..2: barks)))"
    );
  }
}
