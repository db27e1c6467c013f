//! Combinators and the names that record which one built a chart step.

mod application;
mod composition;
mod skipping;
mod type_raising;

use std::fmt;

use crate::category::{Category, Semantics};

pub use application::Application;
pub use composition::{Composition, MAX_COMPOSITION_ORDER};
pub use skipping::Skipping;
pub use type_raising::{TypeRaisedComposition, TypeRaising};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
  Forward,
  Backward,
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Forward => write!(f, ">"),
      Self::Backward => write!(f, "<"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleLabel {
  Lexical,
  Application,
  Composition,
  CrossComposition,
  TypeRaisedComposition,
  TypeRaising,
  Skip,
  /// Grammar-specific rules, e.g. coordination
  Custom(String),
}

impl fmt::Display for RuleLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Lexical => write!(f, "lex"),
      Self::Application => write!(f, "apply"),
      Self::Composition => write!(f, "comp"),
      Self::CrossComposition => write!(f, "xcomp"),
      Self::TypeRaisedComposition => write!(f, "trcomp"),
      Self::TypeRaising => write!(f, "T"),
      Self::Skip => write!(f, "skip"),
      Self::Custom(label) => write!(f, "{}", label),
    }
  }
}

/// Which rule produced a chart step. When a unary rule fires directly on the result of
/// a lexical or binary step, the two are fused into one step and the unary rule's name
/// is carried in `composed_with`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleName {
  pub label: RuleLabel,
  pub direction: Option<Direction>,
  pub order: usize,
  pub composed_with: Option<Box<RuleName>>,
}

impl RuleName {
  pub fn new(label: RuleLabel, direction: Option<Direction>, order: usize) -> Self {
    Self {
      label,
      direction,
      order,
      composed_with: None,
    }
  }

  pub fn binary(label: RuleLabel, direction: Direction) -> Self {
    Self::new(label, Some(direction), 0)
  }

  pub fn lexical() -> Self {
    Self::new(RuleLabel::Lexical, None, 0)
  }

  pub fn is_overloaded(&self) -> bool {
    self.composed_with.is_some()
  }

  /// Fuses a unary rule on top of this one. Panics if either side is already fused.
  pub fn overload(&self, unary: &RuleName) -> RuleName {
    assert!(
      !self.is_overloaded() && !unary.is_overloaded(),
      "can't overload an already overloaded rule name: {} + {}",
      self,
      unary
    );
    RuleName {
      composed_with: Some(Box::new(unary.clone())),
      ..self.clone()
    }
  }

  /// The rule applied last: the fused unary rule if there is one
  pub fn outermost(&self) -> &RuleName {
    match &self.composed_with {
      Some(unary) => unary,
      None => self,
    }
  }

  /// The rule this name was built from, without any fused unary rule
  pub fn base(&self) -> RuleName {
    RuleName {
      composed_with: None,
      ..self.clone()
    }
  }

  /// Each plain rule in this name, innermost first
  pub fn components(&self) -> Vec<RuleName> {
    let mut out = vec![self.base()];
    if let Some(unary) = &self.composed_with {
      out.push(unary.as_ref().clone());
    }
    out
  }

  pub fn is_type_raising(&self) -> bool {
    !self.is_overloaded() && self.label == RuleLabel::TypeRaising && self.direction.is_some()
  }
}

impl fmt::Display for RuleName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(direction) = self.direction {
      write!(f, "{}", direction)?;
    }
    write!(f, "{}", self.label)?;
    if self.order != 0 {
      write!(f, "{}", self.order)?;
    }
    if let Some(unary) = &self.composed_with {
      write!(f, "+{}", unary)?;
    }
    Ok(())
  }
}

/// A span as the rules see it: half-open `[begin, end)` in a sentence of `length` tokens
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SentenceSpan {
  pub begin: usize,
  pub end: usize,
  pub length: usize,
}

impl SentenceSpan {
  pub fn new(begin: usize, end: usize, length: usize) -> Self {
    assert!(
      begin < end && end <= length,
      "invalid span {}..{} in a sentence of {} tokens",
      begin,
      end,
      length
    );
    Self { begin, end, length }
  }

  pub fn is_complete(&self) -> bool {
    self.begin == 0 && self.end == self.length
  }

  pub fn len(&self) -> usize {
    self.end - self.begin
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult<M> {
  pub name: RuleName,
  pub category: Category<M>,
}

impl<M> RuleResult<M> {
  pub fn new(name: RuleName, category: Category<M>) -> Self {
    Self { name, category }
  }
}

/// A combinator over two adjacent categories. Pure: no state changes between calls.
pub trait BinaryRule<M: Semantics> {
  fn name(&self) -> &RuleName;

  fn apply(
    &self,
    left: &Category<M>,
    right: &Category<M>,
    span: &SentenceSpan,
  ) -> Option<RuleResult<M>>;
}

pub trait UnaryRule<M: Semantics> {
  fn name(&self) -> &RuleName;

  fn apply(&self, category: &Category<M>, span: &SentenceSpan) -> Option<RuleResult<M>>;

  /// Cheap check used for pruning: false means `apply` can never succeed on `category`.
  fn is_valid_argument(&self, category: &Category<M>, span: &SentenceSpan) -> bool;
}

/// Restricts a unary rule to categories spanning the whole sentence
pub struct CompleteSpanOnly<R> {
  rule: R,
}

impl<R> CompleteSpanOnly<R> {
  pub fn new(rule: R) -> Self {
    Self { rule }
  }
}

impl<M, R> UnaryRule<M> for CompleteSpanOnly<R>
where
  M: Semantics,
  R: UnaryRule<M>,
{
  fn name(&self) -> &RuleName {
    self.rule.name()
  }

  fn apply(&self, category: &Category<M>, span: &SentenceSpan) -> Option<RuleResult<M>> {
    if span.is_complete() {
      self.rule.apply(category, span)
    } else {
      None
    }
  }

  fn is_valid_argument(&self, category: &Category<M>, span: &SentenceSpan) -> bool {
    span.is_complete() && self.rule.is_valid_argument(category, span)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rule_name_display() {
    assert_eq!(
      RuleName::binary(RuleLabel::Application, Direction::Forward).to_string(),
      ">apply"
    );
    assert_eq!(
      RuleName::new(RuleLabel::Composition, Some(Direction::Backward), 2).to_string(),
      "<comp2"
    );
    let raised = RuleName::new(RuleLabel::TypeRaising, Some(Direction::Forward), 0);
    let fused = RuleName::lexical().overload(&raised);
    assert_eq!(fused.to_string(), "lex+>T");
    assert_eq!(fused.outermost(), &raised);
    assert_eq!(fused.components(), vec![RuleName::lexical(), raised.clone()]);
    assert!(raised.is_type_raising());
    assert!(!fused.is_type_raising());
  }

  #[test]
  fn test_rule_name_equality() {
    let a = RuleName::new(RuleLabel::Composition, Some(Direction::Forward), 1);
    let b = RuleName::new(RuleLabel::Composition, Some(Direction::Forward), 2);
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
  }

  #[test]
  #[should_panic]
  fn test_double_overload_panics() {
    let raised = RuleName::new(RuleLabel::TypeRaising, Some(Direction::Forward), 0);
    RuleName::lexical().overload(&raised).overload(&raised);
  }

  #[test]
  fn test_sentence_span() {
    let span = SentenceSpan::new(0, 3, 3);
    assert!(span.is_complete());
    assert_eq!(span.len(), 3);
    assert!(!SentenceSpan::new(1, 3, 3).is_complete());
  }
}
