use std::rc::Rc;

use crate::category::{Category, CategoryServices, Semantics};
use crate::rules::{BinaryRule, Direction, RuleLabel, RuleName, RuleResult, SentenceSpan};
use crate::syntax::Slash;

/// Highest composition order any grammar may ask for
pub const MAX_COMPOSITION_ORDER: usize = 3;

/// `X/Y Y/Z => X/Z` (forward) and `Y\Z X\Y => X\Z` (backward), generalized to
/// secondaries with `order` stacked arguments. Crossing composition (`X/Y Y\Z => X\Z`
/// and its mirror) is first-order only.
pub struct Composition<S> {
  name: RuleName,
  direction: Direction,
  order: usize,
  cross: bool,
  services: Rc<S>,
}

impl<S> Composition<S> {
  pub fn new(direction: Direction, order: usize, cross: bool, services: Rc<S>) -> Self {
    assert!(
      (1..=MAX_COMPOSITION_ORDER).contains(&order),
      "composition order {} out of range 1..={}",
      order,
      MAX_COMPOSITION_ORDER
    );
    assert!(!cross || order == 1, "crossing composition is first-order only");
    let label = if cross {
      RuleLabel::CrossComposition
    } else {
      RuleLabel::Composition
    };
    Self {
      name: RuleName::new(label, Some(direction), order),
      direction,
      order,
      cross,
      services,
    }
  }

  /// Forward and backward composition for every order up to `max_order`
  pub fn up_to(max_order: usize, services: Rc<S>) -> Vec<Self> {
    (1..=max_order)
      .flat_map(|order| {
        [
          Self::new(Direction::Forward, order, false, services.clone()),
          Self::new(Direction::Backward, order, false, services.clone()),
        ]
      })
      .collect()
  }

  pub fn order(&self) -> usize {
    self.order
  }
}

impl<M, S> BinaryRule<M> for Composition<S>
where
  M: Semantics,
  S: CategoryServices<M>,
{
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(
    &self,
    left: &Category<M>,
    right: &Category<M>,
    _span: &SentenceSpan,
  ) -> Option<RuleResult<M>> {
    let (primary, secondary, slash) = match self.direction {
      Direction::Forward => (left, right, Slash::Forward),
      Direction::Backward => (right, left, Slash::Backward),
    };
    if !secondary.syntax.is_complex() || primary.syntax.slash() != Some(slash) {
      return None;
    }
    let category = self
      .services
      .compose(primary, secondary, self.order, self.cross)?;
    tracing::trace!(rule = %self.name, %category, "composed");
    Some(RuleResult::new(self.name.clone(), category))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lambda::{LambdaServices, Term};

  fn cat(s: &str) -> Category<Term> {
    LambdaServices::default().read_category(s).unwrap()
  }

  fn span() -> SentenceSpan {
    SentenceSpan::new(0, 2, 2)
  }

  #[test]
  fn test_forward_composition() {
    let rule = Composition::new(Direction::Forward, 1, false, Rc::new(LambdaServices::default()));
    let might = cat("(S\\NP)/(S\\NP) : (lambda $0:<e,t> (lambda $1:e (might:<t,t> ($0 $1))))");
    let see = cat("(S\\NP)/NP : (lambda $0:e (lambda $1:e (see:<e,<e,t>> $1 $0)))");

    let result = rule.apply(&might, &see, &span()).unwrap();
    assert_eq!(
      result.category,
      cat("((S\\NP)/NP) : (lambda $0:e (lambda $1:e (might:<t,t> (see:<e,<e,t>> $1 $0))))")
    );
    assert_eq!(result.name.to_string(), ">comp1");
  }

  #[test]
  fn test_backward_composition() {
    let rule = Composition::new(Direction::Backward, 1, false, Rc::new(LambdaServices::default()));
    // Y\Z X\Y => X\Z
    let left = cat("S\\NP : (lambda $0:e (walk:<e,t> $0))");
    let right = cat("S\\S : (lambda $0:t (quickly:<t,t> $0))");

    let result = rule.apply(&left, &right, &span()).unwrap();
    assert_eq!(
      result.category,
      cat("S\\NP : (lambda $0:e (quickly:<t,t> (walk:<e,t> $0)))")
    );
  }

  #[test]
  fn test_second_order_composition() {
    let services = Rc::new(LambdaServices::default());
    let first = Composition::new(Direction::Forward, 1, false, services.clone());
    let second = Composition::new(Direction::Forward, 2, false, services);

    let not = cat("S/S : (lambda $0:t (not:<t,t> $0))");
    let gives = cat("(S/NP)/NP : (lambda $0:e (lambda $1:e (give:<e,<e,t>> $0 $1)))");

    // first order would need S/NP where S is wanted
    assert!(first.apply(&not, &gives, &span()).is_none());
    let result = second.apply(&not, &gives, &span()).unwrap();
    assert_eq!(result.category.syntax.to_string(), "(S/NP)/NP");
    assert_eq!(result.name.to_string(), ">comp2");
  }

  #[test]
  fn test_composition_failures() {
    let rule = Composition::new(Direction::Forward, 1, false, Rc::new(LambdaServices::default()));
    // secondary must be a functor
    assert!(rule.apply(&cat("S/NP : bark:<e,t>"), &cat("NP : dog:e"), &span()).is_none());
    // slashes must agree without crossing
    assert!(rule
      .apply(&cat("S/S : (lambda $0:t $0)"), &cat("S\\NP : bark:<e,t>"), &span())
      .is_none());
  }

  #[test]
  fn test_crossing_composition() {
    let rule = Composition::new(Direction::Forward, 1, true, Rc::new(LambdaServices::default()));
    let result = rule
      .apply(&cat("S/S : (lambda $0:t $0)"), &cat("S\\NP : bark:<e,t>"), &span())
      .unwrap();
    assert_eq!(result.category.syntax.to_string(), "S\\NP");
    assert_eq!(result.name.to_string(), ">xcomp1");
  }

  #[test]
  #[should_panic]
  fn test_order_beyond_bound_is_fatal() {
    Composition::new(Direction::Forward, MAX_COMPOSITION_ORDER + 1, false, Rc::new(LambdaServices::default()));
  }

  #[test]
  fn test_up_to() {
    let rules = Composition::up_to(2, Rc::new(LambdaServices::default()));
    let names = rules
      .iter()
      .map(|r| BinaryRule::<Term>::name(r).to_string())
      .collect::<Vec<_>>();
    assert_eq!(names, vec![">comp1", "<comp1", ">comp2", "<comp2"]);
  }
}
