use crate::category::{Category, Semantics};
use crate::rules::{BinaryRule, Direction, RuleLabel, RuleName, RuleResult, SentenceSpan};

/// Drops an `EMPTY` neighbour: backward skipping passes the right category through
/// when the left one is empty, forward skipping passes the left one through when the
/// right one is empty.
pub struct Skipping {
  name: RuleName,
  direction: Direction,
}

impl Skipping {
  pub fn new(direction: Direction) -> Self {
    Self {
      name: RuleName::binary(RuleLabel::Skip, direction),
      direction,
    }
  }

  pub fn forward() -> Self {
    Self::new(Direction::Forward)
  }

  pub fn backward() -> Self {
    Self::new(Direction::Backward)
  }
}

impl<M: Semantics> BinaryRule<M> for Skipping {
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(
    &self,
    left: &Category<M>,
    right: &Category<M>,
    _span: &SentenceSpan,
  ) -> Option<RuleResult<M>> {
    let empty = Category::empty();
    let kept = match self.direction {
      Direction::Backward if *left == empty => right,
      Direction::Forward if *right == empty => left,
      _ => return None,
    };
    Some(RuleResult::new(self.name.clone(), kept.clone()))
  }
}
