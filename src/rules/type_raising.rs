use std::rc::Rc;

use crate::category::{Category, CategoryServices, Semantics};
use crate::rules::{
  BinaryRule, Direction, RuleLabel, RuleName, RuleResult, SentenceSpan, UnaryRule,
};
use crate::syntax::{Slash, Syntax};

fn outer_slash(direction: Direction) -> Slash {
  match direction {
    Direction::Forward => Slash::Forward,
    Direction::Backward => Slash::Backward,
  }
}

/// Raises a category and immediately composes it, without ever putting the raised
/// category in the chart.
///
/// Forward: `X (T\X)/Z => T/Z`, by raising `X` to `T/(T\X)` and composing forward.
/// Backward: `(T/X)\Z X => T\Z`, by raising `X` to `T\(T/X)` and composing backward.
pub struct TypeRaisedComposition<S> {
  name: RuleName,
  direction: Direction,
  services: Rc<S>,
}

impl<S> TypeRaisedComposition<S> {
  pub fn new(direction: Direction, services: Rc<S>) -> Self {
    Self {
      name: RuleName::new(RuleLabel::TypeRaisedComposition, Some(direction), 1),
      direction,
      services,
    }
  }

  pub fn forward(services: Rc<S>) -> Self {
    Self::new(Direction::Forward, services)
  }

  pub fn backward(services: Rc<S>) -> Self {
    Self::new(Direction::Backward, services)
  }
}

impl<M, S> BinaryRule<M> for TypeRaisedComposition<S>
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
    let outer = outer_slash(self.direction);
    // the functor over the raised category, and the category to raise
    let (secondary, raised) = match self.direction {
      Direction::Forward => (right, left),
      Direction::Backward => (left, right),
    };

    let Syntax::Complex {
      left: functor,
      slash,
      ..
    } = &secondary.syntax
    else {
      return None;
    };
    if *slash != outer {
      return None;
    }
    // (T\X) under a forward outer slash, (T/X) under a backward one
    let Syntax::Complex {
      left: result,
      slash: inner,
      right: argument,
    } = functor.as_ref()
    else {
      return None;
    };
    let expected_inner = match self.direction {
      Direction::Forward => Slash::Backward,
      Direction::Backward => Slash::Forward,
    };
    if *inner != expected_inner {
      return None;
    }

    let raised = self
      .services
      .raise_to_compose(raised, argument, result, outer, secondary)?;
    let category = self.services.compose(&raised, secondary, 1, false)?;
    tracing::trace!(rule = %self.name, %category, "raised and composed");
    Some(RuleResult::new(self.name.clone(), category))
  }
}

/// Unary type raising `X => T/(T\X)` (forward) or `X => T\(T/X)` (backward), for a
/// fixed set of argument categories `X` and a fixed result `T`.
pub struct TypeRaising<S> {
  name: RuleName,
  direction: Direction,
  arguments: Vec<Syntax>,
  result: Syntax,
  services: Rc<S>,
}

impl<S> TypeRaising<S> {
  pub fn new(direction: Direction, arguments: Vec<Syntax>, result: Syntax, services: Rc<S>) -> Self {
    Self {
      name: RuleName::new(RuleLabel::TypeRaising, Some(direction), 0),
      direction,
      arguments,
      result,
      services,
    }
  }

  fn matching_argument(&self, syntax: &Syntax) -> Option<&Syntax> {
    self
      .arguments
      .iter()
      .find(|argument| argument.unify(syntax).is_some())
  }
}

impl<M, S> UnaryRule<M> for TypeRaising<S>
where
  M: Semantics,
  S: CategoryServices<M>,
{
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(&self, category: &Category<M>, _span: &SentenceSpan) -> Option<RuleResult<M>> {
    let argument = self.matching_argument(&category.syntax)?;
    let raised =
      self
        .services
        .raise(category, argument, &self.result, outer_slash(self.direction))?;
    Some(RuleResult::new(self.name.clone(), raised))
  }

  fn is_valid_argument(&self, category: &Category<M>, _span: &SentenceSpan) -> bool {
    category.semantics.is_some() && self.matching_argument(&category.syntax).is_some()
  }
}
