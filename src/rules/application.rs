use std::rc::Rc;

use crate::category::{Category, CategoryServices, Semantics};
use crate::rules::{BinaryRule, Direction, RuleLabel, RuleName, RuleResult, SentenceSpan};
use crate::syntax::Slash;

/// `X/Y Y => X` (forward) and `Y X\Y => X` (backward)
pub struct Application<S> {
  name: RuleName,
  direction: Direction,
  services: Rc<S>,
}

impl<S> Application<S> {
  pub fn new(direction: Direction, services: Rc<S>) -> Self {
    Self {
      name: RuleName::binary(RuleLabel::Application, direction),
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

impl<M, S> BinaryRule<M> for Application<S>
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
    let (function, argument, slash) = match self.direction {
      Direction::Forward => (left, right, Slash::Forward),
      Direction::Backward => (right, left, Slash::Backward),
    };
    if function.syntax.slash() != Some(slash) {
      return None;
    }
    let category = self.services.apply(function, argument)?;
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
  fn test_forward_application_matches_semantic_apply() {
    let services = Rc::new(LambdaServices::default());
    let rule = Application::forward(services.clone());

    let pairs = [
      ("S/NP : (lambda $0:e (sleep:<e,t> $0))", "NP : cat:e"),
      (
        "NP/N : (lambda $0:<e,t> (the:<<e,t>,e> $0))",
        "N : (lambda $0:e (dog:<e,t> $0))",
      ),
      ("(S\\NP)/NP : see:<e,<e,t>>", "NP[pl] : dogs:e"),
    ];
    for (f, a) in pairs {
      let (f, a) = (cat(f), cat(a));
      let result = rule.apply(&f, &a, &span()).unwrap();
      assert_eq!(
        result.category.semantics,
        services.apply_semantics(f.semantics.as_ref().unwrap(), a.semantics.as_ref().unwrap())
      );
      assert_eq!(Some(&result.category.syntax), f.syntax.left());
      assert_eq!(result.name.to_string(), ">apply");
    }
  }

  #[test]
  fn test_application_failures() {
    let services = Rc::new(LambdaServices::default());
    let forward = Application::forward(services.clone());
    let backward = Application::backward(services);

    // wrong slash for the direction
    assert!(forward.apply(&cat("S\\NP : bark:<e,t>"), &cat("NP : dog:e"), &span()).is_none());
    // semantic type mismatch
    assert!(forward.apply(&cat("S/NP : bark:<e,t>"), &cat("NP : p:<e,t>"), &span()).is_none());
    // syntactic mismatch
    assert!(forward.apply(&cat("S/NP : bark:<e,t>"), &cat("N : dog:<e,t>"), &span()).is_none());
    // vertical slashes never apply
    assert!(forward.apply(&cat("S|NP : bark:<e,t>"), &cat("NP : dog:e"), &span()).is_none());

    let result = backward
      .apply(&cat("NP : dog:e"), &cat("S\\NP : bark:<e,t>"), &span())
      .unwrap();
    assert_eq!(result.category, cat("S : (bark:<e,t> dog:e)"));
    assert_eq!(result.name.to_string(), "<apply");
  }

  #[test]
  fn test_application_propagates_attribute_variable() {
    let services = Rc::new(LambdaServices::default());
    let rule = Application::forward(services);
    let result = rule
      .apply(
        &cat("S[x]/S[x] : (lambda $0:t (not:<t,t> $0))"),
        &cat("S[dcl] : rain:t"),
        &span(),
      )
      .unwrap();
    assert_eq!(result.category.syntax.to_string(), "S[dcl]");
  }
}
