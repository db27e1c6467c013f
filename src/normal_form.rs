//! Normal-form constraints, which keep the chart from filling up with derivations that
//! differ only in the order combinators were applied.
//!
//! Constraints look only at rule names: the rules that built each child cell (its
//! generating rules) and the rule about to be applied. A rule name with a fused unary
//! rule is matched by that unary rule, since it was the last one to fire.

use std::collections::HashSet;
use std::fmt;

use crate::rules::{Direction, RuleLabel, RuleName};

pub trait NormalFormConstraint: fmt::Display {
  fn is_valid_binary(&self, left: &[&RuleName], right: &[&RuleName], considered: &RuleName) -> bool;

  fn is_valid_unary(&self, generating: &[&RuleName], considered: &RuleName) -> bool;
}

fn is_composition(rule: &RuleName) -> bool {
  rule.label == RuleLabel::Composition
}

/// The constraints of Hockenmaier & Bisk (2010), "Normal-form parsing for Combinatory
/// Categorial Grammars with generalized composition and type-raising".
///
/// 1. The primary of an application can't come from composition in the same direction.
/// 2. The primary of a composition can't come from order-0 composition in the same direction.
/// 3. The secondary of an order-n composition can't come from a lower-order composition
///    in the same direction.
/// 4. A raised primary can't compose with a secondary built by higher-order composition
///    in the opposite direction.
/// 5. A raised primary can't be applied in the direction it was raised in.
/// 6. The result of coordination can't be type-raised.
///
/// 4 and 5 only hold with `include_type_raising`, and 6 only when coordination rules are given.
#[derive(Debug, Clone, Default)]
pub struct HockenmaierBisk {
  coordination: Option<HashSet<RuleName>>,
  include_type_raising: bool,
}

impl HockenmaierBisk {
  pub fn new(coordination: Option<HashSet<RuleName>>, include_type_raising: bool) -> Self {
    Self {
      coordination,
      include_type_raising,
    }
  }
}

impl NormalFormConstraint for HockenmaierBisk {
  fn is_valid_binary(&self, left: &[&RuleName], right: &[&RuleName], considered: &RuleName) -> bool {
    let direction = match considered.direction {
      Some(direction) => direction,
      None => panic!("invalid direction: binary rule {} has none", considered),
    };
    let (primary, secondary) = match direction {
      Direction::Forward => (left, right),
      Direction::Backward => (right, left),
    };

    let considered_is_composition = is_composition(considered);
    let considered_is_application = considered.label == RuleLabel::Application;
    let check_1 = considered_is_application || (considered_is_composition && considered.order == 0);
    let check_2 = considered_is_composition;
    let check_5 = considered_is_application;

    let mut primary_raised = false;
    if check_1 || check_2 || self.include_type_raising {
      for rule in primary {
        let same_direction = rule.direction == Some(direction);
        if check_1 && is_composition(rule) && same_direction {
          return false;
        }
        if check_2 && is_composition(rule) && rule.order == 0 && same_direction {
          return false;
        }
        if self.include_type_raising && rule.is_type_raising() && same_direction {
          if check_5 {
            return false;
          }
          primary_raised = true;
        }
      }
    }

    let check_3 = considered_is_composition;
    let check_4 = self.include_type_raising && primary_raised && considered_is_composition;
    if check_3 || check_4 {
      for rule in secondary {
        if !is_composition(rule) {
          continue;
        }
        let same_direction = rule.direction == Some(direction);
        if check_3 && same_direction && considered.order > rule.order {
          return false;
        }
        if check_4 && !same_direction && rule.order > considered.order {
          return false;
        }
      }
    }

    true
  }

  fn is_valid_unary(&self, generating: &[&RuleName], considered: &RuleName) -> bool {
    let Some(coordination) = &self.coordination else {
      return true;
    };
    if !considered.is_type_raising() {
      return true;
    }
    !generating.iter().any(|rule| coordination.contains(*rule))
  }
}

impl fmt::Display for HockenmaierBisk {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "hb2010nf")
  }
}

/// Forbids unary rules on cells built by any of the given binary rules
#[derive(Debug, Clone)]
pub struct UnaryConstraint {
  excluded: HashSet<RuleName>,
}

impl UnaryConstraint {
  pub fn new(excluded: HashSet<RuleName>) -> Self {
    Self { excluded }
  }
}

impl NormalFormConstraint for UnaryConstraint {
  fn is_valid_binary(&self, _: &[&RuleName], _: &[&RuleName], _: &RuleName) -> bool {
    true
  }

  fn is_valid_unary(&self, generating: &[&RuleName], _considered: &RuleName) -> bool {
    !generating.iter().any(|rule| self.excluded.contains(*rule))
  }
}

impl fmt::Display for UnaryConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names = self.excluded.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    names.sort();
    write!(f, "unary-constraint[{}]", names.join(","))
  }
}

/// All of its constraints, in order: a combination is valid only if every one accepts it.
pub struct NormalFormValidator {
  constraints: Vec<Box<dyn NormalFormConstraint>>,
}

impl NormalFormValidator {
  pub fn builder() -> NormalFormValidatorBuilder {
    NormalFormValidatorBuilder::default()
  }

  /// The usual setup: Hockenmaier-Bisk constraints only
  pub fn hockenmaier_bisk(include_type_raising: bool) -> Self {
    Self::builder()
      .add_constraint(HockenmaierBisk::new(None, include_type_raising))
      .build()
  }

  pub fn is_valid_binary<'a>(
    &self,
    left: impl IntoIterator<Item = &'a RuleName>,
    right: impl IntoIterator<Item = &'a RuleName>,
    considered: &RuleName,
  ) -> bool {
    let left = left.into_iter().map(RuleName::outermost).collect::<Vec<_>>();
    let right = right.into_iter().map(RuleName::outermost).collect::<Vec<_>>();
    self
      .constraints
      .iter()
      .all(|c| c.is_valid_binary(&left, &right, considered))
  }

  pub fn is_valid_unary<'a>(
    &self,
    generating: impl IntoIterator<Item = &'a RuleName>,
    considered: &RuleName,
  ) -> bool {
    let generating = generating.into_iter().map(RuleName::outermost).collect::<Vec<_>>();
    self
      .constraints
      .iter()
      .all(|c| c.is_valid_unary(&generating, considered))
  }

  pub fn len(&self) -> usize {
    self.constraints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.constraints.is_empty()
  }
}

impl fmt::Display for NormalFormValidator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names = self.constraints.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    write!(f, "[{}]", names.join(", "))
  }
}

#[derive(Default)]
pub struct NormalFormValidatorBuilder {
  constraints: Vec<Box<dyn NormalFormConstraint>>,
}

impl NormalFormValidatorBuilder {
  pub fn add_constraint(mut self, constraint: impl NormalFormConstraint + 'static) -> Self {
    self.constraints.push(Box::new(constraint));
    self
  }

  pub fn build(self) -> NormalFormValidator {
    let validator = NormalFormValidator {
      constraints: self.constraints,
    };
    tracing::debug!(constraints = %validator, "built normal-form validator");
    validator
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn name(label: RuleLabel, direction: Direction, order: usize) -> RuleName {
    RuleName::new(label, Some(direction), order)
  }

  fn fapply() -> RuleName {
    name(RuleLabel::Application, Direction::Forward, 0)
  }

  fn fcomp(order: usize) -> RuleName {
    name(RuleLabel::Composition, Direction::Forward, order)
  }

  fn bcomp(order: usize) -> RuleName {
    name(RuleLabel::Composition, Direction::Backward, order)
  }

  fn fraise() -> RuleName {
    name(RuleLabel::TypeRaising, Direction::Forward, 0)
  }

  #[test]
  fn test_no_application_onto_composed_primary() {
    let hb = HockenmaierBisk::new(None, false);
    let lex = RuleName::lexical();
    // (X/Y Y/Z) Z: the left side was composed forward, apply forward is redundant
    assert!(!hb.is_valid_binary(&[&fcomp(1)], &[&lex], &fapply()));
    assert!(hb.is_valid_binary(&[&lex], &[&fapply()], &fapply()));
    // a backward-composed primary is fine for forward application
    assert!(hb.is_valid_binary(&[&bcomp(1)], &[&lex], &fapply()));
    // for backward application the primary is on the right
    let bapply = name(RuleLabel::Application, Direction::Backward, 0);
    assert!(!hb.is_valid_binary(&[&lex], &[&bcomp(1)], &bapply));
    assert!(hb.is_valid_binary(&[&bcomp(1)], &[&lex], &bapply));
  }

  #[test]
  fn test_secondary_order_constraint() {
    let hb = HockenmaierBisk::new(None, false);
    let lex = RuleName::lexical();
    assert!(!hb.is_valid_binary(&[&lex], &[&fcomp(1)], &fcomp(2)));
    assert!(hb.is_valid_binary(&[&lex], &[&fcomp(2)], &fcomp(2)));
    assert!(hb.is_valid_binary(&[&lex], &[&fcomp(2)], &fcomp(1)));
    // crossing composition isn't covered
    let xcomp = name(RuleLabel::CrossComposition, Direction::Forward, 1);
    assert!(hb.is_valid_binary(&[&lex], &[&xcomp], &fcomp(2)));
  }

  #[test]
  fn test_order_zero_composition() {
    let hb = HockenmaierBisk::new(None, false);
    let lex = RuleName::lexical();
    assert!(!hb.is_valid_binary(&[&fcomp(0)], &[&lex], &fcomp(1)));
    assert!(!hb.is_valid_binary(&[&fcomp(1)], &[&lex], &fcomp(0)));
    assert!(hb.is_valid_binary(&[&fcomp(1)], &[&lex], &fcomp(1)));
  }

  #[test]
  fn test_type_raising_constraints() {
    let lex = RuleName::lexical();
    let without = HockenmaierBisk::new(None, false);
    let with = HockenmaierBisk::new(None, true);

    // 5: a forward-raised primary is never applied forward
    assert!(without.is_valid_binary(&[&fraise()], &[&lex], &fapply()));
    assert!(!with.is_valid_binary(&[&fraise()], &[&lex], &fapply()));

    // 4: raised primary, secondary from higher-order composition the other way
    assert!(!with.is_valid_binary(&[&fraise()], &[&bcomp(2)], &fcomp(1)));
    assert!(with.is_valid_binary(&[&fraise()], &[&bcomp(1)], &fcomp(1)));
    assert!(without.is_valid_binary(&[&fraise()], &[&bcomp(2)], &fcomp(1)));
  }

  #[test]
  fn test_coordination_is_not_raised() {
    let coordination = name(RuleLabel::Custom("coord".to_string()), Direction::Forward, 0);
    let hb = HockenmaierBisk::new(Some([coordination.clone()].into_iter().collect()), true);
    assert!(!hb.is_valid_unary(&[&coordination], &fraise()));
    assert!(hb.is_valid_unary(&[&fapply()], &fraise()));

    let other_unary = RuleName::new(RuleLabel::Custom("shift".to_string()), None, 0);
    assert!(hb.is_valid_unary(&[&coordination], &other_unary));
    assert!(HockenmaierBisk::new(None, true).is_valid_unary(&[&coordination], &fraise()));
  }

  #[test]
  #[should_panic(expected = "invalid direction")]
  fn test_binary_rule_without_direction_panics() {
    let hb = HockenmaierBisk::new(None, false);
    hb.is_valid_binary(&[], &[], &RuleName::new(RuleLabel::Application, None, 0));
  }

  #[test]
  fn test_unary_constraint() {
    let constraint = UnaryConstraint::new([fcomp(1)].into_iter().collect());
    assert!(!constraint.is_valid_unary(&[&fapply(), &fcomp(1)], &fraise()));
    assert!(constraint.is_valid_unary(&[&fapply()], &fraise()));
    assert!(constraint.is_valid_binary(&[&fcomp(1)], &[], &fapply()));
  }

  #[test]
  fn test_validator_is_a_conjunction() {
    let validator = NormalFormValidator::builder()
      .add_constraint(HockenmaierBisk::new(None, false))
      .add_constraint(UnaryConstraint::new([fapply()].into_iter().collect()))
      .build();
    assert_eq!(validator.len(), 2);
    assert_eq!(validator.to_string(), "[hb2010nf, unary-constraint[>apply]]");

    let lex = RuleName::lexical();
    assert!(validator.is_valid_binary([&lex], [&lex], &fapply()));
    assert!(!validator.is_valid_binary([&fcomp(1)], [&lex], &fapply()));
    assert!(!validator.is_valid_unary([&fapply()], &fraise()));
    assert!(validator.is_valid_unary([&lex], &fraise()));
  }

  #[test]
  fn test_validator_matches_fused_unary() {
    let validator = NormalFormValidator::hockenmaier_bisk(true);
    let raised_lexical = RuleName::lexical().overload(&fraise());
    // the fused name counts as type-raised
    assert!(!validator.is_valid_binary([&raised_lexical], [&RuleName::lexical()], &fapply()));
    assert!(NormalFormValidator::builder().build().is_empty());
  }
}
