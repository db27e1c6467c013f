//! Sparse features and the linear model that scores chart steps.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::AddAssign;

use crate::category::{Category, Semantics};
use crate::lexicon::LexicalEntry;
use crate::rules::{RuleName, SentenceSpan};

pub const LEX_TAG: &str = "LEX";
pub const ORIGIN_TAG: &str = "ORIGIN";
pub const RULE_TAG: &str = "RULE";

/// A sparse vector keyed by `TAG:name` strings. Zero entries are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn key(tag: &str, name: &str) -> String {
    format!("{}:{}", tag, name)
  }

  pub fn get(&self, key: &str) -> f64 {
    self.0.get(key).copied().unwrap_or(0.0)
  }

  pub fn set(&mut self, key: &str, value: f64) {
    if value == 0.0 {
      self.0.remove(key);
    } else {
      self.0.insert(key.to_string(), value);
    }
  }

  pub fn add(&mut self, key: &str, value: f64) {
    let current = self.get(key);
    self.set(key, current + value);
  }

  /// self += other * scale
  pub fn add_scaled(&mut self, other: &FeatureVector, scale: f64) {
    for (key, value) in other.iter() {
      self.add(key, value * scale);
    }
  }

  pub fn scaled(&self, scale: f64) -> FeatureVector {
    let mut out = FeatureVector::new();
    out.add_scaled(self, scale);
    out
  }

  pub fn dot(&self, other: &FeatureVector) -> f64 {
    // iterate the smaller side
    let (small, large) = if self.len() <= other.len() {
      (self, other)
    } else {
      (other, self)
    };
    small.iter().map(|(k, v)| v * large.get(k)).sum()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.0.iter().map(|(k, v)| (k.as_str(), *v))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// The first key whose value is NaN or infinite
  pub fn first_non_finite(&self) -> Option<&str> {
    self
      .0
      .iter()
      .find(|(_, v)| !v.is_finite())
      .map(|(k, _)| k.as_str())
  }
}

impl AddAssign<&FeatureVector> for FeatureVector {
  fn add_assign(&mut self, other: &FeatureVector) {
    self.add_scaled(other, 1.0);
  }
}

impl FromIterator<(String, f64)> for FeatureVector {
  fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
    let mut out = FeatureVector::new();
    for (key, value) in iter {
      out.add(&key, value);
    }
    out
  }
}

impl fmt::Display for FeatureVector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{")?;
    for (idx, (key, value)) in self.iter().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}={}", key, value)?;
    }
    write!(f, "}}")
  }
}

/// What the parser needs from a model: features for every step it builds, and a score
/// for a feature vector. Read-only during a parse.
pub trait ScoringModel<M: Semantics> {
  fn lexical_features(&self, entry: &LexicalEntry<M>, span: &SentenceSpan) -> FeatureVector;

  /// Features of a binary or unary rule (or a fused pair) building `result`
  fn rule_features(
    &self,
    rule: &RuleName,
    result: &Category<M>,
    span: &SentenceSpan,
  ) -> FeatureVector;

  fn score(&self, features: &FeatureVector) -> f64;
}

/// A linear model over lexical-entry, lexical-origin and rule-usage features.
#[derive(Debug, Clone)]
pub struct LinearModel {
  weights: FeatureVector,
  lexical_entry_features: bool,
  origin_features: bool,
  rule_features: bool,
  ignored_rules: HashSet<String>,
}

impl Default for LinearModel {
  fn default() -> Self {
    Self {
      weights: FeatureVector::new(),
      lexical_entry_features: true,
      origin_features: true,
      rule_features: true,
      ignored_rules: ["lex".to_string()].into_iter().collect(),
    }
  }
}

impl LinearModel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_lexical_entry_features(mut self, enabled: bool) -> Self {
    self.lexical_entry_features = enabled;
    self
  }

  pub fn with_origin_features(mut self, enabled: bool) -> Self {
    self.origin_features = enabled;
    self
  }

  pub fn with_rule_features(mut self, enabled: bool) -> Self {
    self.rule_features = enabled;
    self
  }

  /// Rule names (as displayed, e.g. `>apply`) that never produce a rule feature
  pub fn ignoring_rules(mut self, rules: impl IntoIterator<Item = String>) -> Self {
    self.ignored_rules = rules.into_iter().collect();
    self
  }

  pub fn weights(&self) -> &FeatureVector {
    &self.weights
  }

  pub fn weight(&self, key: &str) -> f64 {
    self.weights.get(key)
  }

  pub fn set_weight(&mut self, key: &str, value: f64) {
    assert!(value.is_finite(), "non-finite weight {} for {}", value, key);
    self.weights.set(key, value);
  }

  /// weights += rate * delta. A non-finite update is a bug upstream and aborts.
  pub fn update(&mut self, delta: &FeatureVector, rate: f64) {
    if let Some(key) = delta.first_non_finite() {
      panic!("malformed update: {} = {}", key, delta.get(key));
    }
    assert!(rate.is_finite(), "non-finite learning rate {}", rate);
    self.weights.add_scaled(delta, rate);
    tracing::debug!(features = delta.len(), rate, "updated weights");
  }

  pub fn lexical_entry_key<M: fmt::Display>(entry: &LexicalEntry<M>) -> String {
    FeatureVector::key(LEX_TAG, &entry.to_string())
  }

  pub fn rule_key(rule: &RuleName) -> String {
    FeatureVector::key(RULE_TAG, &rule.to_string())
  }
}

impl<M: Semantics> ScoringModel<M> for LinearModel {
  fn lexical_features(&self, entry: &LexicalEntry<M>, _span: &SentenceSpan) -> FeatureVector {
    let mut features = FeatureVector::new();
    if self.lexical_entry_features {
      features.add(&Self::lexical_entry_key(entry), 1.0);
    }
    if self.origin_features {
      features.add(&FeatureVector::key(ORIGIN_TAG, &entry.origin), 1.0);
    }
    features
  }

  fn rule_features(
    &self,
    rule: &RuleName,
    _result: &Category<M>,
    _span: &SentenceSpan,
  ) -> FeatureVector {
    let mut features = FeatureVector::new();
    if !self.rule_features {
      return features;
    }
    for component in rule.components() {
      let name = component.to_string();
      if !self.ignored_rules.contains(&name) {
        features.add(&FeatureVector::key(RULE_TAG, &name), 1.0);
      }
    }
    features
  }

  fn score(&self, features: &FeatureVector) -> f64 {
    self.weights.dot(features)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexicon::FIXED_ORIGIN;
  use crate::rules::{Direction, RuleLabel};
  use crate::syntax::Syntax;

  #[test]
  fn test_feature_vector() {
    let mut a = FeatureVector::new();
    a.add("RULE:>apply", 1.0);
    a.add("RULE:>apply", 1.0);
    a.add("LEX:x", 0.5);
    assert_eq!(a.get("RULE:>apply"), 2.0);
    assert_eq!(a.get("missing"), 0.0);

    let mut b = FeatureVector::new();
    b.set("RULE:>apply", 3.0);
    assert_eq!(a.dot(&b), 6.0);
    assert_eq!(b.dot(&a), 6.0);

    a += &b;
    assert_eq!(a.get("RULE:>apply"), 5.0);
    a.add("LEX:x", -0.5);
    assert_eq!(a.len(), 1);
    assert_eq!(a.to_string(), "{RULE:>apply=5}");
    assert_eq!(a.scaled(0.5).get("RULE:>apply"), 2.5);
  }

  #[test]
  fn test_linear_model_features() {
    let model = LinearModel::new();
    let entry = LexicalEntry::new(
      vec!["dog".to_string()],
      Category::new(Syntax::atom("NP"), "dog".to_string()),
      FIXED_ORIGIN,
    );
    let span = SentenceSpan::new(0, 1, 1);

    let lexical = model.lexical_features(&entry, &span);
    assert_eq!(lexical.get("LEX:dog :- NP : dog"), 1.0);
    assert_eq!(lexical.get("ORIGIN:fixed"), 1.0);

    let raise = RuleName::new(RuleLabel::TypeRaising, Some(Direction::Forward), 0);
    let fused = RuleName::lexical().overload(&raise);
    let rules = ScoringModel::<String>::rule_features(&model, &fused, &entry.category, &span);
    assert_eq!(rules.to_string(), "{RULE:>T=1}");

    let quiet = LinearModel::new().with_rule_features(false);
    assert!(ScoringModel::<String>::rule_features(&quiet, &raise, &entry.category, &span).is_empty());
  }

  #[test]
  fn test_linear_model_score_and_update() {
    let mut model = LinearModel::new();
    let mut delta = FeatureVector::new();
    delta.add("RULE:>apply", 2.0);
    model.update(&delta, 0.5);
    assert_eq!(model.weight("RULE:>apply"), 1.0);

    let mut features = FeatureVector::new();
    features.add("RULE:>apply", 3.0);
    features.add("RULE:<apply", 1.0);
    assert_eq!(ScoringModel::<String>::score(&model, &features), 3.0);
  }

  #[test]
  #[should_panic(expected = "malformed update")]
  fn test_nan_update_aborts() {
    let mut model = LinearModel::new();
    let mut delta = FeatureVector::new();
    delta.add("RULE:>apply", f64::NAN);
    model.update(&delta, 1.0);
  }
}
