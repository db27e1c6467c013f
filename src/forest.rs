//! Reading results out of a filled chart.
//!
//! A [`Derivation`] is a complete-span cell that passed the complete-parse filter,
//! standing for every derivation tree packed into it. Expectations are computed with an
//! inside/outside pass over the chart: inside scores are kept on every cell as it is
//! built, outside scores are pushed down from the accepted complete-span cells, so no
//! tree is ever enumerated.

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

use crate::category::{Category, Semantics};
use crate::chart::{Cell, CellId, Chart};
use crate::lexicon::LexicalEntry;
use crate::model::FeatureVector;
use crate::rules::RuleName;
use crate::syntree::{Constituent, SynTree, Word};
use crate::utils::{combinations, log_sum_exp, log_sum_exp_all, scores_tie};

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
  #[error("non-finite expectation {value} for feature {feature}")]
  NonFinite { feature: String, value: f64 },
}

/// Label of an inner node of an enumerated derivation tree
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationStep<M> {
  pub category: Category<M>,
  pub rule: RuleName,
}

impl<M: fmt::Display> fmt::Display for DerivationStep<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} [{}]", self.category, self.rule)
  }
}

pub type DerivationTree<M> = SynTree<DerivationStep<M>, String>;

/// The result of one parse
pub struct ParseOutput<M: Semantics> {
  chart: Chart<M>,
  inference_time: Duration,
  viterbi_features: OnceCell<Vec<FeatureVector>>,
}

impl<M: Semantics> ParseOutput<M> {
  pub(crate) fn new(chart: Chart<M>, inference_time: Duration) -> Self {
    Self {
      chart,
      inference_time,
      viterbi_features: OnceCell::new(),
    }
  }

  pub fn chart(&self) -> &Chart<M> {
    &self.chart
  }

  /// False if the per-span cap dropped anything, in which case derivations and
  /// expectations only cover what survived
  pub fn is_exact(&self) -> bool {
    !self.chart.is_pruned()
  }

  pub fn inference_time(&self) -> Duration {
    self.inference_time
  }

  pub fn inference_time_millis(&self) -> u64 {
    self.inference_time.as_millis() as u64
  }

  fn complete_cells(&self) -> impl Iterator<Item = &Cell<M>> {
    self
      .chart
      .span_cells(self.chart.complete_span())
      .filter(|c| c.is_full_parse())
  }

  pub fn all_derivations(&self) -> Vec<Derivation<'_, M>> {
    self.derivations(|_| true)
  }

  /// Derivations whose category passes `filter`
  pub fn derivations(&self, filter: impl Fn(&Category<M>) -> bool) -> Vec<Derivation<'_, M>> {
    self
      .complete_cells()
      .filter(|c| filter(c.category()))
      .map(|cell| Derivation { output: self, cell })
      .collect()
  }

  /// Every derivation tied for the highest Viterbi score
  pub fn best_derivations(&self) -> Vec<Derivation<'_, M>> {
    self.best_derivations_with(|_| true)
  }

  /// Like [`Self::best_derivations`], among the derivations passing `filter`
  pub fn best_derivations_with(&self, filter: impl Fn(&Category<M>) -> bool) -> Vec<Derivation<'_, M>> {
    let derivations = self.derivations(filter);
    let best = derivations
      .iter()
      .map(Derivation::score)
      .fold(f64::NEG_INFINITY, f64::max);
    derivations
      .into_iter()
      .filter(|d| scores_tie(d.score(), best))
      .collect()
  }

  /// Mean over a cell's tied Viterbi steps of the features of the whole derivation
  /// below it. Children always precede their parents in the arena, so one pass fills
  /// everything.
  fn viterbi_features(&self, id: CellId) -> &FeatureVector {
    let all = self.viterbi_features.get_or_init(|| {
      let mut all: Vec<FeatureVector> = Vec::with_capacity(self.chart.num_cells());
      for cell in self.chart.cells() {
        let mut mean = FeatureVector::new();
        let steps = cell.viterbi_steps().collect::<Vec<_>>();
        let scale = 1.0 / steps.len() as f64;
        for step in steps {
          mean.add_scaled(&step.features, scale);
          for child in step.children.iter() {
            mean.add_scaled(&all[child.index()], scale);
          }
        }
        all.push(mean);
      }
      all
    });
    &all[id.index()]
  }

  /// Outside scores in log space, seeded by `init` on the accepted complete-span cells
  /// and −∞ elsewhere.
  fn outside_scores(&self, init: &dyn Fn(&Cell<M>) -> f64) -> Vec<f64> {
    let mut outside = vec![f64::NEG_INFINITY; self.chart.num_cells()];
    for cell in self.complete_cells() {
      outside[cell.id().index()] = init(cell);
    }

    // parents always come after their children
    for cell in self.chart.cells().collect::<Vec<_>>().into_iter().rev() {
      let parent = outside[cell.id().index()];
      if parent == f64::NEG_INFINITY {
        continue;
      }
      for step in cell.steps() {
        for (idx, child) in step.children.iter().enumerate() {
          let siblings = step
            .children
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != idx)
            .map(|(_, c)| self.chart.cell(*c).inside_score())
            .sum::<f64>();
          let slot = &mut outside[child.index()];
          *slot = log_sum_exp(*slot, parent + step.local_score + siblings);
        }
      }
    }
    outside
  }

  /// Σ over every step of exp(outside(parent) + inside(step) - shift) × features
  fn expectations(&self, init: &dyn Fn(&Cell<M>) -> f64, shift: f64) -> Result<FeatureVector, ForestError> {
    let outside = self.outside_scores(init);
    let mut expected = FeatureVector::new();
    for cell in self.chart.cells() {
      let parent = outside[cell.id().index()];
      if parent == f64::NEG_INFINITY {
        continue;
      }
      for step in cell.steps() {
        let weight = (parent + step.inside_score() - shift).exp();
        if weight != 0.0 {
          expected.add_scaled(&step.features, weight);
        }
      }
    }

    if let Some(feature) = expected.first_non_finite() {
      let value = expected.get(feature);
      tracing::warn!(feature, value, "non-finite expectation");
      return Err(ForestError::NonFinite {
        feature: feature.to_string(),
        value,
      });
    }
    Ok(expected)
  }

  fn accepting(filter: impl Fn(&Category<M>) -> bool) -> impl Fn(&Cell<M>) -> f64 {
    move |cell| {
      if filter(cell.category()) {
        0.0
      } else {
        f64::NEG_INFINITY
      }
    }
  }

  /// Log of the summed exponentiated scores of every derivation
  pub fn log_norm(&self) -> f64 {
    self.log_norm_with(|_| true)
  }

  pub fn log_norm_with(&self, filter: impl Fn(&Category<M>) -> bool) -> f64 {
    log_sum_exp_all(
      self
        .complete_cells()
        .filter(|c| filter(c.category()))
        .map(Cell::inside_score),
    )
  }

  pub fn norm(&self) -> f64 {
    self.log_norm().exp()
  }

  /// Unnormalized expected features over every derivation
  pub fn expected_features(&self) -> Result<FeatureVector, ForestError> {
    self.expected_features_with(|_| true)
  }

  pub fn expected_features_with(
    &self,
    filter: impl Fn(&Category<M>) -> bool,
  ) -> Result<FeatureVector, ForestError> {
    self.expectations(&Self::accepting(filter), 0.0)
  }

  /// Unnormalized expected features, each complete derivation additionally weighted by
  /// `exp(log_scorer(category))`
  pub fn expected_features_scored(
    &self,
    log_scorer: impl Fn(&Category<M>) -> f64,
  ) -> Result<FeatureVector, ForestError> {
    self.expectations(&|cell: &Cell<M>| log_scorer(cell.category()), 0.0)
  }

  /// Expected features under the distribution the current scores induce over
  /// derivations. This is the gradient of [`Self::log_norm`].
  pub fn normalized_expected_features(&self) -> Result<FeatureVector, ForestError> {
    self.normalized_expected_features_with(|_| true)
  }

  pub fn normalized_expected_features_with(
    &self,
    filter: impl Fn(&Category<M>) -> bool,
  ) -> Result<FeatureVector, ForestError> {
    let init = Self::accepting(filter);
    let log_norm = log_sum_exp_all(self.complete_cells().map(|c| c.inside_score() + init(c)));
    if log_norm == f64::NEG_INFINITY {
      return Ok(FeatureVector::new());
    }
    self.expectations(&init, log_norm)
  }

  /// Distinct lexical entries under `root` in first-use order, each with the number
  /// of chart cells it was used in
  fn lexical_entries(&self, root: &Cell<M>, viterbi_only: bool) -> Vec<(Rc<LexicalEntry<M>>, usize)> {
    let mut seen_cells = HashSet::new();
    let mut positions: HashMap<Rc<LexicalEntry<M>>, usize> = HashMap::new();
    let mut entries: Vec<(Rc<LexicalEntry<M>>, usize)> = Vec::new();
    let mut stack = vec![root.id()];
    while let Some(id) = stack.pop() {
      if !seen_cells.insert(id) {
        continue;
      }
      let cell = self.chart.cell(id);
      let steps: Vec<_> = if viterbi_only {
        cell.viterbi_steps().collect()
      } else {
        cell.steps().iter().collect()
      };
      for step in steps {
        if let Some(entry) = &step.lexical_entry {
          match positions.get(entry) {
            Some(&i) => entries[i].1 += 1,
            None => {
              positions.insert(entry.clone(), entries.len());
              entries.push((entry.clone(), 1));
            }
          }
        }
        // reversed so the leftmost child is visited first
        stack.extend(step.children.iter().rev());
      }
    }
    entries
  }

  fn viterbi_rules(&self, root: &Cell<M>) -> Vec<RuleName> {
    let mut rules = Vec::new();
    let mut seen_cells = HashSet::new();
    let mut stack = vec![root.id()];
    while let Some(id) = stack.pop() {
      if !seen_cells.insert(id) {
        continue;
      }
      for step in self.chart.cell(id).viterbi_steps() {
        for rule in step.rule.components() {
          if !rules.contains(&rule) {
            rules.push(rule);
          }
        }
        stack.extend(step.children.iter().rev());
      }
    }
    rules
  }

  fn trees(&self, cell: &Cell<M>, limit: usize) -> Vec<DerivationTree<M>> {
    let mut out = Vec::new();
    for step in cell.steps() {
      if out.len() >= limit {
        break;
      }
      let label = Constituent {
        value: DerivationStep {
          category: cell.category().clone(),
          rule: step.rule.clone(),
        },
        span: cell.span(),
      };
      match &step.lexical_entry {
        Some(entry) => {
          let word = Word {
            value: entry.tokens.join(" "),
            span: cell.span(),
          };
          out.push(SynTree::Branch(label, vec![SynTree::Leaf(word)]));
        }
        None => {
          let child_sets = step
            .children
            .iter()
            .map(|c| self.trees(self.chart.cell(*c), limit))
            .collect::<Vec<_>>();
          let remaining = limit - out.len();
          for children in combinations(&child_sets).into_iter().take(remaining) {
            out.push(SynTree::Branch(label.clone(), children));
          }
        }
      }
    }
    out
  }
}

impl<M: Semantics> fmt::Display for ParseOutput<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.chart)
  }
}

/// A complete parse: one accepted complete-span cell and every tree packed into it
pub struct Derivation<'a, M: Semantics> {
  output: &'a ParseOutput<M>,
  cell: &'a Cell<M>,
}

impl<'a, M: Semantics> Derivation<'a, M> {
  pub fn cell(&self) -> &'a Cell<M> {
    self.cell
  }

  pub fn category(&self) -> &'a Category<M> {
    self.cell.category()
  }

  pub fn semantics(&self) -> Option<&'a M> {
    self.cell.category().semantics.as_ref()
  }

  /// Viterbi score
  pub fn score(&self) -> f64 {
    self.cell.viterbi_score()
  }

  pub fn inside_score(&self) -> f64 {
    self.cell.inside_score()
  }

  pub fn num_parses(&self) -> u64 {
    self.cell.num_parses()
  }

  pub fn num_viterbi_parses(&self) -> u64 {
    self.cell.num_viterbi_parses()
  }

  /// Features of the Viterbi derivation, averaged where Viterbi steps tie
  pub fn features(&self) -> &'a FeatureVector {
    self.output.viterbi_features(self.cell.id())
  }

  /// Every lexical entry used by any tree of this derivation, each listed once
  pub fn lexical_entries(&self) -> Vec<Rc<LexicalEntry<M>>> {
    self.lexical_entry_counts().into_iter().map(|(e, _)| e).collect()
  }

  /// Lexical entries with the number of distinct chart cells (spans) each one fills,
  /// so an entry used for two different words counts twice
  pub fn lexical_entry_counts(&self) -> Vec<(Rc<LexicalEntry<M>>, usize)> {
    self.output.lexical_entries(self.cell, false)
  }

  pub fn viterbi_lexical_entries(&self) -> Vec<Rc<LexicalEntry<M>>> {
    self
      .output
      .lexical_entries(self.cell, true)
      .into_iter()
      .map(|(e, _)| e)
      .collect()
  }

  /// Plain rule names used by the Viterbi trees, fused rules split into their parts
  pub fn viterbi_rules(&self) -> Vec<RuleName> {
    self.output.viterbi_rules(self.cell)
  }

  /// Up to `limit` of the trees packed into this derivation
  pub fn trees(&self, limit: usize) -> Vec<DerivationTree<M>> {
    self.output.trees(self.cell, limit)
  }
}

impl<M: Semantics> fmt::Display for Derivation<'_, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:.3}] {}", self.score(), self.category())
  }
}

impl<M: Semantics> fmt::Debug for Derivation<'_, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Derivation")
      .field("category", self.category())
      .field("score", &self.score())
      .field("num_parses", &self.num_parses())
      .finish()
  }
}
