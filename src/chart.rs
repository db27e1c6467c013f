//! The CKY chart: an arena of cells, one per distinct `(span, category)`, each holding
//! every step (provenance record) that derives it.
//!
//! Cells are added a span at a time. Candidates for a span are staged in an [`Agenda`],
//! where identical categories merge, and then admitted to the chart in one go, which is
//! where the per-span cap is applied. Once admitted, a cell's children are never touched
//! again, so scores computed on insert stay valid for the rest of the parse.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::category::{Category, Semantics};
use crate::lexicon::LexicalEntry;
use crate::model::FeatureVector;
use crate::rules::{RuleName, SentenceSpan};
use crate::utils::{log_sum_exp, scores_tie};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(usize);

impl CellId {
  pub fn index(self) -> usize {
    self.0
  }
}

/// Half-open token span `[begin, end)`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
  pub begin: usize,
  pub end: usize,
}

impl Span {
  pub fn new(begin: usize, end: usize) -> Self {
    assert!(begin < end, "empty span {}..{}", begin, end);
    Self { begin, end }
  }

  pub fn len(&self) -> usize {
    self.end - self.begin
  }

  pub fn is_empty(&self) -> bool {
    self.begin == self.end
  }

  pub fn in_sentence(&self, length: usize) -> SentenceSpan {
    SentenceSpan::new(self.begin, self.end, length)
  }
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}", self.begin, self.end)
  }
}

/// One way of deriving a cell: the rule used, and either the child cells it combined or
/// the lexical entry it came from. A unary rule fused onto a step keeps that step's
/// children or entry.
#[derive(Debug, Clone)]
pub struct Step<M> {
  pub rule: RuleName,
  pub children: Vec<CellId>,
  pub lexical_entry: Option<Rc<LexicalEntry<M>>>,
  /// Features of this step alone, excluding the children
  pub features: FeatureVector,
  pub local_score: f64,
  viterbi_score: f64,
  inside_score: f64,
}

impl<M> Step<M> {
  pub fn lexical(entry: Rc<LexicalEntry<M>>, features: FeatureVector, local_score: f64) -> Self {
    Self::new(RuleName::lexical(), Vec::new(), Some(entry), features, local_score)
  }

  pub fn binary(
    rule: RuleName,
    left: CellId,
    right: CellId,
    features: FeatureVector,
    local_score: f64,
  ) -> Self {
    Self::new(rule, vec![left, right], None, features, local_score)
  }

  /// The same derivation with `unary` applied on top
  pub fn overload(&self, unary: &RuleName, features: FeatureVector, local_score: f64) -> Self {
    Self::new(
      self.rule.overload(unary),
      self.children.clone(),
      self.lexical_entry.clone(),
      features,
      local_score,
    )
  }

  fn new(
    rule: RuleName,
    children: Vec<CellId>,
    lexical_entry: Option<Rc<LexicalEntry<M>>>,
    features: FeatureVector,
    local_score: f64,
  ) -> Self {
    Self {
      rule,
      children,
      lexical_entry,
      features,
      local_score,
      viterbi_score: f64::NEG_INFINITY,
      inside_score: f64::NEG_INFINITY,
    }
  }

  pub fn is_lexical(&self) -> bool {
    self.lexical_entry.is_some()
  }

  /// Local score plus the children's Viterbi scores
  pub fn viterbi_score(&self) -> f64 {
    self.viterbi_score
  }

  /// Local score plus the children's inside scores, in log space
  pub fn inside_score(&self) -> f64 {
    self.inside_score
  }

  fn same_derivation(&self, other: &Step<M>) -> bool
  where
    M: PartialEq,
  {
    self.rule == other.rule
      && self.children == other.children
      && self.lexical_entry == other.lexical_entry
  }
}

#[derive(Debug, Clone)]
pub struct Cell<M> {
  id: CellId,
  category: Category<M>,
  span: Span,
  steps: Vec<Step<M>>,
  viterbi_score: f64,
  viterbi_steps: Vec<usize>,
  inside_score: f64,
  num_parses: u64,
  num_viterbi_parses: u64,
  full_parse: bool,
}

impl<M> Cell<M> {
  pub fn id(&self) -> CellId {
    self.id
  }

  pub fn category(&self) -> &Category<M> {
    &self.category
  }

  pub fn span(&self) -> Span {
    self.span
  }

  pub fn steps(&self) -> &[Step<M>] {
    &self.steps
  }

  pub fn viterbi_steps(&self) -> impl Iterator<Item = &Step<M>> {
    self.viterbi_steps.iter().map(move |&idx| &self.steps[idx])
  }

  pub fn viterbi_score(&self) -> f64 {
    self.viterbi_score
  }

  /// Log of the summed exponentiated scores of every derivation of this cell
  pub fn inside_score(&self) -> f64 {
    self.inside_score
  }

  pub fn num_parses(&self) -> u64 {
    self.num_parses
  }

  pub fn num_viterbi_parses(&self) -> u64 {
    self.num_viterbi_parses
  }

  /// Spans the whole sentence and passed the complete-parse filter
  pub fn is_full_parse(&self) -> bool {
    self.full_parse
  }

  /// Names of the rules that built this cell
  pub fn generating_rules(&self) -> impl Iterator<Item = &RuleName> {
    self.steps.iter().map(|s| &s.rule)
  }

  pub fn has_lexical_step(&self) -> bool {
    self.steps.iter().any(Step::is_lexical)
  }
}

#[derive(Debug)]
struct SpanCells<M> {
  ids: Vec<CellId>,
  by_category: HashMap<Category<M>, CellId>,
}

impl<M> Default for SpanCells<M> {
  fn default() -> Self {
    Self {
      ids: Vec::new(),
      by_category: HashMap::new(),
    }
  }
}

#[derive(Debug)]
pub struct Chart<M> {
  tokens: Vec<String>,
  cells: Vec<Cell<M>>,
  spans: HashMap<Span, SpanCells<M>>,
  pruned: BTreeSet<Span>,
}

impl<M: Semantics> Chart<M> {
  pub fn new(tokens: Vec<String>) -> Self {
    Self {
      tokens,
      cells: Vec::new(),
      spans: HashMap::new(),
      pruned: BTreeSet::new(),
    }
  }

  /// Sentence length in tokens
  pub fn len(&self) -> usize {
    self.tokens.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tokens.is_empty()
  }

  pub fn tokens(&self) -> &[String] {
    &self.tokens
  }

  pub fn num_cells(&self) -> usize {
    self.cells.len()
  }

  pub fn cell(&self, id: CellId) -> &Cell<M> {
    &self.cells[id.0]
  }

  pub fn cells(&self) -> impl Iterator<Item = &Cell<M>> {
    self.cells.iter()
  }

  /// `0..len`. Empty for an empty sentence, which no cell ever covers.
  pub fn complete_span(&self) -> Span {
    Span {
      begin: 0,
      end: self.len(),
    }
  }

  pub fn is_complete_span(&self, cell: &Cell<M>) -> bool {
    cell.span == self.complete_span()
  }

  pub fn span_cells(&self, span: Span) -> impl Iterator<Item = &Cell<M>> {
    self
      .spans
      .get(&span)
      .into_iter()
      .flat_map(|s| s.ids.iter())
      .map(move |&id| self.cell(id))
  }

  pub fn get(&self, span: Span, category: &Category<M>) -> Option<&Cell<M>> {
    let id = self.spans.get(&span)?.by_category.get(category)?;
    Some(self.cell(*id))
  }

  /// Spans where the cap dropped at least one candidate
  pub fn pruned_spans(&self) -> impl Iterator<Item = Span> + '_ {
    self.pruned.iter().copied()
  }

  pub fn is_pruned(&self) -> bool {
    !self.pruned.is_empty()
  }

  fn score_step(&self, span: Span, step: &mut Step<M>) {
    let mut cursor = span.begin;
    for child in step.children.iter() {
      let child_span = self.cell(*child).span;
      assert!(
        child_span.begin == cursor && child_span.len() < span.len(),
        "child {} doesn't tile parent {}",
        child_span,
        span
      );
      cursor = child_span.end;
    }
    assert!(
      step.children.is_empty() || cursor == span.end,
      "children of a step must cover {}",
      span
    );

    let children = step.children.iter().map(|c| self.cell(*c));
    let (viterbi, inside) = children.fold((0.0, 0.0), |(v, i), c| {
      (v + c.viterbi_score, i + c.inside_score)
    });
    step.viterbi_score = step.local_score + viterbi;
    step.inside_score = step.local_score + inside;
  }

  fn step_parses(&self, step: &Step<M>) -> (u64, u64) {
    step.children.iter().fold((1, 1), |(all, viterbi), c| {
      let c = self.cell(*c);
      (
        all.saturating_mul(c.num_parses),
        viterbi.saturating_mul(c.num_viterbi_parses),
      )
    })
  }

  /// Merges `step` into the cell for `(span, category)`, creating the cell if needed.
  /// Adding a step that is already present is a no-op. Returns the cell.
  pub fn add(&mut self, span: Span, category: Category<M>, mut step: Step<M>, full_parse: bool) -> CellId {
    self.score_step(span, &mut step);
    let (parses, viterbi_parses) = self.step_parses(&step);

    let span_cells = self.spans.entry(span).or_default();
    if let Some(&id) = span_cells.by_category.get(&category) {
      let cell = &mut self.cells[id.0];
      if cell.steps.iter().any(|s| s.same_derivation(&step)) {
        return id;
      }
      let idx = cell.steps.len();
      if scores_tie(step.viterbi_score, cell.viterbi_score) {
        cell.viterbi_steps.push(idx);
        cell.num_viterbi_parses = cell.num_viterbi_parses.saturating_add(viterbi_parses);
      } else if step.viterbi_score > cell.viterbi_score {
        cell.viterbi_score = step.viterbi_score;
        cell.viterbi_steps = vec![idx];
        cell.num_viterbi_parses = viterbi_parses;
      }
      cell.inside_score = log_sum_exp(cell.inside_score, step.inside_score);
      cell.num_parses = cell.num_parses.saturating_add(parses);
      cell.full_parse |= full_parse;
      cell.steps.push(step);
      tracing::trace!(%span, cell = id.0, steps = cell.steps.len(), "merged step");
      return id;
    }

    let id = CellId(self.cells.len());
    span_cells.ids.push(id);
    span_cells.by_category.insert(category.clone(), id);
    self.cells.push(Cell {
      id,
      category,
      span,
      viterbi_score: step.viterbi_score,
      viterbi_steps: vec![0],
      inside_score: step.inside_score,
      num_parses: parses,
      num_viterbi_parses: viterbi_parses,
      full_parse,
      steps: vec![step],
    });
    id
  }

  /// Moves every candidate of `agenda` into the chart, keeping at most `cap` of them
  /// plus any that tie with the last one kept. Candidates with a lexical step are
  /// never dropped when `cap_lexical` is false. Returns the admitted cells.
  pub fn admit(&mut self, agenda: Agenda<M>, cap: Option<usize>, cap_lexical: bool) -> Vec<CellId> {
    let span = agenda.span;
    let mut candidates = agenda.candidates;
    candidates.sort_by(|a, b| b.viterbi_score().total_cmp(&a.viterbi_score()));

    let exempt = |c: &Candidate<M>| !cap_lexical && c.steps.iter().any(Step::is_lexical);
    let threshold = cap.and_then(|cap| {
      candidates
        .iter()
        .filter(|&c| !exempt(c))
        .nth(cap.checked_sub(1)?)
        .map(Candidate::viterbi_score)
    });
    // cap 0 admits nothing that is subject to the cap
    let threshold = match cap {
      Some(0) => Some(f64::INFINITY),
      _ => threshold,
    };

    let mut admitted = Vec::with_capacity(candidates.len());
    let mut dropped = 0;
    for candidate in candidates {
      if let Some(threshold) = threshold {
        let score = candidate.viterbi_score();
        if !exempt(&candidate) && score < threshold && !scores_tie(score, threshold) {
          dropped += 1;
          continue;
        }
      }
      let full_parse = candidate.full_parse;
      let mut id = None;
      for step in candidate.steps {
        id = Some(self.add(span, candidate.category.clone(), step, full_parse));
      }
      admitted.extend(id);
    }

    if dropped > 0 {
      tracing::debug!(%span, dropped, kept = admitted.len(), "span pruned by cap");
      self.pruned.insert(span);
    }
    admitted
  }
}

impl<M> fmt::Display for Chart<M>
where
  M: Semantics,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut spans = self.spans.keys().copied().collect::<Vec<_>>();
    spans.sort();
    for span in spans {
      let words = self.tokens[span.begin..span.end].join(" ");
      writeln!(f, "{} \"{}\":", span, words)?;
      let mut cells = self.span_cells(span).collect::<Vec<_>>();
      cells.sort_by(|a, b| b.viterbi_score.total_cmp(&a.viterbi_score));
      for cell in cells {
        let rules = cell.steps.iter().map(|s| s.rule.to_string()).collect::<Vec<_>>();
        writeln!(
          f,
          "  {} [{:.3}, {} parse{}] {}",
          cell.category,
          cell.viterbi_score,
          cell.num_parses,
          if cell.num_parses == 1 { "" } else { "s" },
          rules.join(" ")
        )?;
      }
    }
    if !self.pruned.is_empty() {
      let pruned = self.pruned.iter().map(|s| s.to_string()).collect::<Vec<_>>();
      writeln!(f, "pruned: {}", pruned.join(", "))?;
    }
    Ok(())
  }
}

/// A category waiting to be admitted, with every step found for it so far
#[derive(Debug, Clone)]
pub struct Candidate<M> {
  pub category: Category<M>,
  pub steps: Vec<Step<M>>,
  pub full_parse: bool,
}

impl<M> Candidate<M> {
  pub fn viterbi_score(&self) -> f64 {
    self
      .steps
      .iter()
      .map(Step::viterbi_score)
      .fold(f64::NEG_INFINITY, f64::max)
  }

  pub fn generating_rules(&self) -> impl Iterator<Item = &RuleName> {
    self.steps.iter().map(|s| &s.rule)
  }
}

/// Staging area for the candidates of one span
#[derive(Debug)]
pub struct Agenda<M> {
  span: Span,
  candidates: Vec<Candidate<M>>,
  index: HashMap<Category<M>, usize>,
}

impl<M: Semantics> Agenda<M> {
  pub fn new(span: Span) -> Self {
    Self {
      span,
      candidates: Vec::new(),
      index: HashMap::new(),
    }
  }

  pub fn span(&self) -> Span {
    self.span
  }

  pub fn len(&self) -> usize {
    self.candidates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty()
  }

  pub fn candidates(&self) -> &[Candidate<M>] {
    &self.candidates
  }

  /// Stages a step. Scores are computed against `chart`, which must already hold
  /// the step's children.
  pub fn add(&mut self, chart: &Chart<M>, category: Category<M>, mut step: Step<M>, full_parse: bool) {
    chart.score_step(self.span, &mut step);
    match self.index.get(&category) {
      Some(&idx) => {
        let candidate = &mut self.candidates[idx];
        if !candidate.steps.iter().any(|s| s.same_derivation(&step)) {
          candidate.steps.push(step);
        }
        candidate.full_parse |= full_parse;
      }
      None => {
        self.index.insert(category.clone(), self.candidates.len());
        self.candidates.push(Candidate {
          category,
          steps: vec![step],
          full_parse,
        });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexicon::FIXED_ORIGIN;
  use crate::rules::{Direction, RuleLabel};
  use crate::syntax::Syntax;

  fn category(syntax: &str, sem: &str) -> Category<String> {
    Category::new(syntax.parse::<Syntax>().unwrap(), sem.to_string())
  }

  fn lexical_step(token: &str, cat: &Category<String>, score: f64) -> Step<String> {
    let entry = Rc::new(LexicalEntry::new(
      vec![token.to_string()],
      cat.clone(),
      FIXED_ORIGIN,
    ));
    Step::lexical(entry, FeatureVector::new(), score)
  }

  fn fapply() -> RuleName {
    RuleName::binary(RuleLabel::Application, Direction::Forward)
  }

  fn bapply() -> RuleName {
    RuleName::binary(RuleLabel::Application, Direction::Backward)
  }

  /// "a b" with a: X/Y, b: Y and one binary cell over both
  fn small_chart() -> (Chart<String>, CellId, CellId) {
    let mut chart = Chart::new(vec!["a".to_string(), "b".to_string()]);
    let a = category("X/Y", "a");
    let b = category("Y", "b");
    let left = chart.add(Span::new(0, 1), a.clone(), lexical_step("a", &a, 1.0), false);
    let right = chart.add(Span::new(1, 2), b.clone(), lexical_step("b", &b, 2.0), false);
    (chart, left, right)
  }

  #[test]
  fn test_add_merges_same_category() {
    let (mut chart, left, right) = small_chart();
    let x = category("X", "ab");
    let first = chart.add(
      Span::new(0, 2),
      x.clone(),
      Step::binary(fapply(), left, right, FeatureVector::new(), 0.5),
      true,
    );
    assert_eq!(chart.cell(first).viterbi_score(), 3.5);

    // identical step: nothing changes
    let again = chart.add(
      Span::new(0, 2),
      x.clone(),
      Step::binary(fapply(), left, right, FeatureVector::new(), 0.5),
      true,
    );
    assert_eq!(first, again);
    assert_eq!(chart.cell(first).steps().len(), 1);

    // a lower-scoring second derivation: new step, score doesn't regress
    let third = chart.add(
      Span::new(0, 2),
      x.clone(),
      Step::binary(bapply(), left, right, FeatureVector::new(), -1.0),
      true,
    );
    assert_eq!(first, third);
    let cell = chart.cell(first);
    assert_eq!(cell.steps().len(), 2);
    assert_eq!(cell.viterbi_score(), 3.5);
    assert_eq!(cell.num_parses(), 2);
    assert_eq!(cell.num_viterbi_parses(), 1);
    let expected_inside = log_sum_exp(3.5, 2.0);
    assert!((cell.inside_score() - expected_inside).abs() < 1e-12);
    assert_eq!(chart.span_cells(Span::new(0, 2)).count(), 1);
    assert_eq!(chart.num_cells(), 3);
    assert!(chart.is_complete_span(cell));
    assert!(cell.is_full_parse());

    // a higher-scoring one takes over the Viterbi slot
    chart.add(
      Span::new(0, 2),
      x,
      Step::binary(RuleName::new(RuleLabel::Custom("other".to_string()), None, 0), left, right, FeatureVector::new(), 4.0),
      true,
    );
    let cell = chart.cell(first);
    assert_eq!(cell.viterbi_score(), 7.0);
    assert_eq!(cell.viterbi_steps().count(), 1);
  }

  #[test]
  fn test_scores_one_ulp_apart_tie() {
    let (mut chart, left, right) = small_chart();
    let x = category("X", "ab");
    let first = chart.add(
      Span::new(0, 2),
      x.clone(),
      Step::binary(fapply(), left, right, FeatureVector::new(), 1.0),
      true,
    );
    chart.add(
      Span::new(0, 2),
      x,
      Step::binary(bapply(), left, right, FeatureVector::new(), 1.0 + 4.0 * f64::EPSILON),
      true,
    );
    let cell = chart.cell(first);
    assert_ne!(cell.steps()[0].viterbi_score, cell.steps()[1].viterbi_score);
    assert_eq!(cell.viterbi_steps().count(), 2);
    assert_eq!(cell.num_viterbi_parses(), 2);
  }

  #[test]
  #[should_panic(expected = "doesn't tile")]
  fn test_non_adjacent_children_are_fatal() {
    let (mut chart, left, _) = small_chart();
    chart.add(
      Span::new(0, 2),
      category("X", "ab"),
      Step::binary(fapply(), left, left, FeatureVector::new(), 0.0),
      true,
    );
  }

  #[test]
  fn test_cap_keeps_ties() {
    let mut chart: Chart<String> = Chart::new(vec!["w".to_string()]);
    let span = Span::new(0, 1);
    let mut agenda = Agenda::new(span);
    let a = category("N", "a");
    let b = category("N", "b");
    let c = category("N", "c");
    agenda.add(&chart, a.clone(), lexical_step("w", &a, 1.0), true);
    agenda.add(&chart, b.clone(), lexical_step("w", &b, 1.0), true);
    agenda.add(&chart, c.clone(), lexical_step("w", &c, 0.5), true);

    let admitted = chart.admit(agenda, Some(1), true);
    assert_eq!(admitted.len(), 2);
    assert!(chart.get(span, &a).is_some());
    assert!(chart.get(span, &b).is_some());
    assert!(chart.get(span, &c).is_none());
    assert_eq!(chart.pruned_spans().collect::<Vec<_>>(), vec![span]);
  }

  #[test]
  fn test_cap_exempts_lexical_cells() {
    let mut chart: Chart<String> = Chart::new(vec!["w".to_string()]);
    let span = Span::new(0, 1);
    let mut agenda = Agenda::new(span);
    for (sem, score) in [("a", 3.0), ("b", 2.0), ("c", 1.0)] {
      let cat = category("N", sem);
      agenda.add(&chart, cat.clone(), lexical_step("w", &cat, score), true);
    }
    assert_eq!(chart.admit(agenda, Some(1), false).len(), 3);
    assert!(!chart.is_pruned());
  }

  #[test]
  fn test_agenda_merges_staged_steps() {
    let (chart, left, right) = small_chart();
    let mut agenda = Agenda::new(Span::new(0, 2));
    let x = category("X", "ab");
    agenda.add(&chart, x.clone(), Step::binary(fapply(), left, right, FeatureVector::new(), 0.0), false);
    agenda.add(&chart, x.clone(), Step::binary(fapply(), left, right, FeatureVector::new(), 0.0), false);
    agenda.add(&chart, x, Step::binary(bapply(), left, right, FeatureVector::new(), 0.0), false);
    agenda.add(&chart, category("Z", "z"), Step::binary(fapply(), left, right, FeatureVector::new(), 0.0), false);
    assert_eq!(agenda.len(), 2);
    assert_eq!(agenda.candidates()[0].steps.len(), 2);
    assert_eq!(agenda.candidates()[0].viterbi_score(), 3.0);
  }

  #[test]
  fn test_display_lists_cells_and_pruned_spans() {
    let (chart, _, _) = small_chart();
    let dump = chart.to_string();
    assert!(dump.contains("0..1 \"a\":"));
    assert!(dump.contains("X/Y : a [1.000, 1 parse] lex"));
    assert!(!dump.contains("pruned"));
  }
}
