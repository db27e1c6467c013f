//! The CKY driver: fills a [`Chart`] bottom-up, span length by span length.
//!
//! For every span, lexical entries, binary combinations over every split and then a
//! single pass of unary rules are staged in an [`Agenda`], pruned, and admitted to
//! the chart under the per-span cap. Unary rules never chain: each unary result is
//! fused with the step it was applied to, so the new step points at that step's
//! children rather than at a cell in the same span.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::category::{Category, CategoryServices, Semantics};
use crate::chart::{Agenda, Cell, Chart, Span, Step};
use crate::forest::ParseOutput;
use crate::lexicon::{CompositeLexicon, Lexicon, SentenceLexiconGenerator};
use crate::model::ScoringModel;
use crate::normal_form::NormalFormValidator;
use crate::rules::{
  Application, BinaryRule, Composition, RuleName, SentenceSpan, UnaryRule,
};

pub const DEFAULT_MAX_CELLS_IN_SPAN: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("sentence of {length} tokens is longer than the maximum of {max}")]
  SentenceTooLong { length: usize, max: usize },
  #[error("parse cancelled after completing spans up to length {completed}")]
  Cancelled { completed: usize },
}

/// A category about to enter the chart, as the pruning filter sees it
#[derive(Debug)]
pub struct ParsingOp<'a, M> {
  pub category: &'a Category<M>,
  pub span: SentenceSpan,
  pub rule: &'a RuleName,
}

pub type PruningFilter<'a, M> = dyn Fn(&ParsingOp<'_, M>) -> bool + 'a;

/// Per-call settings
pub struct ParseOptions<'a, M> {
  pruning_filter: Option<Box<PruningFilter<'a, M>>>,
  max_cells_in_span: Option<Option<usize>>,
  lexicon: Option<&'a dyn Lexicon<M>>,
  cancel: Option<Arc<AtomicBool>>,
  sloppy: bool,
}

impl<M> Default for ParseOptions<'_, M> {
  fn default() -> Self {
    Self {
      pruning_filter: None,
      max_cells_in_span: None,
      lexicon: None,
      cancel: None,
      sloppy: false,
    }
  }
}

impl<'a, M> ParseOptions<'a, M> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Hard filter: categories with semantics that fail it never enter the chart
  pub fn with_pruning_filter(mut self, filter: impl Fn(&ParsingOp<'_, M>) -> bool + 'a) -> Self {
    self.pruning_filter = Some(Box::new(filter));
    self
  }

  /// Overrides the parser's per-span cap for this call; `None` removes it
  pub fn with_max_cells_in_span(mut self, cap: Option<usize>) -> Self {
    self.max_cells_in_span = Some(cap);
    self
  }

  /// An extra lexicon used for this call only, alongside the parser's own
  pub fn with_lexicon(mut self, lexicon: &'a dyn Lexicon<M>) -> Self {
    self.lexicon = Some(lexicon);
    self
  }

  /// Checked before every span length; setting it aborts the parse
  pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
    self.cancel = Some(cancel);
    self
  }

  /// Lets the parser skip words through the word-skipping generator
  pub fn sloppy(mut self, sloppy: bool) -> Self {
    self.sloppy = sloppy;
    self
  }

  fn is_cancelled(&self) -> bool {
    self
      .cancel
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::Relaxed))
  }
}

type CompleteParseFilter<M> = dyn Fn(&Category<M>) -> bool;

pub struct Parser<M: Semantics> {
  binary_rules: Vec<Box<dyn BinaryRule<M>>>,
  unary_rules: Vec<Box<dyn UnaryRule<M>>>,
  validator: Option<NormalFormValidator>,
  lexicons: Vec<Box<dyn Lexicon<M>>>,
  word_skipping: Option<Box<dyn SentenceLexiconGenerator<M>>>,
  complete_parse_filter: Box<CompleteParseFilter<M>>,
  max_cells_in_span: Option<usize>,
  prune_lexical_cells: bool,
  max_sentence_length: Option<usize>,
}

impl<M: Semantics> fmt::Debug for Parser<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let binary = self.binary_rules.iter().map(|r| r.name().to_string()).collect::<Vec<_>>();
    let unary = self.unary_rules.iter().map(|r| r.name().to_string()).collect::<Vec<_>>();
    f.debug_struct("Parser")
      .field("binary_rules", &binary)
      .field("unary_rules", &unary)
      .field("validator", &self.validator.as_ref().map(|v| v.to_string()))
      .field("lexicons", &self.lexicons.len())
      .field("word_skipping", &self.word_skipping.is_some())
      .field("max_cells_in_span", &self.max_cells_in_span)
      .field("prune_lexical_cells", &self.prune_lexical_cells)
      .field("max_sentence_length", &self.max_sentence_length)
      .finish()
  }
}

/// Everything a span needs while it is being processed
struct SpanContext<'p, 'o, M: Semantics> {
  span: Span,
  sentence_span: SentenceSpan,
  model: &'p dyn ScoringModel<M>,
  options: &'p ParseOptions<'o, M>,
}

impl<M: Semantics> Parser<M> {
  pub fn builder() -> ParserBuilder<M> {
    ParserBuilder::new()
  }

  pub fn binary_rules(&self) -> impl Iterator<Item = &RuleName> {
    self.binary_rules.iter().map(|r| r.name())
  }

  pub fn unary_rules(&self) -> impl Iterator<Item = &RuleName> {
    self.unary_rules.iter().map(|r| r.name())
  }

  fn is_full_parse(&self, span: &SentenceSpan, category: &Category<M>) -> bool {
    span.is_complete() && (self.complete_parse_filter)(category)
  }

  /// True if the category should never enter the chart. Before unary rules run, a
  /// complete-span category that isn't a full parse survives only if some unary rule
  /// could still turn it into one.
  fn prune(&self, op: &ParsingOp<'_, M>, options: &ParseOptions<'_, M>, pre_unary: bool) -> bool {
    let category = op.category;
    if category.semantics.is_none() && !category.is_empty_category() {
      tracing::trace!(span = ?op.span, %category, "pruned: no semantics and not empty");
      return true;
    }
    if let Some(filter) = &options.pruning_filter {
      if category.semantics.is_some() && !filter(op) {
        tracing::trace!(span = ?op.span, %category, "pruned: pruning filter");
        return true;
      }
    }
    if op.span.is_complete() && !self.is_full_parse(&op.span, category) {
      if pre_unary
        && self
          .unary_rules
          .iter()
          .any(|rule| rule.is_valid_argument(category, &op.span))
      {
        return false;
      }
      tracing::trace!(span = ?op.span, %category, pre_unary, "pruned: complete span, not a full parse");
      return true;
    }
    false
  }

  fn lexical_cells(
    &self,
    ctx: &SpanContext<'_, '_, M>,
    tokens: &[&str],
    lexicon: &dyn Lexicon<M>,
    chart: &Chart<M>,
    agenda: &mut Agenda<M>,
  ) {
    let words = &tokens[ctx.span.begin..ctx.span.end];
    let lexical = RuleName::lexical();
    for entry in lexicon.entries_for(words) {
      let category = &entry.category;
      if category.semantics.is_none() && !category.is_empty_category() {
        tracing::trace!(span = %ctx.span, %entry, "dropped lexical entry without semantics");
        continue;
      }
      let op = ParsingOp {
        category,
        span: ctx.sentence_span,
        rule: &lexical,
      };
      if let Some(filter) = &ctx.options.pruning_filter {
        if category.semantics.is_some() && !filter(&op) {
          tracing::trace!(span = %ctx.span, %entry, "pruned lexical entry");
          continue;
        }
      }

      let mut features = ctx.model.lexical_features(&entry, &ctx.sentence_span);
      features += &ctx.model.rule_features(&lexical, category, &ctx.sentence_span);
      let score = ctx.model.score(&features);
      let full_parse = self.is_full_parse(&ctx.sentence_span, category);
      let category = category.clone();
      agenda.add(chart, category, Step::lexical(entry, features, score), full_parse);
    }
  }

  fn process_split(
    &self,
    ctx: &SpanContext<'_, '_, M>,
    split: usize,
    chart: &Chart<M>,
    agenda: &mut Agenda<M>,
  ) {
    let left_cells = chart
      .span_cells(Span::new(ctx.span.begin, split))
      .collect::<Vec<_>>();
    let right_cells = chart
      .span_cells(Span::new(split, ctx.span.end))
      .collect::<Vec<_>>();
    tracing::trace!(
      span = %ctx.span,
      split,
      left = left_cells.len(),
      right = right_cells.len(),
      "processing split"
    );

    for left in left_cells.iter() {
      for right in right_cells.iter() {
        for rule in self.binary_rules.iter() {
          if !self.is_valid_binary(left, right, rule.name()) {
            continue;
          }
          let Some(result) = rule.apply(left.category(), right.category(), &ctx.sentence_span) else {
            continue;
          };
          let op = ParsingOp {
            category: &result.category,
            span: ctx.sentence_span,
            rule: &result.name,
          };
          if self.prune(&op, ctx.options, true) {
            continue;
          }
          let features = ctx
            .model
            .rule_features(&result.name, &result.category, &ctx.sentence_span);
          let score = ctx.model.score(&features);
          let full_parse = self.is_full_parse(&ctx.sentence_span, &result.category);
          let step = Step::binary(result.name, left.id(), right.id(), features, score);
          agenda.add(chart, result.category, step, full_parse);
        }
      }
    }
  }

  fn is_valid_binary(&self, left: &Cell<M>, right: &Cell<M>, rule: &RuleName) -> bool {
    match &self.validator {
      Some(validator) => {
        validator.is_valid_binary(left.generating_rules(), right.generating_rules(), rule)
      }
      None => true,
    }
  }

  /// One pass of unary rules over everything staged for the span so far
  fn unary_process(&self, ctx: &SpanContext<'_, '_, M>, chart: &Chart<M>, agenda: &mut Agenda<M>) {
    if self.unary_rules.is_empty() {
      return;
    }

    let mut staged = Vec::new();
    for candidate in agenda.candidates() {
      for rule in self.unary_rules.iter() {
        if let Some(validator) = &self.validator {
          if !validator.is_valid_unary(candidate.generating_rules(), rule.name()) {
            continue;
          }
        }
        let Some(result) = rule.apply(&candidate.category, &ctx.sentence_span) else {
          continue;
        };
        let op = ParsingOp {
          category: &result.category,
          span: ctx.sentence_span,
          rule: &result.name,
        };
        if self.prune(&op, ctx.options, false) {
          continue;
        }

        let full_parse = self.is_full_parse(&ctx.sentence_span, &result.category);
        for step in candidate.steps.iter().filter(|s| !s.rule.is_overloaded()) {
          let name = step.rule.overload(&result.name);
          let mut features = ctx.model.rule_features(&name, &result.category, &ctx.sentence_span);
          if let Some(entry) = &step.lexical_entry {
            features += &ctx.model.lexical_features(entry, &ctx.sentence_span);
          }
          let score = ctx.model.score(&features);
          staged.push((
            result.category.clone(),
            step.overload(&result.name, features, score),
            full_parse,
          ));
        }
      }
    }

    tracing::trace!(span = %ctx.span, new_steps = staged.len(), "unary processing");
    for (category, step, full_parse) in staged {
      agenda.add(chart, category, step, full_parse);
    }
  }

  /// Parses `tokens`, scoring every step with `model`.
  pub fn parse(
    &self,
    tokens: &[&str],
    model: &dyn ScoringModel<M>,
    options: &ParseOptions<'_, M>,
  ) -> Result<ParseOutput<M>, ParseError> {
    let length = tokens.len();
    if let Some(max) = self.max_sentence_length {
      if length > max {
        tracing::warn!(length, max, "sentence too long, not parsing");
        return Err(ParseError::SentenceTooLong { length, max });
      }
    }

    let start = Instant::now();
    let skipping_lexicon = match (&self.word_skipping, options.sloppy) {
      (Some(generator), true) => Some(generator.generate(tokens)),
      (None, true) => {
        tracing::warn!("sloppy parse requested but the parser has no word-skipping generator");
        None
      }
      _ => None,
    };
    let mut sources = self
      .lexicons
      .iter()
      .map(|l| l.as_ref() as &dyn Lexicon<M>)
      .collect::<Vec<_>>();
    sources.extend(options.lexicon);
    if let Some(skipping) = &skipping_lexicon {
      sources.push(skipping);
    }
    let lexicon = CompositeLexicon::new(sources);

    let cap = options.max_cells_in_span.unwrap_or(self.max_cells_in_span);
    let mut chart = Chart::new(tokens.iter().map(|t| t.to_string()).collect());

    for span_length in 1..=length {
      if options.is_cancelled() {
        tracing::info!(completed = span_length - 1, "parse cancelled");
        return Err(ParseError::Cancelled {
          completed: span_length - 1,
        });
      }

      for begin in 0..=(length - span_length) {
        let span = Span::new(begin, begin + span_length);
        let ctx = SpanContext {
          span,
          sentence_span: span.in_sentence(length),
          model,
          options,
        };
        let mut agenda = Agenda::new(span);
        self.lexical_cells(&ctx, tokens, &lexicon, &chart, &mut agenda);
        for split in (begin + 1)..span.end {
          self.process_split(&ctx, split, &chart, &mut agenda);
        }
        self.unary_process(&ctx, &chart, &mut agenda);

        let staged = agenda.len();
        let admitted = chart.admit(agenda, cap, self.prune_lexical_cells);
        tracing::debug!(%span, staged, admitted = admitted.len(), "processed span");
      }
    }

    let elapsed = start.elapsed();
    tracing::debug!(
      tokens = length,
      cells = chart.num_cells(),
      millis = elapsed.as_millis() as u64,
      "parse finished"
    );
    Ok(ParseOutput::new(chart, elapsed))
  }
}

pub struct ParserBuilder<M: Semantics> {
  binary_rules: Vec<Box<dyn BinaryRule<M>>>,
  unary_rules: Vec<Box<dyn UnaryRule<M>>>,
  validator: Option<NormalFormValidator>,
  lexicons: Vec<Box<dyn Lexicon<M>>>,
  word_skipping: Option<Box<dyn SentenceLexiconGenerator<M>>>,
  complete_parse_filter: Box<CompleteParseFilter<M>>,
  max_cells_in_span: Option<usize>,
  prune_lexical_cells: bool,
  max_sentence_length: Option<usize>,
}

impl<M: Semantics> Default for ParserBuilder<M> {
  fn default() -> Self {
    Self {
      binary_rules: Vec::new(),
      unary_rules: Vec::new(),
      validator: None,
      lexicons: Vec::new(),
      word_skipping: None,
      complete_parse_filter: Box::new(|category: &Category<M>| category.semantics.is_some()),
      max_cells_in_span: Some(DEFAULT_MAX_CELLS_IN_SPAN),
      prune_lexical_cells: true,
      max_sentence_length: None,
    }
  }
}

impl<M: Semantics> ParserBuilder<M> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_binary_rule(mut self, rule: impl BinaryRule<M> + 'static) -> Self {
    self.binary_rules.push(Box::new(rule));
    self
  }

  pub fn add_unary_rule(mut self, rule: impl UnaryRule<M> + 'static) -> Self {
    self.unary_rules.push(Box::new(rule));
    self
  }

  /// Forward and backward application, plus forward and backward composition up to
  /// `max_composition_order`
  pub fn add_standard_rules<S>(mut self, services: Rc<S>, max_composition_order: usize) -> Self
  where
    S: CategoryServices<M> + 'static,
  {
    self = self
      .add_binary_rule(Application::forward(services.clone()))
      .add_binary_rule(Application::backward(services.clone()));
    for rule in Composition::up_to(max_composition_order, services) {
      self = self.add_binary_rule(rule);
    }
    self
  }

  pub fn add_lexicon(mut self, lexicon: impl Lexicon<M> + 'static) -> Self {
    self.lexicons.push(Box::new(lexicon));
    self
  }

  pub fn with_normal_form(mut self, validator: NormalFormValidator) -> Self {
    self.validator = Some(validator);
    self
  }

  pub fn with_word_skipping(mut self, generator: impl SentenceLexiconGenerator<M> + 'static) -> Self {
    self.word_skipping = Some(Box::new(generator));
    self
  }

  /// Which complete-span categories count as parses. Defaults to any with semantics.
  pub fn with_complete_parse_filter(mut self, filter: impl Fn(&Category<M>) -> bool + 'static) -> Self {
    self.complete_parse_filter = Box::new(filter);
    self
  }

  pub fn with_max_cells_in_span(mut self, cap: Option<usize>) -> Self {
    self.max_cells_in_span = cap;
    self
  }

  /// When false, cells with a lexical step are exempt from the per-span cap
  pub fn with_prune_lexical_cells(mut self, prune: bool) -> Self {
    self.prune_lexical_cells = prune;
    self
  }

  pub fn with_max_sentence_length(mut self, max: usize) -> Self {
    self.max_sentence_length = Some(max);
    self
  }

  pub fn build(self) -> Parser<M> {
    let parser = Parser {
      binary_rules: self.binary_rules,
      unary_rules: self.unary_rules,
      validator: self.validator,
      lexicons: self.lexicons,
      word_skipping: self.word_skipping,
      complete_parse_filter: self.complete_parse_filter,
      max_cells_in_span: self.max_cells_in_span,
      prune_lexical_cells: self.prune_lexical_cells,
      max_sentence_length: self.max_sentence_length,
    };
    tracing::info!(parser = ?parser, "built parser");
    parser
  }
}
