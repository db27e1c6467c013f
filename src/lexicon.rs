use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::category::{Category, Semantics};

/// Origin of entries read from a fixed, hand-written lexicon
pub const FIXED_ORIGIN: &str = "fixed";
/// Origin of the entries that let the parser skip a word
pub const SKIPPING_ORIGIN: &str = "skipping";

/// A pairing of a token sequence with a category
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LexicalEntry<M> {
  pub tokens: Vec<String>,
  pub category: Category<M>,
  pub origin: String,
}

impl<M> LexicalEntry<M> {
  pub fn new(tokens: Vec<String>, category: Category<M>, origin: &str) -> Self {
    Self {
      tokens,
      category,
      origin: origin.to_string(),
    }
  }
}

impl<M> fmt::Display for LexicalEntry<M>
where
  M: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} :- {}", self.tokens.join(" "), self.category)
  }
}

/// Source of lexical entries for a token span
pub trait Lexicon<M> {
  fn entries_for(&self, tokens: &[&str]) -> Vec<Rc<LexicalEntry<M>>>;
}

#[derive(Debug, Clone)]
pub struct MemoryLexicon<M> {
  entries: HashMap<Vec<String>, Vec<Rc<LexicalEntry<M>>>>,
  len: usize,
}

impl<M> Default for MemoryLexicon<M> {
  fn default() -> Self {
    Self {
      entries: HashMap::new(),
      len: 0,
    }
  }
}

impl<M: Semantics> MemoryLexicon<M> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds an entry, returning false if it was already present
  pub fn add(&mut self, entry: Rc<LexicalEntry<M>>) -> bool {
    let bucket = self.entries.entry(entry.tokens.clone()).or_default();
    if bucket.iter().any(|e| **e == *entry) {
      return false;
    }
    bucket.push(entry);
    self.len += 1;
    true
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn iter(&self) -> impl Iterator<Item = &Rc<LexicalEntry<M>>> {
    self.entries.values().flatten()
  }
}

impl<M: Semantics> Lexicon<M> for MemoryLexicon<M> {
  fn entries_for(&self, tokens: &[&str]) -> Vec<Rc<LexicalEntry<M>>> {
    let key = tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>();
    self.entries.get(&key).cloned().unwrap_or_default()
  }
}

/// A view over several lexicons. Identical entries from different sources collapse.
pub struct CompositeLexicon<'a, M> {
  lexicons: Vec<&'a dyn Lexicon<M>>,
}

impl<'a, M: Semantics> CompositeLexicon<'a, M> {
  pub fn new(lexicons: Vec<&'a dyn Lexicon<M>>) -> Self {
    Self { lexicons }
  }
}

impl<M: Semantics> Lexicon<M> for CompositeLexicon<'_, M> {
  fn entries_for(&self, tokens: &[&str]) -> Vec<Rc<LexicalEntry<M>>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for lexicon in self.lexicons.iter() {
      for entry in lexicon.entries_for(tokens) {
        if seen.insert(entry.clone()) {
          out.push(entry);
        }
      }
    }
    out
  }
}

/// Builds a lexicon specific to one sentence
pub trait SentenceLexiconGenerator<M> {
  fn generate(&self, tokens: &[&str]) -> MemoryLexicon<M>;
}

/// Gives every single token an `EMPTY` entry with no meaning, so skipping rules can
/// step over words the grammar doesn't cover.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordSkipping;

impl<M: Semantics> SentenceLexiconGenerator<M> for WordSkipping {
  fn generate(&self, tokens: &[&str]) -> MemoryLexicon<M> {
    let mut lexicon = MemoryLexicon::new();
    for token in tokens {
      lexicon.add(Rc::new(LexicalEntry::new(
        vec![token.to_string()],
        Category::empty(),
        SKIPPING_ORIGIN,
      )));
    }
    lexicon
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::syntax::Syntax;

  fn entry(tokens: &str, syntax: &str, sem: &str) -> Rc<LexicalEntry<String>> {
    Rc::new(LexicalEntry::new(
      tokens.split(' ').map(|t| t.to_string()).collect(),
      Category::new(syntax.parse::<Syntax>().unwrap(), sem.to_string()),
      FIXED_ORIGIN,
    ))
  }

  #[test]
  fn test_memory_lexicon_dedups() {
    let mut lexicon = MemoryLexicon::new();
    assert!(lexicon.add(entry("dog", "N", "dog")));
    assert!(!lexicon.add(entry("dog", "N", "dog")));
    assert!(lexicon.add(entry("dog", "NP", "dog")));
    assert_eq!(lexicon.len(), 2);
    assert_eq!(lexicon.entries_for(&["dog"]).len(), 2);
  }

  #[test]
  fn test_composite_collapses_duplicates() {
    let mut a = MemoryLexicon::new();
    a.add(entry("dog", "N", "dog"));
    let mut b = MemoryLexicon::new();
    b.add(entry("dog", "N", "dog"));
    b.add(entry("dog", "NP", "dog"));

    let composite = CompositeLexicon::new(vec![&a as &dyn Lexicon<String>, &b]);
    assert_eq!(composite.entries_for(&["dog"]).len(), 2);
    assert!(composite.entries_for(&["cat"]).is_empty());
  }

  #[test]
  fn test_word_skipping() {
    let lexicon: MemoryLexicon<String> = WordSkipping.generate(&["a", "b", "a"]);
    assert_eq!(lexicon.len(), 2);
    let entries = lexicon.entries_for(&["a"]);
    assert!(entries[0].category.is_empty_category());
    assert!(entries[0].category.semantics.is_none());
    assert_eq!(entries[0].origin, SKIPPING_ORIGIN);
  }
}
