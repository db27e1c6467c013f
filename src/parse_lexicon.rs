/// Simple recursive-descent parsing of syntactic categories and lexicon files
use std::fs;
use std::rc::Rc;

use regex::Regex;
use thiserror::Error;

use crate::category::{CategoryServices, Semantics};
use crate::lexicon::{LexicalEntry, MemoryLexicon};
use crate::syntax::{Slash, Syntax};
use crate::Err;

/// Separates the tokens of an entry from its category
pub const ENTRY_SEPARATOR: &str = ":-";

#[derive(Debug, Error)]
pub enum LexiconError {
  #[error("{source_name}:{line}: {message}")]
  Syntax {
    source_name: String,
    line: usize,
    message: String,
  },
  #[error("couldn't read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

pub(crate) type Infallible<'a, T> = (T, &'a str);
pub(crate) type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}
pub(crate) use regex_static;

/// Try to consume a regex at the start of `s`, returning None if it doesn't match there
pub(crate) fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => {
      let (_, rest) = s.split_at(m.end());
      (Some(m.as_str()), rest)
    }
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
pub(crate) fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at '{}'", re, s).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
pub(crate) fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
pub(crate) fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("expected '{}' at '{}'", c, s).into())
  }
}

/// Skips any leading whitespace
pub(crate) fn skip_whitespace(s: &str) -> &str {
  s.trim_start()
}

fn parse_slash(s: &str) -> Infallible<'_, Option<Slash>> {
  match s.chars().next() {
    Some('/') => (Some(Slash::Forward), &s[1..]),
    Some('\\') => (Some(Slash::Backward), &s[1..]),
    Some('|') => (Some(Slash::Vertical), &s[1..]),
    _ => (None, s),
  }
}

/// Parses an atom like `NP` or `S[dcl]`, or a parenthesized category
fn parse_syntax_primary(s: &str) -> ParseResult<'_, Syntax> {
  regex_static!(LABEL, r"[A-Za-z][A-Za-z0-9_]*");
  regex_static!(ATTRIBUTE, r"\[[a-zA-Z0-9_\-]+\]");

  if let (Some(_), s) = optional_char('(', s) {
    let (inner, s) = parse_syntax(skip_whitespace(s))?;
    let (_, s) = needed_char(')', skip_whitespace(s))?;
    return Ok((inner, s));
  }

  let (label, s) = needed_re(&LABEL, s).map_err(|e| format!("syntax label: {}", e))?;
  let (attribute, s) = optional_re(&ATTRIBUTE, s);
  let syntax = match attribute {
    Some(a) => Syntax::atom_with(label, &a[1..a.len() - 1]),
    None => Syntax::atom(label),
  };
  Ok((syntax, s))
}

/// Parses a category; slashes associate to the left, so `S\NP/NP` is `(S\NP)/NP`
fn parse_syntax(s: &str) -> ParseResult<'_, Syntax> {
  let (mut syntax, mut s) = parse_syntax_primary(s)?;
  loop {
    let (slash, rest) = parse_slash(skip_whitespace(s));
    let Some(slash) = slash else {
      return Ok((syntax, s));
    };
    let (argument, rest) = parse_syntax_primary(skip_whitespace(rest))?;
    syntax = Syntax::complex(syntax, slash, argument);
    s = rest;
  }
}

pub(crate) fn parse_syntax_str(s: &str) -> Result<Syntax, Err> {
  let (syntax, rest) = parse_syntax(skip_whitespace(s))?;
  if !skip_whitespace(rest).is_empty() {
    return Err(format!("trailing input after category: '{}'", rest).into());
  }
  Ok(syntax)
}

/// Parses one `tokens :- Syntax : semantics` line (comments already stripped)
fn parse_entry<M: Semantics>(
  line: &str,
  services: &impl CategoryServices<M>,
  origin: &str,
) -> Result<LexicalEntry<M>, Err> {
  let (tokens, category) = line
    .split_once(ENTRY_SEPARATOR)
    .ok_or_else(|| format!("missing '{}'", ENTRY_SEPARATOR))?;

  let tokens = tokens
    .split_whitespace()
    .map(|t| t.to_string())
    .collect::<Vec<_>>();
  if tokens.is_empty() {
    return Err("entry has no tokens".into());
  }

  let category = services.read_category(category)?;
  Ok(LexicalEntry::new(tokens, category, origin))
}

impl<M: Semantics> MemoryLexicon<M> {
  /// Reads a lexicon, one entry per line. `//` starts a comment.
  ///
  /// ```text
  /// the dog :- NP : dog:e
  /// barks   :- S\NP : (lambda $0:e (bark:<e,t> $0))
  /// ```
  pub fn read(
    source_name: &str,
    text: &str,
    services: &impl CategoryServices<M>,
    origin: &str,
  ) -> Result<Self, LexiconError> {
    let mut lexicon = Self::new();
    for (idx, line) in text.lines().enumerate() {
      let line = match line.find("//") {
        Some(comment) => &line[..comment],
        None => line,
      };
      if line.trim().is_empty() {
        continue;
      }

      let entry = parse_entry(line, services, origin).map_err(|e| LexiconError::Syntax {
        source_name: source_name.to_string(),
        line: idx + 1,
        message: e.to_string(),
      })?;
      lexicon.add(Rc::new(entry));
    }
    tracing::debug!(source_name, entries = lexicon.len(), "read lexicon");
    Ok(lexicon)
  }

  pub fn read_from_file(
    path: &str,
    services: &impl CategoryServices<M>,
    origin: &str,
  ) -> Result<Self, LexiconError> {
    let text = fs::read_to_string(path).map_err(|source| LexiconError::Io {
      path: path.to_string(),
      source,
    })?;
    Self::read(path, &text, services, origin)
  }
}
