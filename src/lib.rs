//! A trainable CCG chart parser.
//!
//! Lexicons pair token sequences with categories (`Syntax : semantics`); a CKY sweep
//! combines them with application, composition, type-raising and skipping rules,
//! scoring every step with a [`model::ScoringModel`]. The filled chart packs all
//! derivations, from which [`forest::ParseOutput`] reads the best ones and computes
//! exact expected features by inside/outside.
//!
//! ```
//! use std::rc::Rc;
//! use ccgforest::cky::{ParseOptions, Parser};
//! use ccgforest::lambda::LambdaServices;
//! use ccgforest::lexicon::{MemoryLexicon, FIXED_ORIGIN};
//! use ccgforest::model::LinearModel;
//!
//! let services = Rc::new(LambdaServices::default());
//! let lexicon = MemoryLexicon::read(
//!   "doc.lex",
//!   "the dog :- NP : dog:e\nbarks :- S\\NP : (lambda $0:e (bark:<e,t> $0))",
//!   services.as_ref(),
//!   FIXED_ORIGIN,
//! )
//! .unwrap();
//! let parser = Parser::builder()
//!   .add_standard_rules(services, 1)
//!   .add_lexicon(lexicon)
//!   .build();
//!
//! let output = parser
//!   .parse(&["the", "dog", "barks"], &LinearModel::new(), &ParseOptions::default())
//!   .unwrap();
//! let best = output.best_derivations();
//! assert_eq!(best.len(), 1);
//! assert_eq!(best[0].category().to_string(), "S : (bark:<e,t> dog:e)");
//! ```

#[macro_use]
extern crate lazy_static;

pub mod category;
pub mod chart;
pub mod cky;
pub mod forest;
pub mod lambda;
pub mod lexicon;
pub mod model;
pub mod normal_form;
pub mod parse_lexicon;
pub mod rules;
pub mod syntax;
pub mod syntree;
pub mod utils;

pub use crate::utils::Err;
