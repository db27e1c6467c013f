use std::env;
use std::io;
use std::io::Write;
use std::process;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;

use ccgforest::cky::{ParseOptions, Parser};
use ccgforest::forest::{Derivation, ParseOutput};
use ccgforest::lambda::{LambdaServices, Term};
use ccgforest::lexicon::{MemoryLexicon, WordSkipping, FIXED_ORIGIN};
use ccgforest::model::LinearModel;
use ccgforest::normal_form::NormalFormValidator;
use ccgforest::rules::{Direction, Skipping, TypeRaisedComposition, TypeRaising};
use ccgforest::syntax::Syntax;
use ccgforest::Err;

const TREES_PER_DERIVATION: usize = 3;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} LEXICON [options]

Reads sentences from stdin, one per line, and prints their derivations.
Set RUST_LOG (e.g. RUST_LOG=ccgforest=debug) for parser logging.

Options:
  -h, --help      Print this message
  -c, --chart     Print the parse chart (defaults to not printing)
  -a, --all       Print every derivation, not just the best ones
  -s, --skip      Allow skipping words the lexicon doesn't cover
  -b, --beam N    Keep at most N cells per span (defaults to 50, 0 for no limit)",
    prog_name
  )
}

fn print_derivation(derivation: &Derivation<'_, Term>) {
  println!("{}", derivation);
  println!(
    "  {} parse{}, features {}",
    derivation.num_parses(),
    if derivation.num_parses() == 1 { "" } else { "s" },
    derivation.features()
  );
  for tree in derivation.trees(TREES_PER_DERIVATION) {
    println!("{}", tree);
  }
  println!();
}

fn report(output: &ParseOutput<Term>, opts: &Args) {
  if opts.print_chart {
    println!("chart:\n{}", output);
  }

  let derivations = if opts.print_all {
    output.all_derivations()
  } else {
    output.best_derivations()
  };

  println!(
    "Parsed {} derivation{} in {}ms{}",
    derivations.len(),
    if derivations.len() == 1 { "" } else { "s" },
    output.inference_time_millis(),
    if output.is_exact() { "" } else { " (approximate)" }
  );
  for derivation in derivations.iter() {
    print_derivation(derivation);
  }
}

fn build_parser(lexicon: MemoryLexicon<Term>, opts: &Args) -> Parser<Term> {
  let services = Rc::new(LambdaServices::default());
  let raise = |direction| {
    TypeRaising::new(
      direction,
      vec![Syntax::atom("NP")],
      Syntax::atom("S"),
      services.clone(),
    )
  };
  Parser::builder()
    .add_lexicon(lexicon)
    .add_standard_rules(services.clone(), 2)
    .add_binary_rule(TypeRaisedComposition::forward(services.clone()))
    .add_binary_rule(TypeRaisedComposition::backward(services.clone()))
    .add_binary_rule(Skipping::forward())
    .add_binary_rule(Skipping::backward())
    .add_unary_rule(raise(Direction::Forward))
    .add_unary_rule(raise(Direction::Backward))
    .with_normal_form(NormalFormValidator::hockenmaier_bisk(true))
    .with_word_skipping(WordSkipping)
    .with_complete_parse_filter(|category| category.syntax == Syntax::atom("S"))
    .with_max_cells_in_span(opts.beam)
    .build()
}

struct Args {
  filename: String,
  print_chart: bool,
  print_all: bool,
  sloppy: bool,
  beam: Option<usize>,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    let mut iter = v.into_iter();
    let Some(prog_name) = iter.next() else {
      return Err(Self::make_error_message("bad argument vector", "ccgforest"));
    };

    let mut filename: Option<String> = None;
    let mut print_chart = false;
    let mut print_all = false;
    let mut sloppy = false;
    let mut beam = Some(ccgforest::cky::DEFAULT_MAX_CELLS_IN_SPAN);

    while let Some(o) = iter.next() {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-c" || o == "--chart" {
        print_chart = true;
      } else if o == "-a" || o == "--all" {
        print_all = true;
      } else if o == "-s" || o == "--skip" {
        sloppy = true;
      } else if o == "-b" || o == "--beam" {
        let n = iter
          .next()
          .and_then(|n| n.parse::<usize>().ok())
          .ok_or_else(|| Self::make_error_message("--beam needs a number", &prog_name))?;
        beam = if n == 0 { None } else { Some(n) };
      } else if filename.is_none() {
        filename = Some(o);
      } else {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      }
    }

    if let Some(filename) = filename {
      Ok(Self {
        filename,
        print_chart,
        print_all,
        sloppy,
        beam,
      })
    } else {
      Err(Self::make_error_message("missing lexicon file", prog_name))
    }
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let lexicon =
    MemoryLexicon::read_from_file(&opts.filename, &LambdaServices::default(), FIXED_ORIGIN)?;
  tracing::info!(lexicon = %opts.filename, entries = lexicon.len(), "loaded lexicon");
  let parser = build_parser(lexicon, &opts);
  let model = LinearModel::new();
  let options = ParseOptions::default().sloppy(opts.sloppy);

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        input.make_ascii_lowercase();
        let sentence = input.split_whitespace().collect::<Vec<_>>();
        match parser.parse(&sentence, &model, &options) {
          Ok(output) => report(&output, &opts),
          Err(e) => eprintln!("{}", e),
        }
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
