use std::path::PathBuf;

use anyhow::Context as _;
use cellar::{
    general_parse,
    lexer::{LexerError, Span, Token},
    value::Value,
    Config, World, WorldError,
};
use clap::Parser;
use codesnake::{Block, CodeWidth, Label, LineIndex};
use rustyline::error::ReadlineError;
use yansi::Paint;

#[derive(Parser, Debug)]
#[command(version, about = "Evaluate Scheme against a store that lives as long as the session")]
struct Args {
    /// Script to run before the prompt opens
    script: Option<PathBuf>,
    /// Evaluation steps each input may take
    #[arg(long)]
    fuel: Option<i32>,
    /// How deeply evaluation may nest, unbounded by default
    #[arg(long)]
    max_depth: Option<usize>,
    /// Fold the case of identifiers, as if every input started with `#!fold-case`
    #[arg(long)]
    fold_case: bool,
    /// Show the tokens of each input instead of evaluating it
    #[arg(long)]
    tokens: bool,
    /// Keep the prompt open after running the script
    #[arg(long, short)]
    interactive: bool,
}

/// Installs a subscriber only when `RUST_LOG` is set.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn make_block<'a>(
    idx: &'a LineIndex,
    labels: impl IntoIterator<Item = (Span, String)>,
) -> Option<Block<&'a str, String>> {
    Block::new(
        idx,
        labels
            .into_iter()
            .map(|(range, text)| Label::new(range).with_text(text.red().to_string())),
    )
}

fn make_token_block<'a>(
    idx: &'a LineIndex,
    labels: impl IntoIterator<Item = (Span, Result<Token, LexerError>)>,
) -> Option<Block<&'a str, String>> {
    Block::new(
        idx,
        labels.into_iter().map(|(range, tok)| {
            let text = format!("{tok:?}");
            Label::new(range)
                .with_text(if tok.is_ok() {
                    text.green().to_string()
                } else {
                    text.red().to_string()
                })
                .with_style(move |s| match tok {
                    Ok(Token::Identifier(_)) => s.blue().to_string(),
                    Ok(Token::Character(_)) => s.yellow().to_string(),
                    Ok(Token::String(_)) => s.cyan().to_string(),
                    Ok(_) => s,
                    Err(_) => s.red().to_string(),
                })
        }),
    )
}

fn print_block(name: &str, block: Block<&str, String>) {
    let block = block.map_code(|c| CodeWidth::new(c, c.len()));
    eprintln!("{}[{name}]", block.prologue());
    eprint!("{block}");
    eprintln!("{}", block.epilogue());
}

/// Labels must be non-empty, sorted and disjoint for codesnake.
fn normalize_labels(source: &str, mut labels: Vec<(Span, String)>) -> Vec<(Span, String)> {
    labels.sort_by_key(|(span, _)| span.start);
    let mut last_end = 0;
    labels
        .into_iter()
        .filter_map(|(span, text)| {
            let span = if span.is_empty() {
                // point at the last character before an empty span (usually the end of input)
                let previous = source[..span.start].chars().next_back()?;
                span.start - previous.len_utf8()..span.start
            } else {
                span
            };
            (span.start >= last_end).then(|| {
                last_end = span.end;
                (span, text)
            })
        })
        .collect()
}

fn report_spanned(name: &str, source: &str, labels: Vec<(Span, String)>) {
    let idx = LineIndex::new(source);
    let labels = normalize_labels(source, labels);
    let fallback: Vec<_> = labels.iter().map(|(_, text)| text.clone()).collect();
    match make_block(&idx, labels) {
        Some(block) => print_block(name, block),
        None => {
            for text in fallback {
                eprintln!("{}: {text}", "error".red());
            }
        }
    }
}

fn show_tokens(name: &str, source: &str) {
    let idx = LineIndex::new(source);
    let mut blocks = vec![];
    let mut line_labels = vec![];
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(Token::LineEnding) => blocks.push(make_token_block(&idx, line_labels.drain(..))),
            tok => line_labels.push((span, tok)),
        }
    }
    if !line_labels.is_empty() {
        blocks.push(make_token_block(&idx, line_labels.drain(..)));
    }

    for block in blocks.into_iter().flatten() {
        print_block(name, block);
    }
}

fn run_source(world: &mut World, name: &str, source: &str) {
    match world.eval_source(source) {
        Ok(Value::Void) => {}
        Ok(value) => println!("{}", world.display(&value)),
        Err(WorldError::Parse(errors)) => report_spanned(
            name,
            source,
            errors
                .into_iter()
                .map(|err| (err.span, err.kind.to_string()))
                .collect(),
        ),
        Err(WorldError::Lower(err)) => {
            report_spanned(name, source, vec![(err.span, err.kind.to_string())])
        }
        Err(WorldError::Eval(err)) => eprintln!("{}: {err}", "error".red()),
    }
}

/// Whether `source` only fails to parse because it stops too early
fn is_incomplete(source: &str) -> bool {
    let gast = general_parse(source);
    !gast.errors().is_empty() && gast.errors().iter().all(|err| err.is_incomplete())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut world = World::new(Config {
        fuel: args.fuel,
        max_depth: args.max_depth,
        fold_case: args.fold_case,
    });

    if let Some(script) = &args.script {
        let source = std::fs::read_to_string(script)
            .with_context(|| format!("could not read {}", script.display()))?;
        let name = script.display().to_string();
        tracing::debug!(script = %name, bytes = source.len(), "running script");
        if args.tokens {
            show_tokens(&name, &source);
        } else {
            run_source(&mut world, &name, &source);
        }
        if !args.interactive {
            return Ok(());
        }
    }

    let mut readline = rustyline::DefaultEditor::new()?;
    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { ">> " } else { ".. " };
        match readline.readline(prompt) {
            Ok(line) => {
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }

        if buffer.trim().is_empty() {
            buffer.clear();
            continue;
        }
        if !args.tokens && is_incomplete(&buffer) {
            continue;
        }

        readline.add_history_entry(buffer.as_str())?;
        if args.tokens {
            show_tokens("repl", &buffer);
        } else {
            run_source(&mut world, "repl", &buffer);
        }
        buffer.clear();
    }

    Ok(())
}
