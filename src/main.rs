use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::filter::LevelFilter;

use tse::{ConfigOverrides, Document, Engine};

/// Template synchronization runner: evaluate expressions and render markup.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Evaluation context as a JSON object
    #[arg(long, global = true)]
    context: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a single expression and print its JSON value
    Eval { expression: String },
    /// Substitute placeholders in a plain string
    Text { text: String },
    /// Render markup through a full engine and print the resulting body
    Render {
        /// Markup to render (ignored when --file is given)
        markup: Option<String>,
        /// Read markup from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Configuration overrides as JSON, e.g. '{"attributePrefix":"data-bind-"}'
        #[arg(long)]
        config: Option<String>,
    },
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // Parse the context object.
    let context: Map<String, Value> = match args.context.as_deref() {
        Some(json) => match serde_json::from_str(json) {
            Ok(map) => map,
            Err(e) => fail(format!("Invalid context JSON: {e}")),
        },
        None => Map::new(),
    };

    match args.command {
        Command::Eval { expression } => match tse::eval(&expression, &context) {
            Ok(Some(value)) => match serde_json::to_string_pretty(&value) {
                Ok(out) => println!("{out}"),
                Err(e) => fail(e),
            },
            Ok(None) => println!("undefined"),
            Err(e) => fail(format!("[Error: {e}]")),
        },
        Command::Text { text } => println!("{}", tse::render(&text, &context)),
        Command::Render {
            markup,
            file,
            config,
        } => {
            let markup = match (file, markup) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .unwrap_or_else(|e| fail(format!("Cannot read {}: {e}", path.display()))),
                (None, Some(markup)) => markup,
                (None, None) => fail("render needs markup or --file"),
            };
            let overrides = match config.as_deref() {
                Some(json) => ConfigOverrides::from_json(json).unwrap_or_else(|e| fail(e)),
                None => ConfigOverrides::default(),
            };
            let mut engine = Engine::new(Document::parse(&markup)).unwrap_or_else(|e| fail(e));
            engine.add_to_context(context);
            if let Err(e) = engine.initialize(overrides) {
                fail(e);
            }
            engine.run_until_idle();
            let document = engine.into_document();
            match document.body() {
                Some(body) => println!("{}", document.inner_html(body)),
                None => fail("document has no body"),
            }
        }
    }
}
