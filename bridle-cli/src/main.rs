//! `bridle`: certify guided-decoding grammars and pre-warm the on-disk
//! automaton cache.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use bridle_cli::tokenizer::HfTokenizerSource;
use bridle_core::{GrammarSpec, TokenAutomaton};
use bridle_runtime::{CacheConfig, DiskCacheConfig, GrammarCompiler};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bridle", about = "Grammar-guided decoding toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve and certify a grammar, then print its regex
    Check {
        #[command(flatten)]
        grammar: GrammarArgs,
    },
    /// Compile a grammar against a tokenizer vocabulary
    Compile {
        /// Path to a HuggingFace tokenizer.json
        #[arg(long)]
        tokenizer: PathBuf,

        /// Persist the compiled automaton in this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        #[command(flatten)]
        grammar: GrammarArgs,
    },
}

#[derive(Args)]
struct GrammarArgs {
    /// Regular expression the output must match
    #[arg(long, conflicts_with_all = ["json_schema", "choice"])]
    regex: Option<String>,

    /// Path to a JSON schema file
    #[arg(long, conflicts_with = "choice")]
    json_schema: Option<PathBuf>,

    /// Allowed literal output; repeat for each choice
    #[arg(long)]
    choice: Vec<String>,

    /// Whitespace regex between JSON tokens
    #[arg(long, requires = "json_schema")]
    whitespace: Option<String>,
}

impl GrammarArgs {
    fn to_spec(&self) -> anyhow::Result<GrammarSpec> {
        if let Some(pattern) = &self.regex {
            return Ok(GrammarSpec::Regex(pattern.clone()));
        }
        if let Some(path) = &self.json_schema {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let schema = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            return Ok(GrammarSpec::JsonSchema {
                schema,
                whitespace: self.whitespace.clone(),
            });
        }
        if !self.choice.is_empty() {
            return Ok(GrammarSpec::Choice(self.choice.clone()));
        }
        bail!("one of --regex, --json-schema or --choice is required")
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { grammar } => {
            let compiler = GrammarCompiler::new(&CacheConfig::default())?;
            let pattern = compiler.validate(&grammar.to_spec()?)?;
            println!("{pattern}");
        }
        Command::Compile {
            tokenizer,
            cache_dir,
            grammar,
        } => {
            let spec = grammar.to_spec()?;
            let config = CacheConfig {
                max_entries: None,
                disk: cache_dir
                    .map(|dir| DiskCacheConfig { dir })
                    .or_else(DiskCacheConfig::from_env),
            };
            let compiler = GrammarCompiler::new(&config)?;

            let start = Instant::now();
            let source = HfTokenizerSource::from_file(&tokenizer)?;
            let vocabulary = compiler.vocabulary_for(&source)?;
            info!(
                "Vocabulary: {} canonical strings, {} excluded ids, EOS {} ({:.1?})",
                vocabulary.len(),
                vocabulary.empty_token_ids().len(),
                vocabulary.eos_token_id(),
                start.elapsed()
            );

            let start = Instant::now();
            let automaton = compiler.compile(&spec, &vocabulary)?;
            let elapsed = start.elapsed();

            println!("vocab size: {}", source.vocab_size());
            println!("states: {}", automaton.num_states());
            println!(
                "allowed at start: {}",
                automaton.allowed_tokens(automaton.initial_state()).len()
            );
            println!("compile time: {elapsed:.1?}");
            if let Some(disk) = compiler.disk() {
                println!("cache dir: {}", disk.dir().display());
            }
        }
    }
    Ok(())
}
