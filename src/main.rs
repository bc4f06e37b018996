use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gbnf_gate::config::Config;
use gbnf_gate::{ArrayVocabulary, GrammarSession, TokenData, JSON_GRAMMAR, LIST_GRAMMAR};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "gbnf-gate", version, about = "Compile GBNF grammars and mask LLM vocabularies with them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a grammar and report its shape
    Check {
        /// Path to a .gbnf grammar file
        grammar: Option<PathBuf>,

        /// Use a built-in grammar ("json" or "list") instead of a file
        #[arg(long)]
        builtin: Option<String>,

        /// Root rule name
        #[arg(long)]
        root: Option<String>,
    },
    /// Pretty-print the compiled rule table, synthetic rules expanded
    Print {
        grammar: Option<PathBuf>,

        #[arg(long)]
        builtin: Option<String>,

        #[arg(long)]
        root: Option<String>,
    },
    /// Feed a string through the grammar and report progress
    Accept {
        grammar: Option<PathBuf>,

        #[arg(long)]
        builtin: Option<String>,

        #[arg(long)]
        root: Option<String>,

        /// Input text to accept
        #[arg(long)]
        input: String,
    },
    /// Apply the grammar mask to a vocabulary and list admissible tokens
    Mask {
        grammar: Option<PathBuf>,

        #[arg(long)]
        builtin: Option<String>,

        #[arg(long)]
        root: Option<String>,

        /// JSON file holding the vocabulary as an array of token strings
        #[arg(long)]
        vocab: Option<PathBuf>,

        /// Token id treated as end-of-generation (defaults to a synthetic
        /// token appended after the vocabulary)
        #[arg(long)]
        eog: Option<u32>,

        /// Text already generated; the mask is computed after accepting it
        #[arg(long, default_value = "")]
        input: String,

        /// Maximum number of admissible tokens to list
        #[arg(long, default_value_t = 32)]
        limit: usize,
    },
}

fn load_grammar(
    config: &Config,
    grammar: Option<PathBuf>,
    builtin: Option<String>,
) -> Result<String> {
    if let Some(name) = builtin {
        return match name.as_str() {
            "json" => Ok(JSON_GRAMMAR.to_string()),
            "list" => Ok(LIST_GRAMMAR.to_string()),
            other => bail!("unknown built-in grammar: {}", other),
        };
    }
    let path = grammar
        .or_else(|| config.grammar.path.clone())
        .context("no grammar given; pass a path, --builtin, or set grammar.path in gbnf-gate.toml")?;
    fs::read_to_string(&path).with_context(|| format!("failed to read grammar: {}", path.display()))
}

fn load_vocab(config: &Config, path: Option<PathBuf>, eog: Option<u32>) -> Result<ArrayVocabulary> {
    let path = path
        .or_else(|| config.vocab.path.clone())
        .context("no vocabulary given; pass --vocab or set vocab.path in gbnf-gate.toml")?;
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read vocabulary: {}", path.display()))?;
    let tokens: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("vocabulary is not a JSON string array: {}", path.display()))?;

    let mut pieces: Vec<Vec<u8>> = tokens.into_iter().map(String::into_bytes).collect();
    let eog = match eog.or(config.vocab.eog) {
        Some(id) => id,
        None => {
            // synthesize an end-of-generation token after the real entries
            pieces.push(Vec::new());
            (pieces.len() - 1) as u32
        }
    };
    info!("loaded vocabulary: {} tokens, eog id {}", pieces.len(), eog);
    Ok(ArrayVocabulary::new(pieces, eog))
}

fn empty_vocab() -> Arc<ArrayVocabulary> {
    Arc::new(ArrayVocabulary::new(Vec::new(), 0))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Check { grammar, builtin, root } => {
            let text = load_grammar(&config, grammar, builtin)?;
            let root = root.unwrap_or_else(|| config.grammar.root.clone());
            let session = GrammarSession::new(empty_vocab(), &text, &root)?;
            println!("grammar ok");
            println!("  rules:            {}", session.rules().rules().len());
            println!("  root:             {}", session.rules().name(session.rules().root()));
            println!("  initial frontier: {} stacks", session.stacks().len());
            println!("  can finish now:   {}", session.can_finish());
        }

        Commands::Print { grammar, builtin, root } => {
            let text = load_grammar(&config, grammar, builtin)?;
            let root = root.unwrap_or_else(|| config.grammar.root.clone());
            let session = GrammarSession::new(empty_vocab(), &text, &root)?;
            let mut out = String::new();
            session.print(&mut out)?;
            print!("{}", out);
        }

        Commands::Accept { grammar, builtin, root, input } => {
            let text = load_grammar(&config, grammar, builtin)?;
            let root = root.unwrap_or_else(|| config.grammar.root.clone());
            let mut session = GrammarSession::new(empty_vocab(), &text, &root)?;
            match session.accept_str(input.as_bytes()) {
                Ok(()) => {
                    println!("accepted {} bytes", input.len());
                    println!("  frontier:   {} stacks", session.stacks().len());
                    println!("  can finish: {}", session.can_finish());
                }
                Err(err) => {
                    println!("rejected: {}", err);
                    std::process::exit(1);
                }
            }
        }

        Commands::Mask { grammar, builtin, root, vocab, eog, input, limit } => {
            let text = load_grammar(&config, grammar, builtin)?;
            let root = root.unwrap_or_else(|| config.grammar.root.clone());
            let vocab = Arc::new(load_vocab(&config, vocab, eog)?);
            let mut session = GrammarSession::new(vocab.clone(), &text, &root)?;
            if !input.is_empty() {
                session.accept_str(input.as_bytes())?;
            }

            use gbnf_gate::Vocabulary;
            let mut cur = TokenData::zeroed(vocab.n_tokens());
            session.apply(&mut cur);

            let admissible: Vec<&TokenData> =
                cur.iter().filter(|t| t.logit.is_finite()).collect();
            println!("{} of {} tokens admissible", admissible.len(), cur.len());
            for token in admissible.iter().take(limit) {
                let piece = String::from_utf8_lossy(vocab.piece(token.id));
                let label = if vocab.is_eog(token.id) { " (eog)" } else { "" };
                println!("  {:>6}  {:?}{}", token.id, piece, label);
            }
            if admissible.len() > limit {
                println!("  ... ({} more)", admissible.len() - limit);
            }
        }
    }

    Ok(())
}
