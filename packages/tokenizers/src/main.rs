//! Tokenizer CLI
//!
//! Lists the known vocabularies, encodes or counts text with a chosen model,
//! and refreshes cached vocabulary files.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fluent_ai_tokenizers::{
    fetch, CacheStatus, TokenizerConfig, TokenizerRegistry, VocabularyFormat,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "tokenize")]
#[command(about = "Encode and count tokens with cached, verified BPE vocabularies")]
#[command(version)]
struct Cli {
    /// JSON config file; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vocabulary cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output format: plain or json
    #[arg(long, default_value = "plain")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Show registered models and the state of their cached vocabulary
    List,
    /// Print the token ids for TEXT
    Encode {
        /// Model id; defaults to the configured default model
        #[arg(short, long)]
        model: Option<String>,
        text: String,
    },
    /// Print the number of tokens in TEXT
    Count {
        #[arg(short, long)]
        model: Option<String>,
        text: String,
    },
    /// Re-download a model's vocabulary, replacing the cached copy once it verifies
    Refresh {
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Plain,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {}. Valid options: plain, json", s)),
        }
    }
}

fn load_config(cli: &Cli) -> Result<TokenizerConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => TokenizerConfig::from_json_file(path)?,
        None => TokenizerConfig::default(),
    }
    .with_env_overrides()?;

    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let registry = TokenizerRegistry::new(&config)?;

    match cli.command.clone() {
        Commands::List => list_models(&registry, cli.format).await,
        Commands::Encode { model, text } => encode_text(&registry, model, &text, cli.format).await,
        Commands::Count { model, text } => count_text(&registry, model, &text, cli.format).await,
        Commands::Refresh { model } => refresh_model(&registry, model).await,
    }
}

async fn list_models(registry: &TokenizerRegistry, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut rows = Vec::with_capacity(registry.descriptors().len());
    for descriptor in registry.descriptors().iter() {
        let vocabulary = match descriptor.format() {
            VocabularyFormat::Tiktoken { encoding } => encoding.name(),
            VocabularyFormat::HuggingFace => "huggingface",
        };
        let cached = match registry.fetcher().cache_status(descriptor).await? {
            CacheStatus::Valid => "cached",
            CacheStatus::Missing => "not cached",
            CacheStatus::Stale { .. } => "stale",
        };
        rows.push((descriptor.model_id(), vocabulary, descriptor.special_tokens().len(), cached));
    }

    match format {
        OutputFormat::Plain => {
            println!("{:<24} {:<14} {:>8}  {}", "MODEL", "VOCABULARY", "SPECIAL", "CACHE");
            for (model, vocabulary, specials, cached) in &rows {
                println!("{:<24} {:<14} {:>8}  {}", model, vocabulary, specials, cached);
            }
        }
        OutputFormat::Json => {
            let json: Vec<_> = rows
                .iter()
                .map(|(model, vocabulary, specials, cached)| {
                    serde_json::json!({
                        "model": model,
                        "vocabulary": vocabulary,
                        "special_tokens": specials,
                        "cache": cached,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn model_or_default(registry: &TokenizerRegistry, model: Option<String>) -> String {
    model.unwrap_or_else(|| registry.default_model().to_string())
}

async fn encode_text(
    registry: &TokenizerRegistry,
    model: Option<String>,
    text: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = model_or_default(registry, model);
    let stats = registry.get(&model).await?.encode_with_stats(text)?;

    match format {
        OutputFormat::Plain => {
            let ids: Vec<String> = stats.tokens.iter().map(u32::to_string).collect();
            println!("{}", ids.join(" "));
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "model": model,
                "tokens": stats.tokens,
                "num_tokens": stats.num_tokens,
                "num_chars": stats.num_chars,
            })
        ),
    }
    Ok(())
}

async fn count_text(
    registry: &TokenizerRegistry,
    model: Option<String>,
    text: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = model_or_default(registry, model);
    let count = registry.get(&model).await?.count(text)?;

    match format {
        OutputFormat::Plain => println!("{}", count),
        OutputFormat::Json => println!("{}", serde_json::json!({ "model": model, "num_tokens": count })),
    }
    Ok(())
}

async fn refresh_model(registry: &TokenizerRegistry, model: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let model = model_or_default(registry, model);
    let descriptor = registry.descriptors().lookup(&model)?;

    let removed = fetch::remove_stale_parts(registry.fetcher().cache_dir())?;
    if removed > 0 {
        info!(removed, "removed interrupted downloads");
    }

    let vocabulary = registry.fetcher().refresh(descriptor).await?;
    println!("Refreshed {} at {}", model, vocabulary.path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Plain);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);

        let err = "yaml".parse::<OutputFormat>().unwrap_err();
        assert!(err.contains("yaml"), "{}", err);
    }

    #[test]
    fn test_parse_encode_command() {
        let cli = Cli::try_parse_from(["tokenize", "--format", "json", "encode", "-m", "gpt-3.5", "hello world"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(!cli.verbose);
        match cli.command {
            Commands::Encode { model, text } => {
                assert_eq!(model.as_deref(), Some("gpt-3.5"));
                assert_eq!(text, "hello world");
            }
            _ => panic!("expected encode"),
        }

        assert!(Cli::try_parse_from(["tokenize", "--format", "xml", "list"]).is_err());
    }

    #[test]
    fn test_model_or_default() {
        let cache = tempfile::tempdir().unwrap();
        let config = TokenizerConfig::new("gpt-3.5").with_cache_dir(cache.path());
        let registry = TokenizerRegistry::new(&config).unwrap();

        assert_eq!(model_or_default(&registry, None), "gpt-3.5");
        assert_eq!(model_or_default(&registry, Some("gpt-4o".into())), "gpt-4o");
    }
}
