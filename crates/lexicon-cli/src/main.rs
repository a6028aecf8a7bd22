//! Lexicon CLI - Command-line interface
//!
//! Usage:
//!   lexicon ner <TEXT>...
//!   lexicon legal <TEXT>
//!   lexicon config

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lexicon_core::{char_offset, AppConfig, ConfigOverrides, Entity};
use lexicon_service::LexiconService;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lexicon")]
#[command(about = "Indonesian entity recognition and legal role extraction")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that take precedence over the environment and the config file
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum cached results
    #[arg(long, global = true)]
    cache_size: Option<usize>,

    /// Maximum texts per tagging backend call
    #[arg(long, global = true)]
    max_batch_size: Option<usize>,

    /// Tokens inspected around an entity by the title normalizer
    #[arg(long, global = true)]
    context_window: Option<usize>,

    /// Remote model used for legal role extraction
    #[arg(long, global = true)]
    model: Option<String>,
}

impl OverrideArgs {
    fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cache_size: self.cache_size,
            max_batch_size: self.max_batch_size,
            context_window: self.context_window,
            llm_model: self.model.clone(),
            ..ConfigOverrides::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize named entities
    Ner {
        /// Texts to analyze, one result per text
        #[arg(required = true)]
        texts: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Identify people and their legal roles
    Legal {
        /// Legal text to analyze
        text: String,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    Config,
}

/// Entity as printed by the CLI, with character offsets
#[derive(Debug, Serialize)]
struct Row {
    text: String,
    #[serde(rename = "type")]
    entity_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    start_pos: usize,
    end_pos: usize,
    confidence: f32,
}

impl Row {
    fn new(source: &str, entity: &Entity) -> Self {
        Self {
            text: entity.text.clone(),
            entity_type: entity.entity_type.as_str(),
            role: entity.role.map(|role| role.as_str()),
            start_pos: char_offset(source, entity.start),
            end_pos: char_offset(source, entity.end),
            confidence: entity.confidence,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::resolve(cli.overrides.config.as_deref(), &cli.overrides.to_overrides())
        .context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ner { texts, json } => {
            let service = LexiconService::from_config(&config)?;
            let results = service.recognize_batch(&texts).await?;
            let rows: Vec<Vec<Row>> = texts
                .iter()
                .zip(&results)
                .map(|(text, entities)| entities.iter().map(|e| Row::new(text, e)).collect())
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (text, rows) in texts.iter().zip(&rows) {
                    println!("{text}");
                    print_rows(rows);
                }
            }
        }
        Commands::Legal { text, json } => {
            let service = LexiconService::from_config(&config)?;
            let entities = service.extract_legal(&text).await?;
            let rows: Vec<Row> = entities.iter().map(|e| Row::new(&text, e)).collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_rows(&rows);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&redacted(config))?);
        }
    }

    Ok(())
}

fn print_rows(rows: &[Row]) {
    if rows.is_empty() {
        println!("  (no entities)");
    }
    for row in rows {
        println!(
            "  {:<4} {:<32} {:>4}..{:<4} {:.2} {}",
            row.entity_type,
            row.text,
            row.start_pos,
            row.end_pos,
            row.confidence,
            row.role.unwrap_or("")
        );
    }
}

/// Hide secrets before printing
fn redacted(mut config: AppConfig) -> AppConfig {
    const HIDDEN: &str = "********";
    if !config.auth.api_key.is_empty() {
        config.auth.api_key = HIDDEN.to_string();
    }
    if config.llm.openai_api_key.is_some() {
        config.llm.openai_api_key = Some(HIDDEN.to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexicon_core::{EntityType, LegalRole};

    #[test]
    fn test_global_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "lexicon",
            "ner",
            "Presiden Joko Widodo",
            "--cache-size",
            "5",
            "--context-window",
            "2",
            "--model",
            "gpt-4o",
        ])
        .unwrap();

        let overrides = cli.overrides.to_overrides();
        assert_eq!(overrides.cache_size, Some(5));
        assert_eq!(overrides.context_window, Some(2));
        assert_eq!(overrides.llm_model.as_deref(), Some("gpt-4o"));
        assert_eq!(overrides.max_batch_size, None);
        assert!(matches!(cli.command, Commands::Ner { ref texts, json: false } if texts.len() == 1));
    }

    #[test]
    fn test_ner_requires_text() {
        assert!(Cli::try_parse_from(["lexicon", "ner"]).is_err());
    }

    #[test]
    fn test_overrides_win_over_env() {
        let cli = Cli::try_parse_from(["lexicon", "--cache-size", "7", "config"]).unwrap();
        let config = AppConfig::resolve_with(None, &cli.overrides.to_overrides(), |key| {
            (key == "CACHE_SIZE").then(|| "3".to_string())
        })
        .unwrap();
        assert_eq!(config.performance.cache_size, 7);
    }

    #[test]
    fn test_rows_use_character_offsets() {
        let text = "Hakim Ségolène Royal";
        let entity = Entity::from_source(text, EntityType::Person, 6, text.len(), 0.8)
            .with_role(Some(LegalRole::Representative));
        let row = Row::new(text, &entity);
        assert_eq!((row.start_pos, row.end_pos), (6, 20));
        assert_eq!(row.role, Some("representative"));
    }

    #[test]
    fn test_config_output_hides_secrets() {
        let mut config = AppConfig::default();
        config.llm.openai_api_key = Some("sk-secret".to_string());
        let printed = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!printed.contains("sk-secret"));
        assert!(!printed.contains("lexicon-ner-default-key"));
    }
}
