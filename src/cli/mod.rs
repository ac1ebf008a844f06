use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod settings;

use crate::core::{AppConfig, FileConfigStore};

#[derive(Subcommand)]
enum Command {
    /// Start a chat session
    Chat {},
    /// View or change the connection settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the stored settings
    Show {},
    /// Update and save the settings
    Set {
        /// Base URL of the OpenAI compatible API
        #[arg(long)]
        base_url: Option<String>,

        /// API key sent as a bearer token
        #[arg(long)]
        api_key: Option<String>,

        /// Model name to request completions from
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::default();
    let store = FileConfigStore::new(&config.settings_path);

    match args.command {
        Some(Command::Chat {}) => {
            chat::run(&store).await?;
        }
        Some(Command::Settings { action }) => {
            settings::run(action, &store)?;
        }
        None => {}
    }

    Ok(())
}
