mod ui;

use std::collections::BTreeSet;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use skillswap_chat::backend::remote::RemoteSettings;
use skillswap_chat::backend::{Backend, LocalBackend, RemoteBackend};
use skillswap_chat::chat::{ChatSession, SessionOptions};
use skillswap_chat::common::Profile;
use skillswap_chat::config::{self, AppConfig, BackendConfig};
use skillswap_chat::storage::{self, MessageDatabase};
use tokio::sync::mpsc;
use ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "skillswap_chat",
    version,
    about = "Direct messaging for the SkillSwap exchange"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Signed-in user for the local backend (overrides SKILLSWAP_USER_ID)
    #[arg(long, value_name = "ID")]
    user: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update a profile in the local database
    AddProfile {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Comma separated skill list
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);
    let user_id = cli.user.or_else(|| config::env_value(config::USER_ID_VAR));

    match (&app_config.backend, cli.command) {
        (BackendConfig::Local { database_path }, Some(command)) => {
            add_profile(database_path, command)?;
            Ok(())
        }
        (BackendConfig::Remote { .. }, Some(_)) => {
            Err("add-profile only works with the local backend".into())
        }
        (BackendConfig::Local { database_path }, None) => {
            storage::ensure_parent_dir(database_path)?;
            let db = MessageDatabase::with_path(database_path)?;
            log::info!("Using local backend at {database_path}");
            let backend = LocalBackend::new(db, user_id, app_config.channel_capacity);
            run_client(backend, &app_config)?;
            Ok(())
        }
        (BackendConfig::Remote { url, poll_interval_ms }, None) => {
            let api_key = config::env_value(config::API_KEY_VAR)
                .ok_or("SKILLSWAP_API_KEY must be set for the remote backend")?;
            log::info!("Using remote backend at {url}");
            let backend = RemoteBackend::new(RemoteSettings {
                url: url.clone(),
                api_key,
                access_token: config::env_value(config::ACCESS_TOKEN_VAR),
                poll_interval: config::poll_interval(*poll_interval_ms),
                feed_capacity: app_config.channel_capacity,
            })?;
            run_client(backend, &app_config)?;
            Ok(())
        }
    }
}

fn add_profile(database_path: &str, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let Command::AddProfile {
        id,
        name,
        bio,
        skills,
    } = command;

    storage::ensure_parent_dir(database_path)?;
    let mut db = MessageDatabase::with_path(database_path)?;
    db.upsert_profile(&Profile {
        id: id.clone(),
        display_name: name,
        bio,
        skills: skills
            .into_iter()
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect::<BTreeSet<_>>(),
    })?;
    log::info!("Saved profile {id} to {database_path}");
    Ok(())
}

fn run_client<B: Backend>(backend: B, app_config: &AppConfig) -> Result<(), eframe::Error> {
    let options: SessionOptions = app_config.session_options();
    let capacity = options.channel_capacity.max(1);

    // UI -> session
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    // session -> UI
    let (event_tx, event_rx) = mpsc::channel(capacity);

    tokio::spawn(ChatSession::new(backend, options, event_tx, cmd_rx).run());

    let native_options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "SkillSwap Chat",
        native_options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");
            Ok(Box::new(ChatApp::new(cc, cmd_tx.clone(), event_receiver)))
        }),
    )
}
