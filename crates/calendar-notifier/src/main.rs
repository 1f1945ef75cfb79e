use anyhow::{Context, Result};
use calendar_notifier::calendar_client::GoogleCalendarSource;
use calendar_notifier::service::{self, NotifierService};
use calendar_notifier::{Credentials, LogSink, NotifierConfig, SystemClock};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calendar-notifier")]
#[command(about = "Fire a timestamped notification at the start and end of calendar events")]
struct Cli {
    /// TOML configuration file. Every field is optional; NOTIFIER_* environment
    /// variables override values from the file.
    #[arg(short, long, env = "NOTIFIER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON file with `api_key` and `google_cal_id`.
    /// Overrides `credentials_path` from the configuration.
    #[arg(long, value_name = "FILE")]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the calendar and fire actions until interrupted (default)
    Run,
    /// Query the window that would be planned now and show which actions
    /// would be armed, without arming anything
    Preview,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calendar_notifier=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("TLS crypto provider already installed");
    }

    let cli = Cli::parse();

    let mut config = NotifierConfig::from_file_and_env(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(path) = cli.credentials {
        config.credentials_path = path;
    }

    let credentials = match Credentials::load(&config.credentials_path) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!("Error loading API key file: {}", e);
            return Err(e).context("Planner not started");
        }
    };

    let source = GoogleCalendarSource::new(&credentials)
        .context("Failed to create Google Calendar client")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, credentials, source).await,
        Commands::Preview => print_preview(&config, &credentials, &source).await,
    }
}

async fn run(
    config: NotifierConfig,
    credentials: Credentials,
    source: GoogleCalendarSource,
) -> Result<()> {
    let service = NotifierService::new(
        config,
        credentials.calendar_id,
        Arc::new(source),
        Arc::new(LogSink::stdout()),
        Arc::new(SystemClock),
    );

    service
        .run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received, stopping...");
        })
        .await?;

    tracing::info!("Calendar notifier stopped");
    Ok(())
}

async fn print_preview(
    config: &NotifierConfig,
    credentials: &Credentials,
    source: &GoogleCalendarSource,
) -> Result<()> {
    let preview = service::preview(config, &credentials.calendar_id, source, &SystemClock)
        .await
        .context("Calendar query failed")?;

    println!(
        "Window: {} -> {}",
        preview.window.start.to_rfc3339(),
        preview.window.end.to_rfc3339()
    );

    if preview.entries.is_empty() {
        println!("No events in window.");
        return Ok(());
    }

    for entry in &preview.entries {
        let actions = if entry.actions.is_empty() {
            "none".to_string()
        } else {
            entry
                .actions
                .iter()
                .map(|kind| kind.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "{}  {} -> {}  [{}]",
            entry.event.summary,
            entry.event.start.to_rfc3339(),
            entry.event.end.to_rfc3339(),
            actions
        );
    }

    Ok(())
}
