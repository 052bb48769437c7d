//! Investment game - Main Entry Point
//!
//! Runs the game engine: loads configuration, connects the store, wires the
//! period controllers and waits for ctrl-c.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use investment_game::config::load_config;
use investment_game::store::{InMemoryStore, PgStore, Stores};
use investment_game::{
    register_period_subscribers, BroadcastNotifier, GameService, NotificationSink, PeriodController,
    Settings, TeamService,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Keep all state in memory even if a database is configured
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(Some(args.config.as_str()))?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.settings.log_level);
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting investment game engine");
    info!("Configuration file: {}", args.config);

    // Seed for a store without a settings row yet
    let seed = Settings {
        round_duration: config.game.round_duration(),
        default_balance_amount: config.game.default_balance_amount,
        ..Settings::default()
    };

    let stores = match (&config.database, args.in_memory) {
        (Some(database), false) => {
            let store = PgStore::connect(database).await?;
            store.ensure_schema(&seed).await?;
            Stores::from_backend(Arc::new(store))
        }
        _ => {
            info!("Using in-memory store");
            Stores::from_backend(Arc::new(InMemoryStore::with_settings(seed)))
        }
    };

    // Trade periods use the stored round duration once settings exist
    let round_duration = stores.settings.get().await?.round_duration;
    let trade = Arc::new(
        PeriodController::new("trade", round_duration).with_stop_grace(config.game.stop_grace()),
    );
    let registration = Arc::new(
        PeriodController::new("registration", config.game.registration_duration())
            .with_stop_grace(config.game.stop_grace()),
    );

    let broadcast = BroadcastNotifier::new();
    let mut notifications = broadcast.subscribe();
    let notifier: Arc<dyn NotificationSink> = Arc::new(broadcast);

    let teams = Arc::new(TeamService::new(stores.clone()));
    register_period_subscribers(&trade, &registration, &teams, &notifier);

    let games = GameService::new(&stores, trade, registration, notifier);

    let game = games.get().await?;
    info!(
        state = %game.state,
        round = game.current_round,
        current_game = game.current_game,
        "Application initialized successfully"
    );

    // Log outbound notifications until shutdown
    let logger = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(json) => info!(message = %json, "notification"),
                    Err(e) => warn!(error = %e, "failed to encode notification"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Keep the application running
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    if !games.shutdown(config.game.shutdown_timeout()).await {
        warn!("Some period tasks did not finish before the shutdown timeout");
    }
    logger.abort();

    Ok(())
}
