// draftroom server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database and load the player catalog
// 4. Build the coordinator and recover live drafts
// 5. Spawn WebSocket server task
// 6. Run the app loop until Ctrl+C

use std::sync::Arc;

use draftroom_core::catalog::RankedCatalog;
use draftroom_core::db::Database;
use draftroom_core::events::EventBus;
use draftroom_core::DraftCoordinator;
use draftroom_server::{app, config, ws_server};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("draftroom starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: port {}, {}s per pick, ${} salary cap",
        config.ws_port, config.draft.time_per_pick_seconds, config.draft.salary_cap
    );

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db_path = config.db_path.to_string_lossy().into_owned();
    let db = Database::open(&db_path).context("failed to open database")?;
    info!("Database opened at {}", db_path);

    let catalog = RankedCatalog::load_csv(&config.players_path)
        .context("failed to load player catalog")?;

    let events = EventBus::default();
    let coordinator = DraftCoordinator::new(
        Arc::new(db),
        Arc::new(catalog),
        events.clone(),
        config.grace_period(),
    );
    let recovered = coordinator
        .recover()
        .await
        .context("failed to recover live drafts")?;
    info!("Recovered {} live draft(s)", recovered);

    let (ws_tx, ws_rx) = mpsc::channel(256);
    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        match ws_server::TungsteniteListener::bind(ws_port).await {
            Ok(listener) => {
                if let Err(e) = ws_server::run(listener, ws_tx).await {
                    error!("WebSocket server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind WebSocket server on port {}: {}", ws_port, e);
            }
        }
    });

    let state = app::AppState::new(config, coordinator);
    let mut app_handle = tokio::spawn(app::run(ws_rx, events.subscribe(), state));

    info!("draftroom ready on 127.0.0.1:{}", ws_port);
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown requested");
        }
        result = &mut app_handle => {
            match result {
                Ok(Err(e)) => error!("Application loop error: {}", e),
                Err(e) => error!("Application task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    ws_handle.abort();
    app_handle.abort();

    info!("draftroom shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/draftroom.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("draftroom.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("draftroom=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
