//! Pomodoro Keeper - entry point of the timer daemon

use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, warn};

use pomodoro_keeper::{
    api::create_router,
    config::Config,
    services::TitleStatusLine,
    state::{AppState, TimerDeps},
    tasks::{clock_driver_task, persist_channel, persist_writer_task, ClockDriver},
    timing::{SystemClock, TokioScheduler},
    utils::shutdown_signal,
};

/// Pending writes get this long after a shutdown signal
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("pomodoro_keeper={},tower_http=info", config.log_level()))
        .init();

    info!("Starting pomodoro-keeper v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, data_dir={}, remote={}",
        config.host,
        config.port,
        config.data_dir.display(),
        config.remote_url.as_deref().unwrap_or("none")
    );

    let stores = config.store_selector();
    let identity = config.identity();
    let store = stores.for_identity(&identity)?;
    info!("Records for {:?} live in {}", identity.uid(), store.describe());

    // Single writer keeps persistence in transition order
    let (persist_tx, persist_rx) = persist_channel();
    let writer = tokio::spawn(persist_writer_task(persist_rx));

    let state = Arc::new(AppState::new(
        TimerDeps {
            clock: Arc::new(SystemClock),
            chime: config.chime(),
            store,
            identity,
            persist_tx,
        },
        config.port,
        config.host.clone(),
        config.initial_visibility(),
    ));

    let recovery = state.rehydrate().await?;
    info!("Timer ready ({:?})", recovery);

    let driver = ClockDriver::new(
        Arc::clone(&state),
        Arc::new(TokioScheduler::new()),
        Arc::new(TitleStatusLine::new(config.terminal_title)),
    );
    let driver_task = tokio::spawn(clock_driver_task(Arc::clone(&driver), Arc::clone(&state)));

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state), stores);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /timer          - Current timer view");
    info!("  POST /timer/start    - Start or resume the countdown");
    info!("  POST /timer/pause    - Pause the countdown");
    info!("  POST /timer/reset    - Back to a fresh focus phase");
    info!("  POST /timer/skip     - Jump to the next phase");
    info!("  GET  /config         - Current durations");
    info!("  PUT  /config         - Update durations");
    info!("  POST /visibility     - Report whether the timer is on screen");
    info!("  POST /identity       - Sign in or out");
    info!("  GET  /status         - Daemon status");
    info!("  GET  /health         - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    driver.shutdown();
    driver_task.abort();
    if !state.flush_within(SHUTDOWN_FLUSH_TIMEOUT).await {
        warn!("Gave up on pending writes after {:?}", SHUTDOWN_FLUSH_TIMEOUT);
    }
    writer.abort();

    info!("Server shutdown complete");
    Ok(())
}
