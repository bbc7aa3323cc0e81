use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seatwatch::api::router;
use seatwatch::config::Config;
use seatwatch::db;
use seatwatch::portal::PortalHttpClient;
use seatwatch::services::{Engine, MonitorContext, PortalSession, SystemClock};
use seatwatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "seatwatch=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::new_from_env()?;
    let pool = db::connect(&config.database_url).await?;

    let adapter = Arc::new(PortalHttpClient::new(config.registration_timeout.max(config.scrape_timeout))?);
    let ctx = MonitorContext {
        db: pool.clone(),
        session: Arc::new(PortalSession::new(adapter)),
        clock: Arc::new(SystemClock),
        term: config.term.clone(),
        registration_timeout: config.registration_timeout,
        scrape_timeout: config.scrape_timeout,
    };

    // No cycle can run without a session, so a failed login ends the process.
    let session = ctx.session.clone();
    let engine = match Engine::connect(ctx, &config.credentials, &config.portal_url).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Startup failed: {}", e);
            session.release().await;
            return Err(e.into());
        }
    };

    if config.auto_start_monitor {
        engine.start_monitor(config.max_attempts, config.delay_seconds)?;
    }

    let app = router(AppState {
        db: pool,
        engine: engine.clone(),
        default_max_attempts: config.max_attempts,
        default_delay_seconds: config.delay_seconds,
    });

    info!("listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Stop requested by user");
        })
        .await?;

    engine.shutdown().await;
    Ok(())
}
