use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;

use stocksmart_api::{
    app_router,
    config::{init_tracing, load_config},
    db,
    events,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(load_config().context("failed to load configuration")?);
    init_tracing(&config.log_level);

    info!("starting stocksmart-api v{}", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(db::connect(&config).await.context("database connection failed")?);
    if config.auto_migrate {
        db::run_migrations(&db).await.context("migration failed")?;
    }

    let (event_sender, event_receiver) = events::channel(1024);
    tokio::spawn(events::process_events(event_receiver));

    let state = AppState::new(db, config.clone(), Arc::new(event_sender))
        .context("service wiring failed")?;
    let app = app_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received terminate signal"),
    }
}
