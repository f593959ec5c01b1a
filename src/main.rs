use std::net::SocketAddr;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use staff_portal::notify::email::Mailer;
use staff_portal::{api, config, notify, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("PORTAL_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    // sqlx and lettre both link rustls; pick the provider explicitly.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let cfg = config::Config::load()?;

    // Connect to Postgres and run migrations
    let pool = store::pool::connect(&cfg).await?;

    // Seed default stages and the admin user on first run
    store::bootstrap::run(&pool, &cfg.admin_email, cfg.admin_password.as_deref()).await?;

    let mailer = Mailer::from_config(&cfg)?;
    let addr: SocketAddr = cfg.listen.parse()?;
    let state = store::AppState::new(pool, cfg);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let outbox = tokio::spawn(notify::outbox::run(state.clone(), mailer, shutdown_rx));

    let app = api::app(state);

    tracing::info!(%addr, "starting staff portal");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(());
    if let Err(e) = outbox.await {
        tracing::warn!(error = %e, "outbox worker did not stop cleanly");
    }

    tracing::info!("staff portal stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
