//! # orderflow
//!
//! Order and payment reconciliation server.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export FLW_PUBLIC_KEY=FLWPUBK_TEST-...
//! export FLW_SECRET_KEY=FLWSECK_TEST-...
//! export FLW_SECRET_HASH=...
//! export ADMIN_API_KEY=...
//!
//! # Run the server
//! orderflow
//! ```

use shop_api::{routes, state::AppState};
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    print_banner();

    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Payment provider: {}", state.provider);
    if state.config.admin_api_key.is_none() {
        warn!("ADMIN_API_KEY not set, admin routes will reject all requests");
    }

    // Refund sweep runs alongside the server and stops with it
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(state.refund_sweeper().run(shutdown_rx));

    let app = routes::create_router(state);

    info!("🚀 orderflow starting on http://{}", addr);

    if !is_prod {
        info!("📝 Health: http://{}/health", addr);
        info!("🛒 Checkout: POST http://{}/orders/checkout/{{cart_id}}", addr);
        info!("🔔 Webhook: POST http://{}/webhooks/flutterwave", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!("Refund sweeper task ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// `fmt` layer with `EnvFilter`; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_banner() {
    println!(
        r#"
  📦 orderflow 📦
  ━━━━━━━━━━━━━━━━━━━━━━━
  Order & payment reconciliation
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
