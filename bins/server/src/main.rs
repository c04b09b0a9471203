//! Hirebill API Server
//!
//! Main entry point for the billing reconciliation service.

use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hirebill_api::{LiveState, create_router};
use hirebill_connectors::{BoardClient, HirePlatformClient, PaymentsClient, WebhookVerifier};
use hirebill_core::auth::{
    AdminCredential, InMemoryAttemptStore, LoginRateLimiter, RateLimitPolicy, hash_password,
};
use hirebill_core::orchestrator::{OrchestratorPolicy, PaymentOrchestrator};
use hirebill_shared::{AppConfig, SessionConfig, SessionTokenService};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Print an Argon2 hash for the admin password, read from stdin.
    HashPassword,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::HashPassword => print_password_hash(),
    }
}

fn print_password_hash() -> anyhow::Result<()> {
    let mut password = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut password)
        .context("failed to read password from stdin")?;
    let hash = hash_password(password.trim_end_matches(['\r', '\n']))?;
    println!("{hash}");
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hirebill=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    // External system clients
    let hire = HirePlatformClient::new(&config.hire_platform)?;
    let payments = PaymentsClient::new(&config.payments)?;
    let board = BoardClient::new(&config.board)?;
    info!(
        hire_platform = %config.hire_platform.base_url,
        payments = %config.payments.base_url,
        board = %config.board.api_url,
        "External clients configured"
    );

    let policy = OrchestratorPolicy::from_config(&config.hire_platform, &config.billing)?;
    let orchestrator =
        PaymentOrchestrator::new(Arc::new(hire), Arc::new(payments), Arc::new(board), policy);

    // Admin authentication
    let admin = AdminCredential::from_hash(config.auth.admin_password_hash.clone())
        .context("auth.admin_password_hash is not a valid Argon2 PHC string")?;
    let sessions = SessionTokenService::new(SessionConfig {
        secret: config.auth.session_secret.clone(),
        ttl_secs: i64::try_from(config.auth.session_ttl_secs)
            .context("auth.session_ttl_secs is out of range")?,
    });
    let login_limiter = LoginRateLimiter::new(
        Arc::new(InMemoryAttemptStore::default()),
        RateLimitPolicy::from(&config.auth),
    );

    let webhooks = WebhookVerifier::new(
        config.payments.webhook_secret.clone(),
        config.payments.webhook_tolerance_secs,
    );

    let state = LiveState {
        orchestrator,
        sessions: Arc::new(sessions),
        admin: Arc::new(admin),
        login_limiter,
        webhooks: Arc::new(webhooks),
    };

    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
