//! Excavation PDF intake server
//!
//! `serve` runs the HTTP server; `poll` follows one process from the
//! command line until it finishes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pdf_intake_server::api::build_router;
use pdf_intake_server::config::{ServeArgs, ServerConfig};
use pdf_intake_server::poller::{StatusPoller, DEFAULT_MAX_ATTEMPTS};
use pdf_intake_server::status::spawn_sweeper;
use pdf_intake_server::AppState;

/// Command-line arguments for the intake server
#[derive(Parser, Debug)]
#[command(name = "pdf-intake-server")]
#[command(about = "Excavation PDF intake: text extraction, webhook delivery and status polling")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Poll a process until it completes or fails
    Poll {
        /// Server base URL
        #[arg(long, env = "PDF_INTAKE_URL", default_value = "http://localhost:3000")]
        base_url: String,

        /// Bearer token
        #[arg(long, env = "PDF_INTAKE_TOKEN")]
        token: String,

        /// Delay between polls in milliseconds
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,

        /// Give up after this many polls
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,

        /// Process id returned by the upload
        process_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Serve(args) => serve(ServerConfig::from(args)).await,
        Command::Poll {
            base_url,
            token,
            interval_ms,
            max_attempts,
            process_id,
        } => {
            let poller = StatusPoller::new(base_url, token)
                .with_interval(Duration::from_millis(interval_ms))
                .with_max_attempts(max_attempts);
            let snapshot = poller.wait_for_completion(&process_id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    info!("Starting PDF intake server on {}:{}", config.host, config.port);

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit.into())
            .burst_size(config.rate_limit * 2)
            .finish()
            .context("Failed to create rate limiter config")?,
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let rate_limit = config.rate_limit;
    let webhook_url = config.webhook_url.clone();
    let timeout = config.processing_timeout;
    let sweep_interval = config.sweep_interval;

    let state = Arc::new(AppState::new(config).context("Failed to build webhook client")?);
    spawn_sweeper(Arc::clone(state.pipeline.store()), sweep_interval);

    let app = build_router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", rate_limit);
    info!("Processing timeout: {}ms", timeout.as_millis());
    info!("Webhook: {}", webhook_url);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
