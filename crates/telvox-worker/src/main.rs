//! Telvox Worker - serverless TTS job handler
//!
//! Runs either a single job from the command line (`--test_input`) or an
//! HTTP endpoint that accepts jobs and streams their events back.

use clap::Parser;
use std::path::PathBuf;
use telvox_core::{ServerConfig, Worker};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod envelope;
mod error;
mod settings;
mod state;
mod test_input;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "telvox-worker")]
#[command(about = "Serverless text-to-speech worker streaming 20 ms mu-law frames")]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "TELVOX_CONFIG")]
    config: Option<PathBuf>,

    /// Run one job given as JSON, print its events and exit
    #[arg(long = "test_input", visible_alias = "test-input")]
    test_input: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only events in test mode
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telvox_worker=debug,telvox_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = settings::load(args.config.as_deref())?;

    match args.test_input {
        Some(input) => test_input::run(&config, &input, &mut std::io::stdout()).await?,
        None => {
            info!("Starting Telvox worker");
            let worker = Worker::start(&config).await?;
            serve(worker, &config.server).await?;
        }
    }

    Ok(())
}

async fn serve(worker: Worker, server: &ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(worker);
    let app = api::create_router(state.clone(), server.cors_enabled);

    let addr = server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Worker listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    state.worker.shutdown().await?;
    Ok(())
}
