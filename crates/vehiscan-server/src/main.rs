use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use vehiscan_core::DetectOptions;
use vehiscan_pipeline::{DetectPipeline, PipelineConfig};

mod api;
mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("vehiscan v{}", env!("CARGO_PKG_VERSION"));

    // Load or create config.
    let config = if let Some(config_path) = &cli.config {
        let data = std::fs::read_to_string(config_path)?;
        serde_json::from_str(&data)?
    } else {
        PipelineConfig::default()
    };

    match cli.command {
        Command::Serve { host, port } => {
            serve(config, &host, port).await?;
        }
        Command::Detect {
            input_path,
            batch_size,
            use_gpu,
            output_dir,
            visualization,
            score_thresh,
        } => {
            let pipeline = DetectPipeline::build(&config)?;
            let options = DetectOptions {
                batch_size,
                use_gpu,
                output_dir,
                score_thresh,
                visualization,
            };
            cli::run_detect(&pipeline, &input_path, &options)?;
        }
    }

    Ok(())
}

async fn serve(config: PipelineConfig, host: &str, port: u16) -> anyhow::Result<()> {
    // Prometheus exporter on its own listener.
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .expect("failed to install metrics exporter");

    let pipeline = DetectPipeline::build(&config)?;
    pipeline.warmup()?;

    let state = Arc::new(api::AppState {
        pipeline: parking_lot::Mutex::new(pipeline),
        start_time: Instant::now(),
    });

    // Build router with middleware.
    let app = api::create_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
