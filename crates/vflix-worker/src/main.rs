//! Transcode worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};

use vflix_media::{check_ffmpeg, TranscodeWorker};
use vflix_queue::RedisJobQueue;
use vflix_worker::{init_tracing, metrics, JobExecutor, PipelineConfig, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vflix-worker");

    let pipeline = match PipelineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid pipeline configuration: {}", e);
            std::process::exit(1);
        }
    };
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    match check_ffmpeg(&pipeline.ffmpeg_path) {
        Ok(path) => info!("Using ffmpeg at {}", path.display()),
        Err(e) => {
            error!("FFmpeg not usable: {}", e);
            std::process::exit(1);
        }
    }

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => match metrics::install_exporter(addr) {
                Ok(()) => info!("Serving metrics on {}", addr),
                Err(e) => warn!("Metrics disabled: {}", e),
            },
            Err(e) => warn!("Ignoring METRICS_ADDR '{}': {}", addr, e),
        }
    }

    let queue = match RedisJobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(JobExecutor::new(
        config,
        queue,
        TranscodeWorker::new(pipeline.runner()),
    ));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
