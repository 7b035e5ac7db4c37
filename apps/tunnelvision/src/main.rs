use tunnelvision::demo::stream_phantom;
use tunnelvision::error::TunnelvisionError;
use tunnelvision::logger::{initialize as LoggerInitialize, level_from_env};

use viewer_client::config::{ViewerConfig, cache_dir};
use viewer_client::session::{Figsize, SessionContext, ViewSession};

use std::env::temp_dir;
use std::fs::create_dir_all;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::signal::ctrl_c;

const PHANTOM_SIDE: usize = 64;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), TunnelvisionError> {
    let log_dir = cache_dir().unwrap_or_else(temp_dir);
    create_dir_all(&log_dir).map_err(|e| {
        TunnelvisionError::app(format!(
            "Failed to create log directory {}: {e}",
            log_dir.display()
        ))
    })?;
    LoggerInitialize(&log_dir, level_from_env())?;

    let config = ViewerConfig::load()?;
    info!("Viewer config: {config:?}");

    let context = SessionContext::new(config);
    let result = show(&context).await;
    context.shutdown().await;
    result
}

async fn show(context: &Arc<SessionContext>) -> Result<(), TunnelvisionError> {
    let session = ViewSession::new(Arc::clone(context), Figsize::default()).await?;
    println!("{session}");
    println!("Open {} to view the volume, Ctrl-C to quit", session.uri());

    stream_phantom(context, &session, PHANTOM_SIDE, interrupted()).await
}

async fn interrupted() {
    if let Err(e) = ctrl_c().await {
        warn!("Failed to listen for Ctrl-C, stopping: {e}");
    }
}
