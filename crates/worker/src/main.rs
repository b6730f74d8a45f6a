mod config;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use worker_core::{Handler, Request, Response, Worker};
use worker_helpers::{logging, shutdown};

/// Demo handler registered under the `ping` event: reads chunks until the
/// daemon chokes the session, echoes their concatenation back, then closes.
/// A real deployment replaces this with application-specific handlers
/// registered the same way (`Worker::on`) before `run` connects.
struct Ping;

#[async_trait]
impl Handler for Ping {
    async fn call(&self, request: Request, response: Response) {
        let mut buf = Vec::new();
        loop {
            match request.read(None).await {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }
        response.write(Bytes::from(buf));
        response.close();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    logging::init_logging("worker=info,worker_core=info,tokio=warn", "WORKER_LOG", "worker");

    let config = config::load().context("failed to load worker configuration")?;
    info!(app = %config.app, endpoint = %config.endpoint, "worker configured");

    let mut worker = Worker::new(config);
    worker.on("ping", Ping);

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown::listen_shutdown(shutdown_token.clone()));

    tokio::select! {
        result = worker.run() => result.context("worker exited"),
        _ = shutdown_token.cancelled() => {
            warn!("shutdown requested, stopping worker");
            Ok(())
        }
    }
}
