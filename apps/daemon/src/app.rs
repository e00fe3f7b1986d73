//! Application orchestrator: wires the core and serves JSON lines.
//!
//! Each stdin line is one [`Command`]. Command results and broadcasts are
//! written to stdout as one JSON object per line.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use plcwatch_catalog::Sanitizer;
use plcwatch_hub::Supervisor;
use plcwatch_hub_connection::ConnectionManager;
use plcwatch_hub_poller::Poller;
use plcwatch_protocol::Command;
use plcwatch_sim::{SimClient, SimServer};

use crate::config::Config;

/// Runs the daemon until stdin closes or SIGINT arrives.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let supervisor = Arc::new(build(&config).await);

    for connection in &config.connections {
        let command = Command::CreateConnection {
            config: connection.clone(),
        };
        let result = supervisor.dispatch(command).await;
        if !result.success {
            tracing::warn!(name = %connection.name, message = %result.message, "configured connection rejected");
        }
    }

    let (out_tx, out_rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(write_lines(out_rx));

    if let Some(mut broadcasts) = supervisor.take_broadcasts().await {
        let out = out_tx.clone();
        tokio::spawn(async move {
            while let Some(broadcast) = broadcasts.recv().await {
                if let Some(line) = to_line(&broadcast)
                    && out.send(line).await.is_err()
                {
                    break;
                }
            }
        });
    }

    tracing::info!("plcwatch ready");

    tokio::select! {
        _ = read_commands(Arc::clone(&supervisor), out_tx.clone()) => {
            tracing::info!("stdin closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }

    supervisor.shutdown().await;
    drop(out_tx);
    // Broadcast forwarding ends with the supervisor; flush what is queued.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), writer).await;
    Ok(())
}

/// Builds the supervisor described by `config`.
async fn build(config: &Config) -> Supervisor {
    let client = Arc::new(SimClient::new());
    if config.simulate {
        client.register(&config.simulator_endpoint, Arc::new(SimServer::demo()));
        tracing::info!(endpoint = %config.simulator_endpoint, "serving simulated controller");
    } else {
        tracing::warn!("no controller transport configured, connects will be refused");
    }

    let manager = Arc::new(
        ConnectionManager::new(client)
            .with_timeouts(config.timeouts())
            .with_explorer(config.explorer.clone())
            .with_sanitizer(Sanitizer::new(config.sanitizer_prefixes.clone())),
    );
    let poller = Arc::new(
        Poller::new(manager.clone())
            .with_interval(config.poll_interval())
            .with_read_timeout(config.timeouts().operation),
    );
    Supervisor::start(manager, poller).await
}

async fn read_commands(supervisor: Arc<Supervisor>, out: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command: Command = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable command");
                let reply = serde_json::json!({
                    "success": false,
                    "message": format!("invalid command: {e}"),
                });
                let _ = out.send(reply.to_string()).await;
                continue;
            }
        };

        // Commands run concurrently so a slow connect does not stall reads.
        let supervisor = Arc::clone(&supervisor);
        let out = out.clone();
        tokio::spawn(async move {
            let result = supervisor.dispatch(command).await;
            if let Some(line) = to_line(&result) {
                let _ = out.send(line).await;
            }
        });
    }
}

async fn write_lines(mut rx: mpsc::Receiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::error!("stdout write failed: {e}");
            break;
        }
        let _ = stdout.flush().await;
    }
}

fn to_line<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value)
        .map_err(|e| tracing::error!("failed to serialize output: {e}"))
        .ok()
}
