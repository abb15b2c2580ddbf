//! Unix socket server for status queries.
//!
//! Newline-delimited JSON, one command per line. Read-only: nothing sent over
//! the socket can change the intersection store.

use crate::error::Result;
use crate::router::{RouterStats, RouterStatsSnapshot, SharedEngine};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use v2x_sink::{PublisherStats, PublisherStatsSnapshot};
use v2x_spat::IntersectionSnapshot;

/// Command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum StatusCommand {
    /// Ping (health check)
    Ping,
    /// Every intersection snapshot
    List,
    /// One intersection snapshot
    Get { intersection_id: String },
    /// Router and publisher counters
    Stats,
}

/// Response to a status command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusResponse {
    Pong,
    Snapshots {
        items: Vec<IntersectionSnapshot>,
    },
    Snapshot {
        item: IntersectionSnapshot,
    },
    Stats {
        router: RouterStatsSnapshot,
        publisher: PublisherStatsSnapshot,
    },
    Error {
        error: String,
    },
}

/// Status socket server.
pub struct StatusSocket {
    engine: SharedEngine,
    router_stats: Arc<RouterStats>,
    publisher_stats: Arc<PublisherStats>,
    socket_path: PathBuf,
}

impl StatusSocket {
    /// Create a new status socket server.
    pub fn new(
        engine: SharedEngine,
        router_stats: Arc<RouterStats>,
        publisher_stats: Arc<PublisherStats>,
        socket_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            router_stats,
            publisher_stats,
            socket_path: socket_path.into(),
        }
    }

    /// Bind the socket, replacing a stale socket file.
    pub fn bind(&self) -> Result<UnixListener> {
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Status socket listening on {}", self.socket_path.display());
        Ok(listener)
    }

    /// Serve connections on `listener` until the task is aborted.
    pub async fn serve(self, listener: UnixListener) {
        let state = Arc::new(self);
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = state.handle_connection(stream).await {
                            tracing::error!("Status connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept status connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        while reader.read_line(&mut line).await? > 0 {
            if !line.trim().is_empty() {
                let response = match serde_json::from_str::<StatusCommand>(&line) {
                    Ok(cmd) => self.execute(cmd).await,
                    Err(e) => StatusResponse::Error {
                        error: format!("Invalid command: {}", e),
                    },
                };

                let response_json = serde_json::to_string(&response)? + "\n";
                writer.write_all(response_json.as_bytes()).await?;
            }
            line.clear();
        }

        Ok(())
    }

    async fn execute(&self, cmd: StatusCommand) -> StatusResponse {
        match cmd {
            StatusCommand::Ping => StatusResponse::Pong,

            StatusCommand::List => {
                let engine = self.engine.read().await;
                StatusResponse::Snapshots {
                    items: engine.store().iter().cloned().collect(),
                }
            }

            StatusCommand::Get { intersection_id } => {
                let engine = self.engine.read().await;
                match engine.store().get(&intersection_id) {
                    Some(snapshot) => StatusResponse::Snapshot {
                        item: snapshot.clone(),
                    },
                    None => StatusResponse::Error {
                        error: format!("unknown intersection id: {}", intersection_id),
                    },
                }
            }

            StatusCommand::Stats => StatusResponse::Stats {
                router: self.router_stats.snapshot(),
                publisher: self.publisher_stats.snapshot(),
            },
        }
    }
}
