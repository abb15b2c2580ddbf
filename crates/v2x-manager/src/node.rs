//! Data manager node.
//!
//! Architecture:
//! - One UDP socket, one ingest loop, one datagram handled at a time
//! - Engine behind a lock shared with the status socket
//! - Publication through a bounded queue into the configured sink

use crate::config::{ManagerConfig, SinkKind};
use crate::envelope::MAX_DATAGRAM;
use crate::error::Result;
use crate::router::{Router, RouterStats, SharedEngine};
use crate::status_socket::StatusSocket;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{UdpSocket, UnixListener};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use v2x_sink::{
    MemorySink, Publisher, PublisherStats, RestSink, RestSinkConfig, RocksSink, Sink,
};
use v2x_spat::{IntersectionRegistry, SpatEngine};

/// A data manager node instance.
pub struct ManagerNode {
    config: ManagerConfig,
    socket: UdpSocket,
    engine: SharedEngine,
    router: Router,
    publisher: Publisher,
    status: Option<(StatusSocket, UnixListener)>,
}

impl ManagerNode {
    /// Load the intersection registry, open the configured sink and bind.
    pub async fn start(config: ManagerConfig) -> Result<Self> {
        let registry = IntersectionRegistry::from_path(&config.intersections_path)?;
        let sink = open_sink(&config)?;
        Self::with_sink(config, registry, sink).await
    }

    /// Bind with an already loaded registry and an explicit sink.
    pub async fn with_sink(
        config: ManagerConfig,
        registry: IntersectionRegistry,
        sink: Arc<dyn Sink>,
    ) -> Result<Self> {
        if registry.is_empty() {
            warn!("No intersections configured; every SPaT message will be dropped");
        }
        for intersection in registry.iter() {
            info!(
                intersection_id = %intersection.id,
                name = intersection.name.as_deref().unwrap_or(""),
                phases = ?intersection.phases(),
                "Intersection configured"
            );
        }

        let engine: SharedEngine = Arc::new(RwLock::new(SpatEngine::new(Arc::new(registry))));
        let publisher = Publisher::spawn(sink, config.publisher.clone());
        let router = Router::new(Arc::clone(&engine), publisher.handle());

        let socket = UdpSocket::bind(config.bind_addr).await?;

        let status = match &config.status_socket {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let server = StatusSocket::new(
                    Arc::clone(&engine),
                    router.stats(),
                    Arc::clone(publisher.handle().stats()),
                    path,
                );
                let listener = server.bind()?;
                Some((server, listener))
            }
            None => None,
        };

        Ok(Self {
            config,
            socket,
            engine,
            router,
            publisher,
            status,
        })
    }

    /// Address the UDP socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The shared engine (read it for snapshots).
    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    /// Router counters.
    pub fn stats(&self) -> Arc<RouterStats> {
        self.router.stats()
    }

    /// Publisher counters.
    pub fn publisher_stats(&self) -> Arc<PublisherStats> {
        Arc::clone(self.publisher.handle().stats())
    }

    /// Run until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the ingest loop until `shutdown` completes, then drain and close.
    ///
    /// A datagram already being dispatched when `shutdown` fires is handled to
    /// completion before the loop exits.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            socket,
            engine: _,
            router,
            publisher,
            status,
        } = self;

        info!("V2X data manager starting");
        info!("  UDP: {}", socket.local_addr()?);
        info!("  Data: {:?}", config.data_dir);
        info!("  Status: {:?}", config.status_socket);

        let status_task = status.map(|(server, listener)| tokio::spawn(server.serve(listener)));

        tokio::pin!(shutdown);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        debug!(%peer, len, "Datagram received");
                        router.dispatch(&buf[..len]).await;
                    }
                    Err(e) => warn!(error = %e, "UDP receive failed"),
                },
            }
        }

        drop(socket);
        if let Some(task) = status_task {
            task.abort();
        }
        if let Some(path) = &config.status_socket {
            let _ = std::fs::remove_file(path);
        }

        let stats = router.stats().snapshot();
        drop(router);
        publisher.shutdown().await?;

        info!(
            received = stats.received,
            spat = stats.spat,
            bsm = stats.bsm,
            malformed = stats.malformed,
            unknown_intersection = stats.unknown_intersection,
            publish_dropped = stats.publish_dropped,
            "V2X data manager stopped"
        );
        Ok(())
    }
}

/// Build the sink named by `config.sink`.
pub fn open_sink(config: &ManagerConfig) -> Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match &config.sink {
        SinkKind::Rocks => {
            std::fs::create_dir_all(&config.data_dir)?;
            Arc::new(RocksSink::open(config.data_dir.join("sink"))?)
        }
        SinkKind::Rest {
            base_url,
            auth_token,
        } => {
            let mut rest = RestSinkConfig::new(base_url.as_str());
            if let Some(token) = auth_token {
                rest = rest.with_auth_token(token.as_str());
            }
            Arc::new(RestSink::new(rest)?)
        }
        SinkKind::Memory => Arc::new(MemorySink::new()),
    };
    info!(sink = sink.name(), "Sink opened");
    Ok(sink)
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::PathBuf;

    #[test]
    fn opens_memory_and_rocks_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ManagerConfig {
            data_dir: dir.path().to_path_buf(),
            sink: SinkKind::Memory,
            ..ManagerConfig::default()
        };
        assert_eq!(open_sink(&config).unwrap().name(), "memory");

        config.sink = SinkKind::Rocks;
        assert_eq!(open_sink(&config).unwrap().name(), "rocksdb");
        assert!(dir.path().join("sink").exists());
    }

    #[test]
    fn rest_sink_requires_url() {
        let config = ManagerConfig {
            sink: SinkKind::Rest {
                base_url: String::new(),
                auth_token: None,
            },
            ..ManagerConfig::default()
        };
        assert!(matches!(open_sink(&config), Err(Error::Sink(_))));
    }

    #[tokio::test]
    async fn missing_intersection_config_fails_start() {
        let config = ManagerConfig {
            intersections_path: PathBuf::from("/nonexistent/intersections-config.json"),
            sink: SinkKind::Memory,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            status_socket: None,
            ..ManagerConfig::default()
        };
        assert!(matches!(
            ManagerNode::start(config).await,
            Err(Error::Intersections(_))
        ));
    }

    #[tokio::test]
    async fn stops_on_shutdown_and_removes_status_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("run").join("status.sock");
        let config = ManagerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            data_dir: dir.path().to_path_buf(),
            sink: SinkKind::Memory,
            status_socket: Some(socket_path.clone()),
            ..ManagerConfig::default()
        };
        let registry = IntersectionRegistry::from_json_str(
            r#"{"intersections": [{"id": 2351, "phases": [2, 4, 6]}]}"#,
        )
        .unwrap();
        let sink = Arc::new(MemorySink::new());

        let node = ManagerNode::with_sink(config, registry, sink.clone())
            .await
            .unwrap();
        assert!(socket_path.exists());

        node.run_until(async {}).await.unwrap();
        assert!(!socket_path.exists());
        assert!(sink.is_closed());
    }
}
