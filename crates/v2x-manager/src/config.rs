//! Process configuration.
//!
//! Resolved once at startup from `V2X_*` environment variables, optionally
//! layered with a master config file that supplies the UDP host and port.

use crate::error::{Error, Result};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use v2x_sink::{PublisherConfig, RetryPolicy};

/// Default UDP bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:20004";

/// Default intersection configuration path.
pub const DEFAULT_INTERSECTIONS: &str = "intersections-config.json";

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "./v2x-data";

/// Status socket value that disables the endpoint.
const SOCKET_OFF: &str = "off";

/// Which sink backend receives published records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkKind {
    /// RocksDB under `data_dir`
    Rocks,
    /// Remote key-path REST store
    Rest {
        base_url: String,
        auth_token: Option<String>,
    },
    /// In-process map (dry run)
    Memory,
}

/// Configuration for a data manager node.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// UDP listen address
    pub bind_addr: SocketAddr,

    /// Intersection configuration document
    pub intersections_path: PathBuf,

    /// Data directory for the local sink and status socket
    pub data_dir: PathBuf,

    /// Sink backend
    pub sink: SinkKind,

    /// Publication queue and retry settings
    pub publisher: PublisherConfig,

    /// Status socket path, `None` when disabled
    pub status_socket: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 20004)),
            intersections_path: PathBuf::from(DEFAULT_INTERSECTIONS),
            status_socket: Some(data_dir.join("status.sock")),
            data_dir,
            sink: SinkKind::Rocks,
            publisher: PublisherConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(var("V2X_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));

        let bind_addr = match var("V2X_MASTER_CONFIG") {
            Some(path) => bind_addr_from_master(Path::new(&path))?,
            None => {
                let raw = var("V2X_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
                raw.trim()
                    .parse()
                    .map_err(|e| Error::Config(format!("invalid V2X_BIND_ADDR {raw:?}: {e}")))?
            }
        };

        let intersections_path =
            PathBuf::from(var("V2X_INTERSECTIONS").unwrap_or_else(|| DEFAULT_INTERSECTIONS.into()));

        let sink = match var("V2X_SINK").as_deref().map(str::trim) {
            None | Some("rocks") => SinkKind::Rocks,
            Some("memory") => SinkKind::Memory,
            Some("rest") => SinkKind::Rest {
                base_url: var("V2X_REST_URL")
                    .ok_or_else(|| Error::Config("V2X_SINK=rest requires V2X_REST_URL".into()))?,
                auth_token: var("V2X_REST_AUTH"),
            },
            Some(other) => {
                return Err(Error::Config(format!(
                    "unknown V2X_SINK {other:?} (expected rocks, rest or memory)"
                )))
            }
        };

        let defaults = PublisherConfig::default();
        let capacity = parse_number(&var, "V2X_PUBLISH_QUEUE", defaults.capacity as u64)?;
        if capacity == 0 {
            return Err(Error::Config("V2X_PUBLISH_QUEUE must be at least 1".into()));
        }
        let enqueue_timeout = Duration::from_millis(parse_number(
            &var,
            "V2X_PUBLISH_TIMEOUT_MS",
            defaults.enqueue_timeout.as_millis() as u64,
        )?);
        let retry = RetryPolicy {
            max_retries: parse_number(
                &var,
                "V2X_SINK_RETRIES",
                u64::from(defaults.retry.max_retries),
            )?
            .try_into()
            .map_err(|_| Error::Config("V2X_SINK_RETRIES out of range".into()))?,
            initial_backoff: Duration::from_millis(parse_number(
                &var,
                "V2X_SINK_BACKOFF_MS",
                defaults.retry.initial_backoff.as_millis() as u64,
            )?),
            ..defaults.retry
        };

        let status_socket = match var("V2X_STATUS_SOCKET") {
            Some(v) if v.trim().eq_ignore_ascii_case(SOCKET_OFF) => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(data_dir.join("status.sock")),
        };

        Ok(Self {
            bind_addr,
            intersections_path,
            data_dir,
            sink,
            publisher: PublisherConfig {
                capacity: capacity as usize,
                enqueue_timeout,
                retry,
            },
            status_socket,
        })
    }
}

fn parse_number<F>(var: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {key} {raw:?}: {e}"))),
        None => Ok(default),
    }
}

/// Read `IPAddress.HostIp` and `PortNumber.V2XDataManager` from a master
/// config file.
pub fn bind_addr_from_master(path: &Path) -> Result<SocketAddr> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read master config {}: {e}", path.display())))?;
    let doc: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("malformed master config {}: {e}", path.display())))?;
    master_bind_addr(&doc)
}

fn master_bind_addr(doc: &Value) -> Result<SocketAddr> {
    let host = doc
        .pointer("/IPAddress/HostIp")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Config("master config lacks IPAddress.HostIp".into()))?;
    let ip: IpAddr = host
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid HostIp {host:?}: {e}")))?;

    let port = match doc.pointer("/PortNumber/V2XDataManager") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .and_then(|p| u16::try_from(p).ok())
    .ok_or_else(|| Error::Config("master config lacks a valid PortNumber.V2XDataManager".into()))?;

    Ok(SocketAddr::new(ip, port))
}
