use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Result, WorkerError};

/// Root segment of every topic the worker publishes or subscribes to.
pub const TOPIC_NAMESPACE: &str = "mqworker";

const DEFAULT_PLAIN_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;

/// A single MQTT broker endpoint.
///
/// Accepted forms: `tcp://host[:port]`, `mqtt://host[:port]`,
/// `ssl://`, `tls://` and `mqtts://` (TLS), or a bare `host:port`
/// which is treated as plain TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddr {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| WorkerError::InvalidBroker {
            addr: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        let normalized = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("tcp://{}", trimmed)
        };

        let url = Url::parse(&normalized).map_err(|e| invalid(&e.to_string()))?;

        let tls = match url.scheme() {
            "tcp" | "mqtt" => false,
            "ssl" | "tls" | "mqtts" => true,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        let port = url.port().unwrap_or(if tls {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PLAIN_PORT
        });

        Ok(Self { host, port, tls })
    }
}

impl std::fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.tls { "ssl" } else { "tcp" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Runtime configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stable identity of this worker, used as the second topic segment.
    pub identifier: String,
    /// Brokers tried in order; the session rotates to the next on failure.
    pub brokers: Vec<BrokerAddr>,
    /// Directory that receives scripts fetched over HTTP(S).
    pub script_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub keep_alive: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
            brokers: Vec::new(),
            script_dir: std::env::temp_dir().join(TOPIC_NAMESPACE),
            fetch_timeout: Duration::from_secs(60),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn new(identifier: impl Into<String>, brokers: Vec<BrokerAddr>) -> Self {
        Self {
            identifier: identifier.into(),
            brokers,
            ..Default::default()
        }
    }

    /// Check the configuration before any connection attempt.
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(WorkerError::NoBrokers);
        }
        if self.identifier.is_empty() || self.identifier.contains(['+', '#']) {
            return Err(WorkerError::InvalidIdentifier(self.identifier.clone()));
        }
        Ok(())
    }

    /// MQTT client id derived from the worker identifier.
    pub fn client_id(&self) -> String {
        format!("{}-{}", TOPIC_NAMESPACE, self.identifier)
    }
}

/// Host name of the machine, or the namespace if it cannot be read.
pub fn default_identifier() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| TOPIC_NAMESPACE.to_string())
}
