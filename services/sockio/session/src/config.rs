//! Client configuration and dial target construction.

use crate::ClientError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default outbound queue capacity
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 128;

/// Default bound on waiting for outbound queue space
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol generation spoken by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// Engine revision 3
    #[default]
    V2,
    /// Engine revision 4
    V3,
}

impl ProtocolVersion {
    /// Value of the `EIO` query parameter
    pub fn engine_code(self) -> &'static str {
        match self {
            ProtocolVersion::V2 => "3",
            ProtocolVersion::V3 => "4",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V2 => f.write_str("v2"),
            ProtocolVersion::V3 => f.write_str("v3"),
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v2" | "2" => Ok(ProtocolVersion::V2),
            "v3" | "3" => Ok(ProtocolVersion::V3),
            other => Err(format!("unknown protocol version: {}", other)),
        }
    }
}

/// Configuration for a client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Protocol version (v2/v3)
    pub version: ProtocolVersion,
    /// Server URL, e.g. `http://localhost:3000`
    pub host: String,
    /// Endpoint path, e.g. `socket.io`
    pub path: String,
    /// Reconnect automatically after faults
    pub reconnect: bool,
    /// Maximum consecutive reconnect attempts (0 = unbounded)
    pub reconnect_attempts: u32,
    /// Base reconnect delay, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
    /// Bound on the handshake wait; replaced by the server ping timeout once connected
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Outbound queue capacity
    pub outbound_capacity: usize,
    /// How long an emit waits for queue space
    #[serde(with = "humantime_serde")]
    pub enqueue_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::V2,
            host: String::new(),
            path: String::new(),
            reconnect: true,
            reconnect_attempts: 0,
            reconnect_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(20),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `host` with default settings
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Build the websocket URL dialed for every connect attempt.
    ///
    /// `ws(s)://<host>[/<path>]/?EIO=<code>&transport=websocket`
    pub fn handshake_url(&self) -> Result<String, ClientError> {
        if self.host.trim().is_empty() {
            return Err(ClientError::EmptyHost);
        }

        let url = Url::parse(&self.host)
            .map_err(|e| ClientError::InvalidHost(format!("{}: {}", self.host, e)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ClientError::InvalidHost(format!(
                    "unsupported scheme {:?} in {}",
                    other, self.host
                )))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidHost(format!("no host in {}", self.host)))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let query = format!("EIO={}&transport=websocket", self.version.engine_code());
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            Ok(format!("{}://{}/?{}", scheme, authority, query))
        } else {
            Ok(format!("{}://{}/{}/?{}", scheme, authority, path, query))
        }
    }
}
