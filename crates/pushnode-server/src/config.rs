//! Server configuration loaded from environment variables.
//!
//! Everything except the storage backend has a default. A node needs either
//! a database (`DB_PATH` or `DATA_PATH`) or a passphrase (`NODE_SECRET`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Name published in the node info document.
    /// Env: `NODE_NAME`
    /// Default: `"pushnode"`
    pub name: String,

    /// Public base URL published in the node info document.
    /// Env: `NODE_ENDPOINT`
    /// Default: `http://127.0.0.1:8080`
    pub endpoint: String,

    /// Operator passphrase. Derives the node key and, without a database,
    /// every user secret.
    /// Env: `NODE_SECRET`
    pub secret: Option<String>,

    /// Directory holding `pushnode.db` when `DB_PATH` is unset.
    /// Env: `DATA_PATH`
    pub data_path: Option<PathBuf>,

    /// Explicit SQLite database file.
    /// Env: `DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Whether unknown users may register.
    /// Env: `REGISTERABLE` (true/false)
    /// Default: `true`
    pub registerable: bool,

    /// Users admitted even when registration is closed.
    /// Env: `REGISTER_WHITELIST` (comma-separated uids)
    pub whitelist: Vec<String>,

    /// Relay that receives messages for serverless users.
    /// Env: `UPSTREAM_ENDPOINT`
    pub upstream_endpoint: Option<String>,

    /// APNs credentials; required to deliver to bound devices.
    pub apns: Option<ApnsConfig>,

    /// Timeout for outbound HTTP calls (APNs and upstream).
    /// Env: `HTTP_TIMEOUT_SECS`
    /// Default: `10`
    pub http_timeout: Duration,

    /// Content size limits applied to incoming messages.
    pub limits: ContentLimits,
}

/// APNs token-based authentication settings.
#[derive(Clone)]
pub struct ApnsConfig {
    /// PKCS#8 PEM file of the `.p8` signing key.
    /// Env: `APNS_KEY_PATH`
    pub key_path: PathBuf,
    /// Env: `APNS_KEY_ID`
    pub key_id: String,
    /// Env: `APNS_TEAM_ID`
    pub team_id: String,
    /// Env: `APNS_TOPIC`
    /// Default: `net.chanify.ios`
    pub topic: String,
}

/// Byte limits on message fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    /// Env: `MAX_TEXT_LEN`, default 4000.
    pub text: usize,
    pub title: usize,
    /// Env: `MAX_COPY_LEN`, default 1000.
    pub copy_text: usize,
    pub action: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            text: 4000,
            title: 256,
            copy_text: 1000,
            action: 1000,
        }
    }
}

pub const DEFAULT_APNS_TOPIC: &str = "net.chanify.ios";

/// Which [`pushnode_store::NodeStore`] backs the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite(PathBuf),
    Serverless,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            name: "pushnode".to_string(),
            endpoint: "http://127.0.0.1:8080".to_string(),
            secret: None,
            data_path: None,
            db_path: None,
            registerable: true,
            whitelist: Vec::new(),
            upstream_endpoint: None,
            apns: None,
            http_timeout: Duration::from_secs(10),
            limits: ContentLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(name) = var("NODE_NAME") {
            config.name = name;
        }
        if let Some(endpoint) = var("NODE_ENDPOINT") {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        config.secret = var("NODE_SECRET");
        config.data_path = var("DATA_PATH").map(PathBuf::from);
        config.db_path = var("DB_PATH").map(PathBuf::from);

        if let Some(val) = var("REGISTERABLE") {
            config.registerable = parse_bool(&val);
        }
        if let Some(list) = var("REGISTER_WHITELIST") {
            config.whitelist = list
                .split(',')
                .map(str::trim)
                .filter(|uid| !uid.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.upstream_endpoint =
            var("UPSTREAM_ENDPOINT").map(|e| e.trim_end_matches('/').to_string());

        if let Some(secs) = var("HTTP_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(n) if n > 0 => config.http_timeout = Duration::from_secs(n),
                _ => tracing::warn!(value = %secs, "Invalid HTTP_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(n) = var("MAX_TEXT_LEN").and_then(|v| v.parse().ok()) {
            config.limits.text = n;
        }
        if let Some(n) = var("MAX_COPY_LEN").and_then(|v| v.parse().ok()) {
            config.limits.copy_text = n;
        }

        match (var("APNS_KEY_PATH"), var("APNS_KEY_ID"), var("APNS_TEAM_ID")) {
            (Some(key_path), Some(key_id), Some(team_id)) => {
                config.apns = Some(ApnsConfig {
                    key_path: PathBuf::from(key_path),
                    key_id,
                    team_id,
                    topic: var("APNS_TOPIC").unwrap_or_else(|| DEFAULT_APNS_TOPIC.to_string()),
                });
            }
            (None, None, None) => {}
            _ => tracing::warn!(
                "APNS_KEY_PATH, APNS_KEY_ID and APNS_TEAM_ID must be set together; direct push disabled"
            ),
        }

        config
    }

    /// Pick the storage backend. An explicit database wins over a
    /// passphrase; `DATA_PATH` is the fallback location.
    pub fn store_kind(&self) -> Option<StoreKind> {
        if let Some(path) = &self.db_path {
            return Some(StoreKind::Sqlite(path.clone()));
        }
        if self.secret.is_some() {
            return Some(StoreKind::Serverless);
        }
        self.data_path
            .as_ref()
            .map(|dir| StoreKind::Sqlite(dir.join("pushnode.db")))
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("data_path", &self.data_path)
            .field("db_path", &self.db_path)
            .field("registerable", &self.registerable)
            .field("whitelist", &self.whitelist.len())
            .field("upstream_endpoint", &self.upstream_endpoint)
            .field("apns", &self.apns.as_ref().map(|a| &a.key_id))
            .field("http_timeout", &self.http_timeout)
            .field("limits", &self.limits)
            .finish()
    }
}

fn parse_bool(val: &str) -> bool {
    !matches!(val.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off")
}
