use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::models::{SharedObject, UserId};

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [hub]
//                    outbound_queue_capacity = 64
//
//   env var:         BOARD_HUB__OUTBOUND_QUEUE_CAPACITY=64   (double underscore = nesting)
//
//   CLI flag:        --port / --host / --base-path override [server]

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub hub: HubFileConfig,
    /// Seed users for the in-memory directory
    #[serde(default)]
    pub users: Vec<UserSeed>,
    /// Seed boards for the in-memory directory
    #[serde(default)]
    pub boards: Vec<BoardSeed>,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// URL prefix every route is mounted under, e.g. `/api/v1`
    #[serde(default)]
    pub base_path: Option<String>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: None,
        }
    }
}

/// Registry and session tunables (lives under `[hub]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubFileConfig {
    /// Frames buffered per session before it counts as a slow consumer
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Commands buffered in front of the registry loop
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    /// How long a closing session waits for its writer to flush
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl Default for HubFileConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_outbound_queue_capacity(),
            command_capacity: default_command_capacity(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

/// A user the in-memory directory can resolve from a token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserSeed {
    pub id: UserId,
    pub name: String,
    pub token: String,
}

/// A board the in-memory directory knows about.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoardSeed {
    pub id: String,
    #[serde(default)]
    pub members: Vec<UserId>,
    #[serde(default)]
    pub objects: Vec<SharedObject>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_outbound_queue_capacity() -> usize {
    256
}
fn default_command_capacity() -> usize {
    1024
}
fn default_close_grace_ms() -> u64 {
    5000
}

/// Build a figment that layers: defaults → config.toml → BOARD_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `BOARD_SERVER__PORT=9000`  →  `server.port = 9000`
///   `BOARD_HUB__CLOSE_GRACE_MS=100`  →  `hub.close_grace_ms = 100`
pub fn load_config(config_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("BOARD_").split("__"))
}

/// Command-line overrides for `[server]`, applied after figment.
#[derive(Clone, Debug, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_path: Option<String>,
}

impl ServerOverrides {
    pub fn apply(self, fc: &mut ServerFileConfig) {
        if let Some(host) = self.host {
            fc.host = host;
        }
        if let Some(port) = self.port {
            fc.port = port;
        }
        if self.base_path.is_some() {
            fc.base_path = self.base_path;
        }
    }
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Listener configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Normalized route prefix: empty, or `/segment[/segment...]`
    pub base_path: String,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone(),
            port: fc.port,
            base_path: normalize_base_path(fc.base_path.as_deref()),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// Registry/session configuration (runtime view).
#[derive(Clone, Debug)]
pub struct HubConfig {
    pub outbound_queue_capacity: usize,
    pub command_capacity: usize,
    pub close_grace: Duration,
}

impl HubConfig {
    pub fn from_file(fc: &HubFileConfig) -> Self {
        Self {
            // tokio channels panic on zero capacity
            outbound_queue_capacity: fc.outbound_queue_capacity.max(1),
            command_capacity: fc.command_capacity.max(1),
            close_grace: Duration::from_millis(fc.close_grace_ms),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from_file(&HubFileConfig::default())
    }
}

/// Normalize a user-supplied URL prefix: leading slash, no trailing slash,
/// and `/` or empty collapse to no prefix.
pub fn normalize_base_path(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or("").trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

// =============================================================================
// Directory layout config (not tunable via figment; derived from --config-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct BoardSyncConfig {
    pub config_dir: PathBuf,
}

impl BoardSyncConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("Could not determine the user config directory; pass --config-dir")?
                .join("board-sync"),
        };

        info!("Config directory: {}", config_dir.display());

        Ok(Self { config_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Extract the layered file config for this directory.
    pub fn load(&self) -> Result<FileConfig> {
        load_config(&self.config_dir)
            .extract()
            .with_context(|| format!("Failed to load {}", self.config_toml_path().display()))
    }
}
