//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars.
//!
//! Config lives at `~/.confab/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfabConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub timing: TimingTable,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BackendConfig {
    pub rest_url: Option<String>,
    pub socket_url: Option<String>,
    pub api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FeatureConfig {
    pub reactions: Option<bool>,
    pub editing: Option<bool>,
    pub attachments: Option<bool>,
    pub voice: Option<bool>,
    pub read_receipts: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TimingTable {
    pub typing_quiet_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub error_display_ms: Option<u64>,
    pub reconnect_base_ms: Option<u64>,
    pub reconnect_cap_ms: Option<u64>,
    pub group_gap_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Concurrent realtime links kept open before the oldest idle one is
    /// evicted.
    pub max_links: Option<usize>,
    /// Citations shown per message before the overflow count kicks in.
    pub source_display: Option<usize>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_REST_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:8080/ws";
pub const DEFAULT_TYPING_QUIET_MS: u64 = 1_000;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 12_000;
pub const DEFAULT_ERROR_DISPLAY_MS: u64 = 5_000;
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 500;
pub const DEFAULT_RECONNECT_CAP_MS: u64 = 8_000;
pub const DEFAULT_GROUP_GAP_SECS: u64 = 300;
pub const DEFAULT_MAX_LINKS: usize = 4;
pub const DEFAULT_SOURCE_DISPLAY: usize = 3;

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

/// Time windows the store's reducer sweeps against. All virtual-clock
/// friendly: callers pass `now` explicitly, nothing here reads the wall
/// clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Typing indicator lifetime without a fresh signal.
    pub typing_quiet: Duration,
    /// Bounded wait for a send acknowledgement before it fails.
    pub send_timeout: Duration,
    /// How long the error banner stays up before auto-clearing.
    pub error_display: Duration,
    /// Gap between consecutive messages that breaks a sender group.
    pub group_gap: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            typing_quiet: Duration::milliseconds(DEFAULT_TYPING_QUIET_MS as i64),
            send_timeout: Duration::milliseconds(DEFAULT_SEND_TIMEOUT_MS as i64),
            error_display: Duration::milliseconds(DEFAULT_ERROR_DISPLAY_MS as i64),
            group_gap: Duration::seconds(DEFAULT_GROUP_GAP_SECS as i64),
        }
    }
}

/// Capability switches handed to the embedding surface at mount. The store
/// never branches on these; they only gate which affordances are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub reactions: bool,
    pub editing: bool,
    pub attachments: bool,
    pub voice: bool,
    pub read_receipts: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            reactions: true,
            editing: true,
            attachments: false,
            voice: false,
            read_receipts: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub rest_url: String,
    pub socket_url: String,
    pub api_token: Option<String>,
    pub features: FeatureFlags,
    pub timing: TimingConfig,
    pub reconnect_base: StdDuration,
    pub reconnect_cap: StdDuration,
    pub max_links: usize,
    pub source_display: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        resolve(&ConfabConfig::default())
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.confab/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".confab").join("config.toml"))
}

/// Load config from `~/.confab/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `ConfabConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<ConfabConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(ConfabConfig::default());
        }
    };

    if !path.exists() {
        info!(
            "No config file found, generating default at {}",
            path.display()
        );
        generate_default_config(&path);
        return Ok(ConfabConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config: ConfabConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &PathBuf) {
    let default_content = r#"# Confab Configuration
# All settings are optional, defaults are used for anything not specified.
# Override hierarchy: defaults -> this file -> env vars.

# [backend]
# rest_url = "http://localhost:8080/api"    # Or set CONFAB_REST_URL
# socket_url = "ws://localhost:8080/ws"     # Or set CONFAB_SOCKET_URL
# api_token = "cfb-..."                     # Or set CONFAB_API_TOKEN

# [features]
# reactions = true
# editing = true
# attachments = false
# voice = false
# read_receipts = true

# [timing]
# typing_quiet_ms = 1000      # typing indicator lifetime without a signal
# send_timeout_ms = 12000     # wait for a send ack before marking it failed
# error_display_ms = 5000     # error banner auto-clear
# reconnect_base_ms = 500     # first reconnect delay, doubles per attempt
# reconnect_cap_ms = 8000     # reconnect delay ceiling
# group_gap_secs = 300        # time gap that breaks a message group

# [limits]
# max_links = 4               # concurrent realtime connections kept open
# source_display = 3          # citations shown before "+N more"
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars.
pub fn resolve(config: &ConfabConfig) -> ResolvedConfig {
    // Backend endpoints: env → config → default
    let rest_url = std::env::var("CONFAB_REST_URL")
        .ok()
        .or_else(|| config.backend.rest_url.clone())
        .unwrap_or_else(|| DEFAULT_REST_URL.to_string());

    let socket_url = std::env::var("CONFAB_SOCKET_URL")
        .ok()
        .or_else(|| config.backend.socket_url.clone())
        .unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string());

    // API token: env → config. Absence is legal; the composer disables
    // itself when no credentials are present.
    let api_token = std::env::var("CONFAB_API_TOKEN")
        .ok()
        .or_else(|| config.backend.api_token.clone());

    let defaults = FeatureFlags::default();
    let features = FeatureFlags {
        reactions: config.features.reactions.unwrap_or(defaults.reactions),
        editing: config.features.editing.unwrap_or(defaults.editing),
        attachments: config.features.attachments.unwrap_or(defaults.attachments),
        voice: config.features.voice.unwrap_or(defaults.voice),
        read_receipts: config
            .features
            .read_receipts
            .unwrap_or(defaults.read_receipts),
    };

    let timing = TimingConfig {
        typing_quiet: Duration::milliseconds(
            config.timing.typing_quiet_ms.unwrap_or(DEFAULT_TYPING_QUIET_MS) as i64,
        ),
        send_timeout: Duration::milliseconds(
            config.timing.send_timeout_ms.unwrap_or(DEFAULT_SEND_TIMEOUT_MS) as i64,
        ),
        error_display: Duration::milliseconds(
            config.timing.error_display_ms.unwrap_or(DEFAULT_ERROR_DISPLAY_MS) as i64,
        ),
        group_gap: Duration::seconds(
            config.timing.group_gap_secs.unwrap_or(DEFAULT_GROUP_GAP_SECS) as i64,
        ),
    };

    ResolvedConfig {
        rest_url,
        socket_url,
        api_token,
        features,
        timing,
        reconnect_base: StdDuration::from_millis(
            config
                .timing
                .reconnect_base_ms
                .unwrap_or(DEFAULT_RECONNECT_BASE_MS),
        ),
        reconnect_cap: StdDuration::from_millis(
            config
                .timing
                .reconnect_cap_ms
                .unwrap_or(DEFAULT_RECONNECT_CAP_MS),
        ),
        max_links: config.limits.max_links.unwrap_or(DEFAULT_MAX_LINKS).max(1),
        source_display: config
            .limits
            .source_display
            .unwrap_or(DEFAULT_SOURCE_DISPLAY)
            .max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = ConfabConfig::default();
        assert!(config.backend.rest_url.is_none());
        assert!(config.features.reactions.is_none());
        assert!(config.limits.max_links.is_none());
    }

    #[test]
    fn test_resolve_uses_defaults_when_empty() {
        let resolved = resolve(&ConfabConfig::default());
        assert_eq!(resolved.rest_url, DEFAULT_REST_URL);
        assert_eq!(resolved.socket_url, DEFAULT_SOCKET_URL);
        assert_eq!(
            resolved.timing.typing_quiet,
            Duration::milliseconds(DEFAULT_TYPING_QUIET_MS as i64)
        );
        assert_eq!(
            resolved.reconnect_base,
            StdDuration::from_millis(DEFAULT_RECONNECT_BASE_MS)
        );
        assert_eq!(resolved.max_links, DEFAULT_MAX_LINKS);
        assert!(resolved.features.editing);
        assert!(!resolved.features.voice);
    }

    #[test]
    fn test_resolve_config_values_override_defaults() {
        let config = ConfabConfig {
            backend: BackendConfig {
                rest_url: Some("https://chat.example.com/api".to_string()),
                socket_url: Some("wss://chat.example.com/ws".to_string()),
                api_token: Some("cfb-test".to_string()),
            },
            timing: TimingTable {
                typing_quiet_ms: Some(2_000),
                send_timeout_ms: Some(6_000),
                ..Default::default()
            },
            limits: LimitsConfig {
                max_links: Some(2),
                source_display: Some(5),
            },
            ..Default::default()
        };
        let resolved = resolve(&config);
        assert_eq!(resolved.rest_url, "https://chat.example.com/api");
        assert_eq!(resolved.api_token.as_deref(), Some("cfb-test"));
        assert_eq!(resolved.timing.typing_quiet, Duration::milliseconds(2_000));
        assert_eq!(resolved.timing.send_timeout, Duration::milliseconds(6_000));
        assert_eq!(
            resolved.timing.error_display,
            Duration::milliseconds(DEFAULT_ERROR_DISPLAY_MS as i64)
        );
        assert_eq!(resolved.max_links, 2);
        assert_eq!(resolved.source_display, 5);
    }

    #[test]
    fn test_resolve_feature_overrides() {
        let config = ConfabConfig {
            features: FeatureConfig {
                editing: Some(false),
                voice: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let resolved = resolve(&config);
        assert!(!resolved.features.editing);
        assert!(resolved.features.voice);
        // Untouched flags keep their defaults.
        assert!(resolved.features.reactions);
    }

    #[test]
    fn test_resolve_clamps_degenerate_limits() {
        let config = ConfabConfig {
            limits: LimitsConfig {
                max_links: Some(0),
                source_display: Some(0),
            },
            ..Default::default()
        };
        let resolved = resolve(&config);
        assert_eq!(resolved.max_links, 1);
        assert_eq!(resolved.source_display, 1);
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
[backend]
rest_url = "https://chat.internal/api"
api_token = "cfb-abc"

[features]
reactions = false

[timing]
typing_quiet_ms = 1500
group_gap_secs = 120

[limits]
max_links = 8
"#;
        let config: ConfabConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.backend.rest_url.as_deref(),
            Some("https://chat.internal/api")
        );
        assert_eq!(config.backend.socket_url, None);
        assert_eq!(config.features.reactions, Some(false));
        assert_eq!(config.timing.typing_quiet_ms, Some(1_500));
        assert_eq!(config.timing.group_gap_secs, Some(120));
        assert_eq!(config.limits.max_links, Some(8));
    }

    #[test]
    fn test_sparse_toml_parses() {
        // Only override one thing, everything else stays default
        let toml_str = r#"
[timing]
send_timeout_ms = 3000
"#;
        let config: ConfabConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timing.send_timeout_ms, Some(3_000));
        assert!(config.backend.rest_url.is_none());
        assert!(config.limits.source_display.is_none());
    }
}
