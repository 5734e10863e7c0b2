//! Server configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `DUELD_*` environment variables. Command-line flags are applied on top by
//! the binary.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DUELD_";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub bind_addr: SocketAddr,
    /// Base URL of the reference-data service; None = placeholder catalog
    pub catalog_url: Option<String>,
    /// How long the matchmaker waits for a second participant
    pub match_timeout_ms: u64,
    /// Presentation pause between resolution phases
    pub phase_pacing_ms: u64,
    /// Delay before a bot attacks or rolls saves
    pub bot_delay_ms: u64,
    /// Disconnected room players forfeit after this long
    pub disconnect_grace_secs: u64,
    /// TTL of cached faction and unit lists
    pub catalog_cache_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8081)),
            catalog_url: None,
            match_timeout_ms: 1200,
            phase_pacing_ms: 1600,
            bot_delay_ms: 1500,
            disconnect_grace_secs: 120,
            catalog_cache_secs: 300,
        }
    }
}

impl Config {
    /// Provider chain, optionally including a TOML file
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration from all layers
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Configuration for tests: ephemeral port, no pacing, short timers
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            match_timeout_ms: 100,
            phase_pacing_ms: 0,
            bot_delay_ms: 10,
            disconnect_grace_secs: 1,
            ..Self::default()
        }
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_timeout_ms)
    }

    pub fn phase_pacing(&self) -> Duration {
        Duration::from_millis(self.phase_pacing_ms)
    }

    pub fn bot_delay(&self) -> Duration {
        Duration::from_millis(self.bot_delay_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_cache_secs)
    }
}
