use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_INTERVAL_DAYS;

pub const DEFAULT_RECOVERY_CONCURRENCY: usize = 8;
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5_000;
/// `{clan_id}` is replaced with the id of the clan the member expired from.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "Please verify yourself again for the clan: `{clan_id}`";

/// Top-level config (clanmanager.toml + CLANMANAGER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClanManagerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reverification: ReverificationConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Create the directory holding the database file if it is missing.
    pub fn ensure_parent_dir(&self) -> crate::error::Result<()> {
        if let Some(parent) = std::path::Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Reverification scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverificationConfig {
    /// Interval used when a clan enables the feature without naming one.
    #[serde(default = "default_interval_days")]
    pub default_interval_days: u16,
    /// How many clans are enumerated in parallel during startup recovery.
    #[serde(default = "default_recovery_concurrency")]
    pub recovery_concurrency: usize,
    /// Direct message sent to a member right before they are removed.
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

impl Default for ReverificationConfig {
    fn default() -> Self {
        Self {
            default_interval_days: DEFAULT_INTERVAL_DAYS,
            recovery_concurrency: DEFAULT_RECOVERY_CONCURRENCY,
            message_template: default_message_template(),
        }
    }
}

impl ReverificationConfig {
    pub fn render_message(&self, clan_id: crate::types::ClanId) -> String {
        self.message_template
            .replace("{clan_id}", &clan_id.to_string())
    }
}

/// Outbound notification settings. Without a webhook URL, expiry notices are
/// only written to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: DEFAULT_NOTIFY_TIMEOUT_MS,
        }
    }
}

fn default_interval_days() -> u16 {
    DEFAULT_INTERVAL_DAYS
}
fn default_recovery_concurrency() -> usize {
    DEFAULT_RECOVERY_CONCURRENCY
}
fn default_message_template() -> String {
    DEFAULT_MESSAGE_TEMPLATE.to_string()
}
fn default_notify_timeout_ms() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_MS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.clanmanager/clanmanager.db", home)
}

impl ClanManagerConfig {
    /// Load config from a TOML file with CLANMANAGER_* env var overrides.
    ///
    /// Falls back to ~/.clanmanager/clanmanager.toml when no path is given.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::ClanManagerError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CLANMANAGER_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.clanmanager/clanmanager.toml", home)
}
