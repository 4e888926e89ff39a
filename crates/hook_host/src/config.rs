//! Configuration for the standalone hook host.
//!
//! Loaded from TOML. A missing file is created with the defaults.

use anyhow::{bail, Context};
use hook_dispatch::ChatTriggers;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat trigger prefixes
    #[serde(default)]
    pub chat: ChatTriggers,
    /// Loopback engine contents
    #[serde(default)]
    pub engine: EngineSettings,
    /// Plugin loading settings
    pub plugins: PluginSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// What the loopback engine knows about at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Game event names plugins may hook
    pub game_events: Vec<String>,
    /// Console variable names, which block commands of the same name
    pub convars: Vec<String>,
    /// Admin flag bits by client slot
    pub admins: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Directory scanned for plugin libraries
    pub directory: String,
    /// Load every plugin in the directory on startup
    pub auto_load: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Output logs as JSON
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chat: ChatTriggers::default(),
            engine: EngineSettings {
                game_events: ["player_connect", "player_death", "round_start", "round_end"]
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
                convars: Vec::new(),
                admins: HashMap::new(),
            },
            plugins: PluginSettings {
                directory: "plugins".to_string(),
                auto_load: true,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads the configuration, writing the defaults to `path` if it does
    /// not exist yet.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Err(e) = self.chat.validate() {
            bail!("Invalid [chat] section: {}", e);
        }

        if self.plugins.directory.is_empty() {
            bail!("Plugin directory cannot be empty");
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                VALID_LOG_LEVELS
            );
        }

        for slot in self.engine.admins.keys() {
            if slot.parse::<i32>().is_err() {
                bail!("Admin key {} is not a client slot", slot);
            }
        }

        Ok(())
    }

    /// Admin flags keyed by caller id (slot + 1).
    pub fn admin_callers(&self) -> Vec<(i32, u64)> {
        self.engine
            .admins
            .iter()
            .filter_map(|(slot, flags)| slot.parse::<i32>().ok().map(|slot| (slot + 1, *flags)))
            .collect()
    }
}
