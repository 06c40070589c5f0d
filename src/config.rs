//! Engine configuration.
//!
//! Tunables for the session engine plus the agent command table, with
//! JSON persistence under the platform config directory. Missing keys
//! fall back to defaults so old config files keep working.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::inactivity::InactivitySettings;
use crate::session::types::CommandResolver;

fn default_idle_threshold() -> f64 {
    5.0
}

fn default_input_grace() -> f64 {
    5.0
}

fn default_tick_interval() -> f64 {
    1.0
}

fn default_rows() -> u16 {
    30
}

fn default_cols() -> u16 {
    120
}

fn default_agent() -> String {
    "claude".to_string()
}

fn default_agents() -> HashMap<String, String> {
    HashMap::from([("claude".to_string(), "claude".to_string())])
}

/// Main configuration struct for the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds of output silence before an armed session counts as idle.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: f64,
    /// Seconds since the last keystroke during which idle firing is
    /// deferred. Shares a default with the threshold but is tuned
    /// independently.
    #[serde(default = "default_input_grace")]
    pub input_grace_secs: f64,
    /// Interval of the idle-check tick.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: f64,
    /// Initial terminal dimensions for new sessions.
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Agent used when the caller does not name one.
    #[serde(default = "default_agent")]
    pub default_agent: String,
    /// Agent id -> shell command to run in the worktree.
    #[serde(default = "default_agents")]
    pub agents: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold(),
            input_grace_secs: default_input_grace(),
            tick_interval_secs: default_tick_interval(),
            rows: default_rows(),
            cols: default_cols(),
            default_agent: default_agent(),
            agents: default_agents(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from disk, or return default if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Could not determine config directory")?;
        Ok(base.join("agentterm").join("settings.json"))
    }

    pub fn inactivity(&self) -> InactivitySettings {
        InactivitySettings {
            idle_threshold: Duration::from_secs_f64(self.idle_threshold_secs),
            input_grace: Duration::from_secs_f64(self.input_grace_secs),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs)
    }
}

impl CommandResolver for EngineConfig {
    fn resolve(&self, _working_dir: &Path, agent: &str) -> Result<String> {
        let agent = if agent.is_empty() {
            self.default_agent.as_str()
        } else {
            agent
        };
        match self.agents.get(agent) {
            Some(command) => Ok(command.clone()),
            None => bail!("No command configured for agent '{agent}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.idle_threshold_secs, 5.0);
        assert_eq!(config.input_grace_secs, 5.0);
        assert_eq!(config.rows, 30);
        assert_eq!(config.cols, 120);
        assert_eq!(config.default_agent, "claude");
    }

    #[test]
    fn test_resolve_agent_commands() {
        let mut config = EngineConfig::default();
        config
            .agents
            .insert("aider".to_string(), "aider --no-auto-commits".to_string());

        let dir = Path::new("/tmp");
        assert_eq!(config.resolve(dir, "").unwrap(), "claude");
        assert_eq!(config.resolve(dir, "claude").unwrap(), "claude");
        assert_eq!(
            config.resolve(dir, "aider").unwrap(),
            "aider --no-auto-commits"
        );
        assert!(config.resolve(dir, "unknown").is_err());
    }

    #[test]
    fn test_round_trip_and_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut config = EngineConfig::default();
        config.idle_threshold_secs = 2.5;
        config.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.idle_threshold_secs, 2.5);
        assert_eq!(loaded.cols, 120);

        // A sparse config file keeps working via defaults.
        fs::write(&path, "{\"rows\": 40}").unwrap();
        let sparse = EngineConfig::load_from(&path).unwrap();
        assert_eq!(sparse.rows, 40);
        assert_eq!(sparse.input_grace_secs, 5.0);
        assert_eq!(sparse.agents.get("claude").map(String::as_str), Some("claude"));
    }
}
