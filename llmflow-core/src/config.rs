//! Configuration for the LLMFlow core.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment (`LLMFLOW_`-prefixed, `__`-separated nesting).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Research loop engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default iteration limit for interactive sessions.
    #[serde(default = "default_interactive_iterations")]
    pub interactive_max_iterations: u32,
    /// Default iteration limit for background jobs.
    #[serde(default = "default_background_iterations")]
    pub background_max_iterations: u32,
    /// Hard upper bound on any requested iteration limit.
    #[serde(default = "default_iterations_cap")]
    pub max_iterations_cap: u32,
    /// How many search hits per engine query are merged into findings.
    #[serde(default = "default_parse_top_results")]
    pub parse_top_results: usize,
}

/// Retention policy for registry records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Hours to keep terminal job records before cleanup removes them.
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,
    /// Seconds of inactivity after which terminal sessions are evicted.
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout_secs: u64,
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_interactive_iterations() -> u32 {
    10
}

fn default_background_iterations() -> u32 {
    30
}

fn default_iterations_cap() -> u32 {
    50
}

fn default_parse_top_results() -> usize {
    3
}

fn default_job_retention_hours() -> u64 {
    24
}

fn default_session_idle_timeout() -> u64 {
    3600
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interactive_max_iterations: default_interactive_iterations(),
            background_max_iterations: default_background_iterations(),
            max_iterations_cap: default_iterations_cap(),
            parse_top_results: default_parse_top_results(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_retention_hours: default_job_retention_hours(),
            session_idle_timeout_secs: default_session_idle_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl EngineConfig {
    /// Default iteration limit for the given mode.
    pub fn default_iterations(&self, mode: crate::task::TaskMode) -> u32 {
        match mode {
            crate::task::TaskMode::Interactive => self.interactive_max_iterations,
            crate::task::TaskMode::Background => self.background_max_iterations,
        }
    }
}

/// Load configuration with layering: defaults -> TOML file -> environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("LLMFLOW_").split("__"));

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskMode;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.engine.interactive_max_iterations, 10);
        assert_eq!(config.engine.background_max_iterations, 30);
        assert_eq!(config.engine.max_iterations_cap, 50);
        assert_eq!(config.retention.job_retention_hours, 24);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_default_iterations_by_mode() {
        let engine = EngineConfig::default();
        assert_eq!(engine.default_iterations(TaskMode::Interactive), 10);
        assert_eq!(engine.default_iterations(TaskMode::Background), 30);
    }

    #[test]
    fn test_load_config_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.engine.interactive_max_iterations, 10);
    }

    #[test]
    fn test_load_config_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llmflow.toml");
        std::fs::write(
            &path,
            "[engine]\nbackground_max_iterations = 40\n\n[server]\nport = 9000\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.engine.background_max_iterations, 40);
        assert_eq!(config.server.port, 9000);
        // Untouched sections keep defaults
        assert_eq!(config.engine.interactive_max_iterations, 10);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml).unwrap();
        assert_eq!(
            parsed.engine.max_iterations_cap,
            config.engine.max_iterations_cap
        );
    }
}
