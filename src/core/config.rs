use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MCP_URL: &str = "http://localhost:8000/mcp";

pub const DEFAULT_MAX_STEPS_PER_TURN: usize = 5;
pub const DEFAULT_SUMMARIZE_THRESHOLD: usize = 20;
pub const DEFAULT_KEEP_WINDOW: usize = 6;
pub const DEFAULT_HISTORY_HARD_CAP: usize = 40;

/// A keyword that, when present in user text, records a preference entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PreferenceTrigger {
    pub word: String,
    pub key: String,
}

fn default_preference_triggers() -> Vec<PreferenceTrigger> {
    vec![
        PreferenceTrigger {
            word: "urgent".to_string(),
            key: "prefers_urgent".to_string(),
        },
        PreferenceTrigger {
            word: "asap".to_string(),
            key: "prefers_urgent".to_string(),
        },
        PreferenceTrigger {
            word: "fragile".to_string(),
            key: "handles_fragile".to_string(),
        },
    ]
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS_PER_TURN
}

fn default_summarize_threshold() -> usize {
    DEFAULT_SUMMARIZE_THRESHOLD
}

fn default_keep_window() -> usize {
    DEFAULT_KEEP_WINDOW
}

fn default_history_hard_cap() -> usize {
    DEFAULT_HISTORY_HARD_CAP
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Model identifier sent to the chat-completions endpoint.
    pub model: Option<String>,
    /// Base URL of the model provider (OpenAI-compatible).
    pub model_base_url: Option<String>,
    /// URL of the MCP tool server.
    pub mcp_url: Option<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps_per_turn: usize,
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,
    #[serde(default = "default_keep_window")]
    pub keep_window: usize,
    #[serde(default = "default_history_hard_cap")]
    pub history_hard_cap: usize,
    #[serde(default = "default_preference_triggers")]
    pub preference_triggers: Vec<PreferenceTrigger>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: None,
            model_base_url: None,
            mcp_url: None,
            max_steps_per_turn: default_max_steps(),
            summarize_threshold: default_summarize_threshold(),
            keep_window: default_keep_window(),
            history_hard_cap: default_history_hard_cap(),
            preference_triggers: default_preference_triggers(),
        }
    }
}

/// Bounds applied by session bookkeeping and plan execution.
#[derive(Debug, Clone, Copy)]
pub struct TurnLimits {
    pub max_steps_per_turn: usize,
    pub summarize_threshold: usize,
    pub keep_window: usize,
    pub history_hard_cap: usize,
}

/// Fully resolved runtime settings: config file values with defaults filled
/// in. Environment variables and CLI flags are layered on afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub model_base_url: String,
    pub model_api_key: Option<String>,
    pub mcp_url: String,
    pub mcp_api_key: Option<String>,
    pub limits: TurnLimits,
    pub preference_triggers: Vec<PreferenceTrigger>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    fn get_config_path() -> PathBuf {
        let proj_dirs =
            ProjectDirs::from("org", "dray", "dray").expect("Failed to determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }

    /// Resolve the config into runtime settings, filling unset fields with
    /// baked-in defaults. Pure: environment is applied by
    /// [`Settings::apply_env`].
    pub fn into_settings(self) -> Settings {
        Settings {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            model_base_url: self
                .model_base_url
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string()),
            model_api_key: None,
            mcp_url: self.mcp_url.unwrap_or_else(|| DEFAULT_MCP_URL.to_string()),
            mcp_api_key: None,
            limits: TurnLimits {
                max_steps_per_turn: self.max_steps_per_turn,
                summarize_threshold: self.summarize_threshold,
                keep_window: self.keep_window,
                history_hard_cap: self.history_hard_cap,
            },
            preference_triggers: self.preference_triggers,
        }
    }
}

impl Settings {
    /// Layer environment variables over the config file values.
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("DRAY_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.is_empty() {
                self.model_base_url = base_url;
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.model_api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("DRAY_MCP_URL") {
            if !url.is_empty() {
                self.mcp_url = url;
            }
        }
        if let Ok(key) = std::env::var("DRAY_MCP_API_KEY") {
            if !key.is_empty() {
                self.mcp_api_key = Some(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_config_yields_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("nonexistent_config.toml");

        let config = Config::load_from_path(&config_path).expect("Failed to load config");

        assert_eq!(config.model, None);
        assert_eq!(config.max_steps_per_turn, DEFAULT_MAX_STEPS_PER_TURN);
        assert_eq!(config.preference_triggers, default_preference_triggers());
    }

    #[test]
    fn saved_config_round_trips() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");

        let config = Config {
            model: Some("gpt-4o".to_string()),
            mcp_url: Some("https://fleet.example.com/mcp".to_string()),
            max_steps_per_turn: 3,
            ..Default::default()
        };
        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config");

        let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(loaded.model, Some("gpt-4o".to_string()));
        assert_eq!(loaded.mcp_url, Some("https://fleet.example.com/mcp".to_string()));
        assert_eq!(loaded.max_steps_per_turn, 3);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str("model = \"gpt-4o\"\n").expect("parse config");
        assert_eq!(config.model, Some("gpt-4o".to_string()));
        assert_eq!(config.summarize_threshold, DEFAULT_SUMMARIZE_THRESHOLD);
        assert_eq!(config.keep_window, DEFAULT_KEEP_WINDOW);
        assert!(!config.preference_triggers.is_empty());
    }

    #[test]
    fn custom_triggers_replace_defaults() {
        let config: Config = toml::from_str(
            "[[preference_triggers]]\nword = \"chilled\"\nkey = \"needs_refrigeration\"\n",
        )
        .expect("parse config");
        assert_eq!(config.preference_triggers.len(), 1);
        assert_eq!(config.preference_triggers[0].word, "chilled");
        assert_eq!(config.preference_triggers[0].key, "needs_refrigeration");
    }

    #[test]
    fn settings_resolution_fills_endpoints() {
        let settings = Config::default().into_settings();
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.model_base_url, DEFAULT_MODEL_BASE_URL);
        assert_eq!(settings.mcp_url, DEFAULT_MCP_URL);
        assert_eq!(settings.model_api_key, None);
        assert_eq!(settings.limits.max_steps_per_turn, DEFAULT_MAX_STEPS_PER_TURN);
    }
}
