use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (taskpilot.toml + TASKPILOT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskpilotConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub recurrence: RecurrenceConfig,
    #[serde(default)]
    pub language: LanguageConfig,
}

/// Connection settings for the OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL without a trailing slash.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Bearer credential sent with every request.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier passed in each request body.
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Hard per-call timeout. On expiry the turn completes as an apology.
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

/// Per-turn context bounds for the chat agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Max conversation messages included in the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Max task projections embedded in the system prompt.
    #[serde(default = "default_recent_tasks_window")]
    pub recent_tasks_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            recent_tasks_window: default_recent_tasks_window(),
        }
    }
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

/// Recurring-task materialiser cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
        }
    }
}

/// Language pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Fallback when a request carries no language.
    #[serde(default = "default_language")]
    pub default_language: String,
    /// High-signal romanised Urdu tokens for the heuristic classifier.
    /// Extends the built-in list; matching is whole-word, case-insensitive.
    #[serde(default)]
    pub urdu_keywords: Vec<String>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            urdu_keywords: Vec::new(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_history_window() -> usize {
    20
}
fn default_recent_tasks_window() -> usize {
    20
}
fn default_tick_interval() -> u64 {
    3600
}
fn default_language() -> String {
    "en".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskpilot/taskpilot.db", home)
}

impl TaskpilotConfig {
    /// Load config from a TOML file with TASKPILOT_* env var overrides.
    ///
    /// Falls back to ~/.taskpilot/taskpilot.toml when no path is given;
    /// a missing file yields the defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TaskpilotConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TASKPILOT_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskpilot/taskpilot.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = TaskpilotConfig::default();
        assert_eq!(cfg.llm.timeout_seconds, 30);
        assert_eq!(cfg.agent.history_window, 20);
        assert_eq!(cfg.agent.recent_tasks_window, 20);
        assert_eq!(cfg.recurrence.tick_interval_secs, 3600);
        assert_eq!(cfg.language.default_language, "en");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = TaskpilotConfig::load(Some("/nonexistent/taskpilot.toml")).unwrap();
        assert_eq!(cfg.llm.base_url, "https://api.openai.com");
    }
}
