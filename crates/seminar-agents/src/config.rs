//! Engine configuration.
//!
//! Defaults come from the environment (`SEMINAR_*` variables); a TOML file
//! can overlay any subset of fields on top of them.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;
use crate::gate::GateBudget;

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Human-gate polling budget as configured. [`budget`](Self::budget) yields
/// the typed form the gate consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct GateBudgetConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl GateBudgetConfig {
    pub fn budget(&self) -> GateBudget {
        GateBudget::new(self.max_attempts, Duration::from_millis(self.interval_ms))
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub endpoint: ModelEndpoint,
    pub gate: GateBudgetConfig,
    /// Number of AI student personas. The human participant joins in
    /// addition to these.
    pub student_count: usize,
    /// Postgres URL for the message store; `None` runs in-memory.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: ModelEndpoint {
                base_url: std::env::var("SEMINAR_MODEL_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
                api_key: std::env::var("SEMINAR_API_KEY")
                    .or_else(|_| std::env::var("OPENAI_API_KEY"))
                    .unwrap_or_default(),
                model: std::env::var("SEMINAR_MODEL")
                    .unwrap_or_else(|_| "gpt-4-turbo-preview".into()),
            },
            gate: GateBudgetConfig {
                max_attempts: env_parse("SEMINAR_GATE_ATTEMPTS", 60),
                interval_ms: env_parse("SEMINAR_GATE_INTERVAL_MS", 200),
            },
            student_count: env_parse("SEMINAR_STUDENT_COUNT", 3),
            database_url: std::env::var("SEMINAR_DATABASE_URL").ok(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// File overlay: every field optional, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    gate_attempts: Option<u32>,
    gate_interval_ms: Option<u64>,
    student_count: Option<usize>,
    database_url: Option<String>,
}

impl EngineConfig {
    /// Load configuration with a TOML file overlaid on the defaults.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            EngineError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let overlay: FileConfig = toml::from_str(&content).map_err(|err| {
            EngineError::Config(format!("failed to parse {}: {err}", path.display()))
        })?;

        let mut config = Self::default();
        if let Some(base_url) = overlay.base_url {
            config.endpoint.base_url = base_url;
        }
        if let Some(api_key) = overlay.api_key {
            config.endpoint.api_key = api_key;
        }
        if let Some(model) = overlay.model {
            config.endpoint.model = model;
        }
        if let Some(attempts) = overlay.gate_attempts {
            config.gate.max_attempts = attempts;
        }
        if let Some(interval) = overlay.gate_interval_ms {
            config.gate.interval_ms = interval;
        }
        if let Some(count) = overlay.student_count {
            config.student_count = count;
        }
        if let Some(url) = overlay.database_url {
            config.database_url = Some(url);
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.student_count == 0 {
            return Err(EngineError::Config(
                "student_count must be at least 1".into(),
            ));
        }
        if self.endpoint.base_url.trim().is_empty() {
            return Err(EngineError::Config("base_url must not be empty".into()));
        }
        Ok(())
    }
}
