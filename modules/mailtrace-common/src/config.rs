use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::MailtraceError;

// --- Environment config (secrets, provider) ---

/// Provider configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    /// Any OpenAI-compatible endpoint. `None` means api.openai.com.
    pub openai_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, MailtraceError> {
        Ok(Self {
            openai_api_key: required_env("OPENAI_API_KEY")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL").ok().filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn log_redacted(&self) {
        info!(
            model = self.openai_model.as_str(),
            base_url = self.openai_base_url.as_deref().unwrap_or("https://api.openai.com/v1"),
            api_key_set = !self.openai_api_key.is_empty(),
            "Oracle configuration"
        );
    }
}

fn required_env(key: &str) -> Result<String, MailtraceError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MailtraceError::Config(format!("{key} environment variable is required")))
}

// --- File config (tunables) ---

/// TOML-backed tunables. Every field has a default, so an absent file or a
/// partial file are both valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoutSettings {
    pub limits: LimitsConfig,
    pub thresholds: ThresholdsConfig,
    pub politeness: PolitenessConfig,
    pub http: HttpConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_search_results: usize,
    /// Hard cap on pages tried per person, across seeds, phases and baseline.
    pub max_pages_per_person: usize,
    pub max_seed_urls: usize,
    pub max_queries_per_phase: usize,
    pub judge_votes: usize,
    /// Page text sent to the judge is cut to this many bytes.
    pub judge_context_chars: usize,
    pub reflect_feature_count: usize,
    /// Flush memory every N people.
    pub checkpoint_every: usize,
    /// Optional wall-clock cap per person. Unset means no deadline.
    pub person_timeout_secs: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_search_results: 10,
            max_pages_per_person: 8,
            max_seed_urls: 8,
            max_queries_per_phase: 2,
            judge_votes: 3,
            judge_context_chars: 3500,
            reflect_feature_count: 6,
            checkpoint_every: 3,
            person_timeout_secs: None,
        }
    }
}

impl LimitsConfig {
    pub fn person_timeout(&self) -> Option<Duration> {
        self.person_timeout_secs.map(Duration::from_secs)
    }
}

/// Minimum confidence per classification before a verdict reaches the
/// reflector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdsConfig {
    pub personal: f64,
    pub role: f64,
    pub uncertain: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            personal: 0.60,
            role: 0.80,
            uncertain: 0.85,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolitenessConfig {
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 1.0,
            max_delay_secs: 2.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
            request_timeout_secs: 15,
            accept_language: "en,de;q=0.9".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleConfig {
    /// Request JSON-object mode from the provider. Leave off for models that
    /// do not support it (e.g. the original gpt-4).
    pub json_mode: bool,
}

impl ScoutSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, MailtraceError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MailtraceError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| MailtraceError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self, MailtraceError> {
        let settings: ScoutSettings = toml::from_str(content)
            .map_err(|e| MailtraceError::Config(format!("Failed to parse config: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), MailtraceError> {
        let p = &self.politeness;
        if p.min_delay_secs < 0.0 || p.max_delay_secs < p.min_delay_secs {
            return Err(MailtraceError::Config(format!(
                "politeness delay range invalid: {}..{}",
                p.min_delay_secs, p.max_delay_secs
            )));
        }
        let t = &self.thresholds;
        for (name, value) in [("personal", t.personal), ("role", t.role), ("uncertain", t.uncertain)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MailtraceError::Config(format!(
                    "threshold {name} must be within 0..=1, got {value}"
                )));
            }
        }
        Ok(())
    }
}
