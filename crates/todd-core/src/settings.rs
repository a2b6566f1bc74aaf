use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::{Result, Technology};

/// Runtime settings, layered from defaults, an optional `todd.toml` and
/// `TODD_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub github_token: Option<String>,
    pub github_org: String,
    pub github_api_url: String,
    pub branch: String,

    /// `anthropic`, `openai` or `none`
    pub llm_provider: String,
    pub llm_model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,

    pub default_environment: String,
    pub default_technology: Technology,

    pub poll_interval_secs: u64,
    pub final_check_delay_secs: u64,
    pub cancel_refresh_delay_secs: u64,
    pub safety_timeout_secs: u64,
    pub run_discovery_attempts: u32,
    pub max_viewable_report_bytes: u64,

    pub cache_url: String,
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let builder = Config::builder()
            .set_default("github_org", "org")?
            .set_default("github_api_url", "https://api.github.com")?
            .set_default("branch", "main")?
            .set_default("llm_provider", "anthropic")?
            .set_default("default_environment", "qa")?
            .set_default("default_technology", "playwright")?
            .set_default("poll_interval_secs", 5)?
            .set_default("final_check_delay_secs", 3)?
            .set_default("cancel_refresh_delay_secs", 2)?
            .set_default("safety_timeout_secs", 30 * 60)?
            .set_default("run_discovery_attempts", 5)?
            .set_default("max_viewable_report_bytes", 50 * 1024 * 1024)?
            .set_default("cache_url", "sqlite://todd.db?mode=rwc")?
            .add_source(File::with_name(path.unwrap_or("todd")).required(path.is_some()))
            .add_source(Environment::with_prefix("TODD").try_parsing(true));

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        // Conventional variable names win over nothing, never over TODD_*.
        if settings.github_token.is_none() {
            settings.github_token = std::env::var("GITHUB_TOKEN").ok();
        }
        if settings.anthropic_api_key.is_none() {
            settings.anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        }
        if settings.openai_api_key.is_none() {
            settings.openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        Ok(settings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn final_check_delay(&self) -> Duration {
        Duration::from_secs(self.final_check_delay_secs)
    }

    pub fn cancel_refresh_delay(&self) -> Duration {
        Duration::from_secs(self.cancel_refresh_delay_secs)
    }

    pub fn safety_timeout(&self) -> Duration {
        Duration::from_secs(self.safety_timeout_secs)
    }

    pub fn repository(&self, name: &str) -> String {
        format!("{}/{}", self.github_org, name)
    }
}
