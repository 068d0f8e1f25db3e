use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::{info, warn};

use crate::ai::{AiPlanAdapter, GeminiPlanAdapter};

/// Connection and AI settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    /// Gemini API key; AI plans are disabled when unset
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// Model used for AI recovery plans
    #[arg(long, env = "AI_MODEL", default_value = "gemini-pro", global = true)]
    pub ai_model: String,

    /// Seconds to wait for the AI before falling back to rule-based plans
    #[arg(long, env = "AI_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub ai_timeout_secs: u64,
}

impl AppConfig {
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs.max(1))
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set to a Postgres instance"))
    }

    /// Builds the AI adapter when a key is configured.
    pub fn ai_adapter(&self) -> Option<Arc<dyn AiPlanAdapter>> {
        let key = self
            .gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())?;

        match GeminiPlanAdapter::new(key.to_string(), self.ai_model.clone(), self.ai_timeout()) {
            Ok(adapter) => {
                info!(model = %self.ai_model, "AI recovery plans enabled");
                Some(Arc::new(adapter) as Arc<dyn AiPlanAdapter>)
            }
            Err(e) => {
                warn!(error = %e, "Could not build AI client; using rule-based plans");
                None
            }
        }
    }
}
