use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

pub const DEFAULT_BASE_URLS: [&str; 2] = [
    "https://openrouter.ai/api/v1",
    "https://llmfoundry.straivedemo.com/openrouter/v1",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigQuery {
    pub candidate_base_urls: Vec<String>,
    pub force_show_ui: bool,
}

impl Default for ConfigQuery {
    fn default() -> Self {
        Self {
            candidate_base_urls: DEFAULT_BASE_URLS.iter().map(|url| url.to_string()).collect(),
            force_show_ui: false,
        }
    }
}

impl ConfigQuery {
    pub fn interactive() -> Self {
        Self {
            force_show_ui: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub models: Option<Vec<String>>,
}

impl ProviderConfig {
    pub fn require_api_key(&self) -> AppResult<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::config("OpenAI API key missing. Please configure your key."))
    }

    pub fn require_base_url(&self) -> AppResult<&str> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(AppError::config(
                "API base URL missing. Please configure your endpoint.",
            ));
        }

        Ok(base_url.trim_end_matches('/'))
    }
}

/// Source of credentials, endpoint and model list. Implementations may
/// prompt the user when `force_show_ui` is set.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get_config(&self, query: &ConfigQuery) -> AppResult<ProviderConfig>;
}

#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider;

impl EnvConfigProvider {
    pub fn new() -> Self {
        load_env_files();
        Self
    }
}

#[async_trait]
impl ConfigProvider for EnvConfigProvider {
    async fn get_config(&self, query: &ConfigQuery) -> AppResult<ProviderConfig> {
        if query.force_show_ui {
            load_env_files();
        }

        let api_key = non_empty_env("OPENROUTER_API_KEY");
        let base_url = non_empty_env("OPENROUTER_BASE_URL")
            .or_else(|| query.candidate_base_urls.first().cloned())
            .ok_or_else(|| AppError::config("no candidate base URL configured"))?;
        let models = non_empty_env("OPENROUTER_MODELS").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(str::to_string)
                .collect()
        });

        Ok(ProviderConfig {
            api_key,
            base_url,
            models,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: ProviderConfig,
}

impl StaticConfigProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn get_config(&self, _query: &ConfigQuery) -> AppResult<ProviderConfig> {
        Ok(self.config.clone())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn load_env_files() {
    let _ = dotenvy::from_filename(".env");
    let _ = dotenvy::from_filename("../.env");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One angle at a time in catalog order, pausing between requests.
    Sequential { pacing: Duration },
    /// All angles in flight at once.
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementSource {
    /// Latest reference image, else the first uploaded sketch.
    ReferenceFirst,
    /// Latest upload of either role.
    MostRecentUpload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub strategy: ExecutionStrategy,
    pub refinement_source: RefinementSource,
    pub expand_refinement_angles: bool,
    pub auto_refine: bool,
}

impl OrchestratorSettings {
    pub fn paced() -> Self {
        Self {
            strategy: ExecutionStrategy::Sequential {
                pacing: Duration::from_secs(1),
            },
            refinement_source: RefinementSource::ReferenceFirst,
            expand_refinement_angles: true,
            auto_refine: false,
        }
    }

    pub fn batched() -> Self {
        Self {
            strategy: ExecutionStrategy::Concurrent,
            refinement_source: RefinementSource::MostRecentUpload,
            expand_refinement_angles: false,
            auto_refine: true,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::paced()
    }
}
