//! Declarative model-name → LLM backend registry.
//!
//! Entries are tried in registration order; the first pattern that matches
//! the requested model picks the builder. Models no entry claims fall
//! through to the default builder, if one is set.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use webpilot_core::backend::{ApiKey, BackendClient, PROVIDER_GOOGLE, PROVIDER_OPENAI};
use webpilot_core::error::CoreError;

/// Model-name prefixes served by the OpenAI backend.
pub const OPENAI_MODEL_PREFIXES: &[&str] = &["gpt", "o1", "o3", "o4"];

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ModelPattern {
    /// Case-insensitive prefix. Stored lowercased.
    Prefix(String),
    Regex(Regex),
}

impl ModelPattern {
    pub fn prefix(prefix: impl AsRef<str>) -> Self {
        Self::Prefix(prefix.as_ref().to_ascii_lowercase())
    }

    pub fn regex(pattern: &str) -> Result<Self, CoreError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| CoreError::Configuration(format!("Invalid model pattern: {e}")))
    }

    pub fn matches(&self, model: &str) -> bool {
        match self {
            ModelPattern::Prefix(prefix) => model.to_ascii_lowercase().starts_with(prefix.as_str()),
            ModelPattern::Regex(re) => re.is_match(model),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Produces a backend client for a model name.
#[async_trait]
pub trait BackendBuilder: Send + Sync {
    fn provider(&self) -> &str;

    async fn build(&self, model: &str) -> Result<BackendClient, CoreError>;
}

/// Builder for a provider authenticated by a single API key.
pub struct KeyedBackend {
    provider: String,
    /// Env var the key is read from; named in configuration errors.
    key_var: &'static str,
    api_key: Option<ApiKey>,
    base_url: Option<String>,
}

impl KeyedBackend {
    pub fn new(provider: impl Into<String>, key_var: &'static str, api_key: Option<ApiKey>) -> Self {
        Self {
            provider: provider.into(),
            key_var,
            api_key,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl BackendBuilder for KeyedBackend {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn build(&self, model: &str) -> Result<BackendClient, CoreError> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            CoreError::Configuration(format!(
                "{} is not set; model \"{model}\" cannot be used",
                self.key_var
            ))
        })?;

        Ok(BackendClient {
            provider: self.provider.clone(),
            model: model.to_string(),
            api_key,
            base_url: self.base_url.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Provider credentials, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct BackendCredentials {
    pub openai_api_key: Option<ApiKey>,
    pub openai_base_url: Option<String>,
    pub gemini_api_key: Option<ApiKey>,
}

impl BackendCredentials {
    /// Load credentials from environment variables. Unset and blank values
    /// are both treated as missing.
    ///
    /// | Env Var           |
    /// |-------------------|
    /// | `OPENAI_API_KEY`  |
    /// | `OPENAI_BASE_URL` |
    /// | `GEMINI_API_KEY`  |
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_blank_var("OPENAI_API_KEY").map(ApiKey::new),
            openai_base_url: non_blank_var("OPENAI_BASE_URL"),
            gemini_api_key: non_blank_var("GEMINI_API_KEY").map(ApiKey::new),
        }
    }
}

fn non_blank_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct BackendRegistry {
    entries: Vec<(ModelPattern, Arc<dyn BackendBuilder>)>,
    default: Option<Arc<dyn BackendBuilder>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// OpenAI for the `gpt`/`o1`/`o3`/`o4` families, Gemini for everything
    /// else.
    pub fn standard(credentials: &BackendCredentials) -> Self {
        let openai: Arc<dyn BackendBuilder> = Arc::new(
            KeyedBackend::new(
                PROVIDER_OPENAI,
                "OPENAI_API_KEY",
                credentials.openai_api_key.clone(),
            )
            .with_base_url(credentials.openai_base_url.clone()),
        );
        let google = Arc::new(KeyedBackend::new(
            PROVIDER_GOOGLE,
            "GEMINI_API_KEY",
            credentials.gemini_api_key.clone(),
        ));

        OPENAI_MODEL_PREFIXES
            .iter()
            .fold(Self::new(), |registry, prefix| {
                registry.register(ModelPattern::prefix(prefix), Arc::clone(&openai))
            })
            .with_default(google)
    }

    pub fn register(mut self, pattern: ModelPattern, builder: Arc<dyn BackendBuilder>) -> Self {
        self.entries.push((pattern, builder));
        self
    }

    pub fn with_default(mut self, builder: Arc<dyn BackendBuilder>) -> Self {
        self.default = Some(builder);
        self
    }

    /// The builder responsible for `model`.
    pub fn resolve(&self, model: &str) -> Result<&Arc<dyn BackendBuilder>, CoreError> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(model))
            .map(|(_, builder)| builder)
            .or(self.default.as_ref())
            .ok_or_else(|| {
                CoreError::Configuration(format!("No backend registered for model \"{model}\""))
            })
    }

    /// Resolve and build the backend client for `model`.
    pub async fn select(&self, model: &str) -> Result<BackendClient, CoreError> {
        let builder = self.resolve(model)?;
        tracing::debug!(model, provider = builder.provider(), "Backend selected");
        builder.build(model).await
    }
}
