//! Descriptor of the LLM backend a job runs against.
//!
//! Building the actual model client is the automation engine's business;
//! the dispatcher only decides *which* provider, model and credential a job
//! uses and hands that descriptor over.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known provider names.
pub const PROVIDER_OPENAI: &str = "openai";
pub const PROVIDER_GOOGLE: &str = "google";

/// An API credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// A fully resolved backend client handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendClient {
    pub provider: String,
    pub model: String,
    pub api_key: ApiKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}
