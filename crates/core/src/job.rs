//! Job request shape and the validation gate in front of the dispatcher.
//!
//! A [`JobRequest`] is what arrives on the wire. It only becomes a
//! [`ValidatedJob`] after [`validate_job_request`] has checked the task and
//! the callback URL; the worker accepts nothing else, so an unvalidated
//! request can never reach the background path.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Maximum accepted length of a callback URL.
const MAX_CALLBACK_URL_LEN: usize = 2048;

/// Maximum accepted length of a task description.
const MAX_TASK_LEN: usize = 32 * 1024;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// An automation-task request as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    /// Natural-language description of what the automation should do.
    pub task: String,
    /// Backend model identifier, e.g. `gpt-4o` or `gemini-pro`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Credential placeholders substituted by the executor; never logged.
    #[serde(default)]
    pub sensitive: Option<SensitiveData>,
    /// Pre-scripted actions run before the model takes over.
    #[serde(default)]
    pub initial_actions: Option<Vec<InitialAction>>,
    /// Per-job execution-context overrides.
    #[serde(default)]
    pub browser_context_config: Option<ContextConfig>,
    #[serde(default)]
    pub return_screenshots: bool,
    /// Where the terminal result is POSTed. Required.
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// One pre-scripted action: `{ "<action_name>": { ...params } }`.
pub type InitialAction = BTreeMap<String, serde_json::Map<String, serde_json::Value>>;

/// Key/value secrets the executor substitutes into its actions.
///
/// `Debug` prints only the keys so the values cannot leak through tracing.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensitiveData(HashMap<String, String>);

impl SensitiveData {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("SensitiveData")
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

/// Execution-context settings. Every field is optional so a per-job value
/// only overrides what it names; unknown keys are carried through to the
/// automation engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_wait_page_load_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_network_idle_page_load_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_wait_page_load_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_expansion: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContextConfig {
    /// Layer `self` over `defaults`: fields set here win, everything else
    /// falls back to the default.
    pub fn merged_over(&self, defaults: &ContextConfig) -> ContextConfig {
        let mut extra = defaults.extra.clone();
        extra.extend(self.extra.clone());

        ContextConfig {
            locale: self.locale.clone().or_else(|| defaults.locale.clone()),
            minimum_wait_page_load_time: self
                .minimum_wait_page_load_time
                .or(defaults.minimum_wait_page_load_time),
            wait_for_network_idle_page_load_time: self
                .wait_for_network_idle_page_load_time
                .or(defaults.wait_for_network_idle_page_load_time),
            maximum_wait_page_load_time: self
                .maximum_wait_page_load_time
                .or(defaults.maximum_wait_page_load_time),
            allowed_domains: self
                .allowed_domains
                .clone()
                .or_else(|| defaults.allowed_domains.clone()),
            viewport_expansion: self.viewport_expansion.or(defaults.viewport_expansion),
            extra,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated job
// ---------------------------------------------------------------------------

/// A request that passed [`validate_job_request`].
#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub task: String,
    pub model: String,
    pub sensitive: Option<SensitiveData>,
    pub initial_actions: Vec<InitialAction>,
    pub context_config: Option<ContextConfig>,
    pub return_screenshots: bool,
    pub callback_url: Url,
}

/// Check a request before any work is scheduled for it.
///
/// Rules:
/// - `task` must not be blank and must not exceed `MAX_TASK_LEN` bytes.
/// - `model` must not be blank.
/// - `callback_url` must be present and an absolute `http`/`https` URL
///   with a host.
/// - Every initial action must name at least one action.
pub fn validate_job_request(request: JobRequest) -> Result<ValidatedJob, CoreError> {
    if request.task.trim().is_empty() {
        return Err(CoreError::Validation("task must not be empty".to_string()));
    }
    if request.task.len() > MAX_TASK_LEN {
        return Err(CoreError::Validation(format!(
            "task must not exceed {MAX_TASK_LEN} bytes"
        )));
    }
    if request.model.trim().is_empty() {
        return Err(CoreError::Validation("model must not be empty".to_string()));
    }

    let callback_url = match request.callback_url.as_deref() {
        Some(raw) => validate_callback_url(raw)?,
        None => {
            return Err(CoreError::Validation(
                "callback_url is required for async runs".to_string(),
            ))
        }
    };

    let initial_actions = request.initial_actions.unwrap_or_default();
    for (i, action) in initial_actions.iter().enumerate() {
        if action.is_empty() {
            return Err(CoreError::Validation(format!(
                "initial action at index {i} must name an action"
            )));
        }
    }

    Ok(ValidatedJob {
        task: request.task,
        model: request.model.trim().to_string(),
        sensitive: request.sensitive,
        initial_actions,
        context_config: request.browser_context_config,
        return_screenshots: request.return_screenshots,
        callback_url,
    })
}

/// Parse a callback URL and require an absolute `http`/`https` target.
pub fn validate_callback_url(raw: &str) -> Result<Url, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::Validation(
            "callback_url is required for async runs".to_string(),
        ));
    }
    if raw.len() > MAX_CALLBACK_URL_LEN {
        return Err(CoreError::Validation(format!(
            "callback_url must not exceed {MAX_CALLBACK_URL_LEN} characters"
        )));
    }

    let url = Url::parse(raw)
        .map_err(|e| CoreError::Validation(format!("callback_url is not a valid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CoreError::Validation(format!(
                "callback_url must use http or https, got \"{other}\""
            )))
        }
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => {
            return Err(CoreError::Validation(
                "callback_url must include a host".to_string(),
            ))
        }
    }

    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
