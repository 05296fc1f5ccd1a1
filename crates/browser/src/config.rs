use webpilot_core::job::ContextConfig;

/// Launch settings for the shared browser, loaded from the environment.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run without a visible window (default: `true`).
    pub headless: bool,
    /// Disable web security features such as CORS checks (default: `false`).
    pub disable_security: bool,
    /// Explicit browser executable; engine default when `None`.
    pub binary_path: Option<String>,
    /// Give every job its own isolated context (default: `true`).
    ///
    /// When `false`, jobs without context overrides run directly against the
    /// shared browser and can observe each other's navigation.
    pub isolate_jobs: bool,
    /// Context settings applied to every job before its own overrides.
    pub context_defaults: ContextConfig,
    /// Base URL of the automation sidecar.
    pub sidecar_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            disable_security: false,
            binary_path: None,
            isolate_jobs: true,
            context_defaults: ContextConfig::default(),
            sidecar_url: "http://127.0.0.1:9222".to_string(),
        }
    }
}

impl BrowserConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `HEADLESS`               | `true`                   |
    /// | `DISABLE_SECURITY`       | `false`                  |
    /// | `BROWSER_BINARY_PATH`    | unset                    |
    /// | `ISOLATE_JOBS`           | `true`                   |
    /// | `DEFAULT_LOCALE`         | unset                    |
    /// | `AUTOMATION_SIDECAR_URL` | `http://127.0.0.1:9222`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let binary_path = std::env::var("BROWSER_BINARY_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let context_defaults = ContextConfig {
            locale: std::env::var("DEFAULT_LOCALE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            ..Default::default()
        };

        let sidecar_url = std::env::var("AUTOMATION_SIDECAR_URL")
            .unwrap_or(defaults.sidecar_url)
            .trim_end_matches('/')
            .to_string();

        Self {
            headless: env_flag("HEADLESS", defaults.headless),
            disable_security: env_flag("DISABLE_SECURITY", defaults.disable_security),
            binary_path,
            isolate_jobs: env_flag("ISOLATE_JOBS", defaults.isolate_jobs),
            context_defaults,
            sidecar_url,
        }
    }
}

/// Read a boolean flag, panicking on values that are clearly not booleans.
fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => parse_flag(&raw).unwrap_or_else(|| panic!("{name} must be true or false")),
        Err(_) => default,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 1 "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn defaults_isolate_jobs() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.isolate_jobs);
        assert!(!config.disable_security);
    }
}
