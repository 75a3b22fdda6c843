use std::env;

/// Runtime configuration, loaded once from the environment.
///
/// Every knob has a default so the tool works with zero setup; the
/// environment variables exist for CI and power users.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit Node.js binary override (`PLAYWRIGHT_NODE_PATH`).
    /// When set, the managed runtime install is skipped entirely.
    pub playwright_node_path: Option<String>,

    pub default_browser_type: String,
    pub default_headless: bool,
    pub default_viewport_width: u32,
    pub default_viewport_height: u32,

    pub session_max_count: usize,
    pub session_timeout_seconds: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            playwright_node_path: env::var("PLAYWRIGHT_NODE_PATH")
                .ok()
                .filter(|v| !v.is_empty()),

            default_browser_type: env_or("DEFAULT_BROWSER_TYPE", "chromium"),
            default_headless: env_bool_or("DEFAULT_HEADLESS", true),
            default_viewport_width: env_parse_or("DEFAULT_VIEWPORT_WIDTH", 1920),
            default_viewport_height: env_parse_or("DEFAULT_VIEWPORT_HEIGHT", 1080),

            session_max_count: env_parse_or("SESSION_MAX_COUNT", 10),
            session_timeout_seconds: env_parse_or("SESSION_TIMEOUT_SECONDS", 3600),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playwright_node_path: None,
            default_browser_type: "chromium".to_string(),
            default_headless: true,
            default_viewport_width: 1920,
            default_viewport_height: 1080,
            session_max_count: 10,
            session_timeout_seconds: 3600,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_bool_or(key: &str, default: bool) -> bool {
    match env::var(key).as_deref() {
        Ok("true") | Ok("1") => true,
        Ok("false") | Ok("0") => false,
        _ => default,
    }
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.default_browser_type, "chromium");
        assert!(cfg.default_headless);
        assert_eq!(cfg.session_max_count, 10);
        assert_eq!(cfg.session_timeout_seconds, 3600);
        assert_eq!(cfg.default_viewport_width, 1920);
        assert_eq!(cfg.default_viewport_height, 1080);
    }

    #[test]
    fn env_bool_accepts_numeric_forms() {
        assert!(env_bool_or("WEBAUTO_TEST_UNSET_BOOL", true));
        assert!(!env_bool_or("WEBAUTO_TEST_UNSET_BOOL", false));
    }
}
