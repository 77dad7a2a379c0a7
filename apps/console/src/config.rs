use std::{collections::HashMap, fs, io, path::Path, time::Duration};

use anyhow::Context;
use client_core::{ApiClientOptions, ControllerOptions, FailureGateOptions, HasMorePolicy};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3001/api";
pub const CONFIG_FILE: &str = "monitor.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_base_url: String,
    pub page_size: usize,
    pub request_timeout_secs: u64,
    pub retry_quiet_ms: u64,
    pub failure_gate_threshold: u32,
    pub failure_gate_window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            page_size: 25,
            request_timeout_secs: 15,
            retry_quiet_ms: 650,
            failure_gate_threshold: 3,
            failure_gate_window_secs: 60,
        }
    }
}

impl Settings {
    pub fn api_client_options(&self) -> ApiClientOptions {
        ApiClientOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            page_size: self.page_size,
            has_more_policy: HasMorePolicy::CursorOrFullPage,
            failure_gate: FailureGateOptions {
                threshold: self.failure_gate_threshold,
                window: Duration::from_secs(self.failure_gate_window_secs),
            },
        }
    }

    pub fn retry_quiet(&self) -> Duration {
        Duration::from_millis(self.retry_quiet_ms)
    }
}

/// Defaults, then `monitor.toml` if present, then environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg = parse_file(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            apply_overrides(&mut settings, |key| file_cfg.get(key).cloned());
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
    }

    if let Ok(v) = std::env::var("PM_API_BASE_URL") {
        settings.api_base_url = v;
    }
    apply_overrides(&mut settings, |key| {
        std::env::var(format!("APP__{}", key.to_ascii_uppercase())).ok()
    });

    settings.api_base_url = normalize_base_url(&settings.api_base_url);
    Ok(settings)
}

fn parse_file(raw: &str) -> anyhow::Result<HashMap<String, String>> {
    let table = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
    Ok(table
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(n) => n.to_string(),
                toml::Value::Float(n) => n.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                _ => return None,
            };
            Some((key, value))
        })
        .collect())
}

/// Unparseable numbers keep the previous value.
fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("api_base_url") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("page_size").and_then(|v| v.trim().parse().ok()) {
        settings.page_size = v;
    }
    if let Some(v) = lookup("request_timeout_secs").and_then(|v| v.trim().parse().ok()) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = lookup("retry_quiet_ms").and_then(|v| v.trim().parse().ok()) {
        settings.retry_quiet_ms = v;
    }
    if let Some(v) = lookup("failure_gate_threshold").and_then(|v| v.trim().parse().ok()) {
        settings.failure_gate_threshold = v;
    }
    if let Some(v) = lookup("failure_gate_window_secs").and_then(|v| v.trim().parse().ok()) {
        settings.failure_gate_window_secs = v;
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_BASE_URL.to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn base_url_is_trimmed_and_defaulted() {
        assert_eq!(
            normalize_base_url("  https://monitor.local/api/ "),
            "https://monitor.local/api"
        );
        assert_eq!(normalize_base_url("   "), DEFAULT_API_BASE_URL);
        assert_eq!(normalize_base_url("/"), DEFAULT_API_BASE_URL);
    }

    #[test]
    fn file_values_override_defaults() {
        let file_cfg = parse_file(
            r#"
            api_base_url = "http://db-monitor:8080/api"
            page_size = 50
            retry_quiet_ms = "900"
            failure_gate_threshold = "not a number"
            "#,
        )
        .expect("parse");

        let mut settings = Settings::default();
        apply_overrides(&mut settings, |key| file_cfg.get(key).cloned());

        assert_eq!(settings.api_base_url, "http://db-monitor:8080/api");
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.retry_quiet(), Duration::from_millis(900));
        assert_eq!(settings.failure_gate_threshold, 3);
    }

    #[test]
    fn controller_options_follow_settings() {
        let settings = Settings {
            page_size: 10,
            failure_gate_window_secs: 5,
            ..Settings::default()
        };
        let options = settings.controller_options();
        assert_eq!(options.page_size, 10);
        assert_eq!(options.failure_gate.window, Duration::from_secs(5));
        assert_eq!(
            settings.api_client_options().timeout,
            Duration::from_secs(15)
        );
    }

    #[test]
    fn malformed_file_is_reported() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("pm_console_config_test_{suffix}.toml"));
        fs::write(&path, "page_size = [").expect("write config");

        let err = load_settings(&path).expect_err("malformed config");
        assert!(err.to_string().contains("failed to parse config file"));

        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = env::temp_dir().join("pm_console_config_test_missing.toml");
        assert!(load_settings(&path).is_ok());
    }
}
