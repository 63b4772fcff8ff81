use std::{collections::HashMap, fs, path::Path, str::FromStr};

use anyhow::{bail, Context};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub page_size: u32,
    pub auto_refresh_secs: u64,
    pub job_refetch_delay_secs: u64,
    pub request_timeout_secs: u64,
    /// Name recorded as `auditBy` on report verdicts.
    pub auditor: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".into(),
            page_size: 20,
            auto_refresh_secs: client_core::AUTO_REFRESH_INTERVAL.as_secs(),
            job_refetch_delay_secs: 3,
            request_timeout_secs: 15,
            auditor: "Admin".into(),
            log_filter: "info".into(),
        }
    }
}

/// Later entries win, so `APP__API_BASE_URL` overrides `DASHBOARD_API_URL`.
const ENV_KEYS: [(&str, &str); 8] = [
    ("DASHBOARD_API_URL", "api_base_url"),
    ("APP__API_BASE_URL", "api_base_url"),
    ("APP__PAGE_SIZE", "page_size"),
    ("APP__AUTO_REFRESH_SECS", "auto_refresh_secs"),
    ("APP__JOB_REFETCH_DELAY_SECS", "job_refetch_delay_secs"),
    ("APP__REQUEST_TIMEOUT_SECS", "request_timeout_secs"),
    ("APP__AUDITOR", "auditor"),
    ("APP__LOG_FILTER", "log_filter"),
];

/// Defaults, then the config file, then the environment. An explicit
/// `config_path` must exist; the default `dashboard.toml` is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let raw = match config_path {
        Some(path) => Some(fs::read_to_string(path).with_context(|| {
            format!("failed to read config file '{}'", path.display())
        })?),
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).ok(),
    };
    if let Some(raw) = raw {
        apply_file(&mut settings, &raw)?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;

    settings.api_base_url = normalize_api_base_url(&settings.api_base_url)?;
    if settings.page_size == 0 {
        bail!("page_size must be at least 1");
    }
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)
        .context("config file is not a flat toml table")?;
    for (key, value) in file_cfg {
        let value = match value {
            toml::Value::String(v) => v,
            toml::Value::Integer(v) => v.to_string(),
            other => bail!("config key '{key}' has unsupported value {other}"),
        };
        apply(settings, &key, value)?;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    for (var, key) in ENV_KEYS {
        if let Some(v) = lookup(var) {
            apply(settings, key, v).with_context(|| format!("invalid value in {var}"))?;
        }
    }
    Ok(())
}

fn apply(settings: &mut Settings, key: &str, value: String) -> anyhow::Result<()> {
    match key {
        "api_base_url" => settings.api_base_url = value,
        "page_size" => settings.page_size = parse(key, &value)?,
        "auto_refresh_secs" => settings.auto_refresh_secs = parse(key, &value)?,
        "job_refetch_delay_secs" => settings.job_refetch_delay_secs = parse(key, &value)?,
        "request_timeout_secs" => settings.request_timeout_secs = parse(key, &value)?,
        "auditor" => settings.auditor = value,
        "log_filter" => settings.log_filter = value,
        // Unknown keys are tolerated so one file can serve several tools.
        _ => {}
    }
    Ok(())
}

fn parse<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("'{value}' is not a valid {key}"))
}

/// Trims whitespace and trailing slashes and assumes `http://` when the
/// scheme is missing. Blank input falls back to the default base.
pub fn normalize_api_base_url(raw_api_base_url: &str) -> anyhow::Result<String> {
    let trimmed = raw_api_base_url.trim().trim_end_matches('/');

    if trimmed.is_empty() {
        return Ok(Settings::default().api_base_url);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .with_context(|| format!("invalid api base url '{raw_api_base_url}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("api base url must be http or https, got '{}'", url.scheme());
    }

    Ok(candidate)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
