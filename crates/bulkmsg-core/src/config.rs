use std::{env, fs, path::Path, str::FromStr, time::Duration};

use crate::{errors::Error, Result};

pub const DEFAULT_DISPATCH_TITLE: &str = "Bulk message";
pub const MIN_DISPATCH_INTERVAL_SECONDS: u32 = 1;
pub const MAX_DISPATCH_INTERVAL_SECONDS: u32 = 60;

/// Typed configuration for the dispatch engine and its HTTP adapter.
#[derive(Clone, Debug)]
pub struct Config {
    // Remote services
    pub gateway_base_url: String,
    pub gateway_api_token: String,
    pub notification_base_url: String,
    pub http_timeout: Duration,

    // Pairing
    pub pairing_poll_interval: Duration,

    // Dispatch
    pub dispatch_interval_seconds: u32,
    pub dispatch_default_title: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any variable source; `load` passes the process environment.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str| var(key).and_then(non_empty);

        let gateway_base_url = text("GATEWAY_BASE_URL").ok_or_else(|| {
            Error::Config("GATEWAY_BASE_URL environment variable is required".to_string())
        })?;
        let gateway_api_token = text("GATEWAY_API_TOKEN").ok_or_else(|| {
            Error::Config("GATEWAY_API_TOKEN environment variable is required".to_string())
        })?;

        // The notification store usually sits behind the same API host.
        let notification_base_url =
            text("NOTIFICATION_BASE_URL").unwrap_or_else(|| gateway_base_url.clone());

        let http_timeout =
            Duration::from_millis(parse_var(&var, "HTTP_TIMEOUT_MS").unwrap_or(15_000));
        let pairing_poll_interval = Duration::from_millis(
            parse_var(&var, "PAIRING_POLL_INTERVAL_MS")
                .unwrap_or(3_000)
                .max(1),
        );

        let dispatch_interval_seconds =
            clamp_interval(parse_var(&var, "DISPATCH_INTERVAL_SECONDS").unwrap_or(5));
        let dispatch_default_title =
            text("DISPATCH_DEFAULT_TITLE").unwrap_or_else(|| DEFAULT_DISPATCH_TITLE.to_string());

        Ok(Self {
            gateway_base_url: trim_trailing_slash(gateway_base_url),
            gateway_api_token,
            notification_base_url: trim_trailing_slash(notification_base_url),
            http_timeout,
            pairing_poll_interval,
            dispatch_interval_seconds,
            dispatch_default_title,
        })
    }
}

pub fn clamp_interval(seconds: u32) -> u32 {
    seconds.clamp(MIN_DISPATCH_INTERVAL_SECONDS, MAX_DISPATCH_INTERVAL_SECONDS)
}

fn trim_trailing_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
