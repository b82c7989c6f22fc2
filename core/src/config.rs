//! Client configuration.
//!
//! Settings come from `Config::default()`, a JSON document, or the
//! environment:
//!
//! | Variable                | Field                    | Default   |
//! |-------------------------|--------------------------|-----------|
//! | `AJAX_TRANSPORT`        | `transport`              | `xhrio`   |
//! | `AJAX_TIMEOUT_MS`       | `timeout_ms`             | `0`       |
//! | `AJAX_WITH_CREDENTIALS` | `with_credentials`       | `false`   |
//! | `AJAX_REQUEST_FORMAT`   | `default_request_format` | `transit` |

use serde::Deserialize;

use crate::error::Error;
use crate::transport::XHRIO;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry name of the backend used when a request names none.
    pub transport: String,
    /// Default per-request timeout; 0 disables it.
    pub timeout_ms: u64,
    pub with_credentials: bool,
    /// Request format tag used by the convenience methods when non-GET
    /// params need encoding and the caller gave no format.
    pub default_request_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: XHRIO.to_string(),
            timeout_ms: 0,
            with_credentials: false,
            default_request_format: "transit".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(transport) = lookup("AJAX_TRANSPORT") {
            config.transport = transport;
        }
        if let Some(ms) = lookup("AJAX_TIMEOUT_MS") {
            config.timeout_ms = ms
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("AJAX_TIMEOUT_MS={ms}: {e}")))?;
        }
        if let Some(flag) = lookup("AJAX_WITH_CREDENTIALS") {
            config.with_credentials = parse_flag(&flag)
                .ok_or_else(|| Error::Config(format!("AJAX_WITH_CREDENTIALS={flag}: expected true or false")))?;
        }
        if let Some(format) = lookup("AJAX_REQUEST_FORMAT") {
            config.default_request_format = format;
        }
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
