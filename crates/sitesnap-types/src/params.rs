//! Crawl parameters and request validation.

use serde::Serialize;
use serde_json::Value;

use crate::ParamsError;

/// Default recursion depth for the blocking submit-and-wait mode.
pub const DEFAULT_SYNC_DEPTH: u32 = 4;

/// Default recursion depth for the submit-and-poll mode.
pub const DEFAULT_ASYNC_DEPTH: u32 = 2;

/// Default delay between fetch requests, in seconds.
pub const DEFAULT_WAIT_SECONDS: f64 = 0.5;

/// Values applied to request fields the caller leaves out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrawlDefaults {
    /// Recursion depth.
    pub depth: u32,
    /// Delay between requests, in seconds.
    pub wait_seconds: f64,
    /// Whether robots rules are honored.
    pub obey_robots: bool,
}

impl CrawlDefaults {
    /// Defaults for the blocking submit-and-wait mode.
    #[must_use]
    pub const fn synchronous() -> Self {
        Self {
            depth: DEFAULT_SYNC_DEPTH,
            wait_seconds: DEFAULT_WAIT_SECONDS,
            obey_robots: false,
        }
    }

    /// Defaults for the submit-and-poll mode.
    #[must_use]
    pub const fn asynchronous() -> Self {
        Self {
            depth: DEFAULT_ASYNC_DEPTH,
            wait_seconds: DEFAULT_WAIT_SECONDS,
            obey_robots: false,
        }
    }
}

impl Default for CrawlDefaults {
    fn default() -> Self {
        Self::synchronous()
    }
}

/// Validated parameters for one crawl.
///
/// Fields are private so a value can only exist after passing validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlParameters {
    target_url: String,
    depth: u32,
    wait_seconds: f64,
    obey_robots: bool,
}

impl CrawlParameters {
    /// Creates validated crawl parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not start with `http://` or
    /// `https://`, or if `wait_seconds` is negative or not finite.
    pub fn new(
        target_url: impl Into<String>,
        depth: u32,
        wait_seconds: f64,
        obey_robots: bool,
    ) -> Result<Self, ParamsError> {
        let target_url = target_url.into();
        validate_url(&target_url)?;

        if !wait_seconds.is_finite() || wait_seconds < 0.0 {
            return Err(ParamsError::InvalidWait(wait_seconds.to_string()));
        }

        Ok(Self {
            target_url,
            depth,
            wait_seconds,
            obey_robots,
        })
    }

    /// Parses a raw JSON request body.
    ///
    /// The body is treated as JSON regardless of any declared content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON object or any field fails
    /// validation.
    pub fn from_json_slice(body: &[u8], defaults: &CrawlDefaults) -> Result<Self, ParamsError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ParamsError::MalformedBody(e.to_string()))?;
        Self::from_json(&value, defaults)
    }

    /// Builds parameters from a decoded JSON request.
    ///
    /// Accepted fields are `url`, `depth`, `wait` and `obey_robots`; anything
    /// else is ignored. Missing or `null` fields take their value from
    /// `defaults`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not an object or any field fails
    /// validation.
    pub fn from_json(value: &Value, defaults: &CrawlDefaults) -> Result<Self, ParamsError> {
        let object = value.as_object().ok_or(ParamsError::NotAnObject)?;

        let url = match object.get("url") {
            Some(Value::String(url)) if !url.is_empty() => url.clone(),
            _ => return Err(ParamsError::MissingUrl),
        };

        let depth = match object.get("depth") {
            None | Some(Value::Null) => defaults.depth,
            Some(v) => coerce_depth(v)?,
        };

        let wait_seconds = match object.get("wait") {
            None | Some(Value::Null) => defaults.wait_seconds,
            Some(v) => coerce_wait(v)?,
        };

        let obey_robots = match object.get("obey_robots") {
            None | Some(Value::Null) => defaults.obey_robots,
            Some(v) => coerce_bool(v)?,
        };

        Self::new(url, depth, wait_seconds, obey_robots)
    }

    /// The site root to mirror.
    #[must_use]
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Maximum recursion depth.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Delay between fetch requests, in seconds.
    #[must_use]
    pub const fn wait_seconds(&self) -> f64 {
        self.wait_seconds
    }

    /// Whether the fetcher honors robots rules.
    #[must_use]
    pub const fn obey_robots(&self) -> bool {
        self.obey_robots
    }
}

fn validate_url(url: &str) -> Result<(), ParamsError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or(ParamsError::UnsupportedScheme)?;

    // The host part must exist; the URL goes straight into argv, so
    // whitespace and control characters are refused outright.
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ParamsError::MalformedUrl);
    }

    Ok(())
}

fn coerce_depth(value: &Value) -> Result<u32, ParamsError> {
    let invalid = || ParamsError::InvalidDepth(value.to_string());

    let depth = match value {
        Value::Number(n) => match n.as_u64() {
            Some(d) => d,
            // Fractional depths are truncated toward zero
            None => match n.as_f64() {
                Some(f) if f.is_finite() && f >= 0.0 => f.trunc() as u64,
                _ => return Err(invalid()),
            },
        },
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    u32::try_from(depth).map_err(|_| invalid())
}

fn coerce_wait(value: &Value) -> Result<f64, ParamsError> {
    let invalid = || ParamsError::InvalidWait(value.to_string());

    let wait = match value {
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    if !wait.is_finite() || wait < 0.0 {
        return Err(invalid());
    }
    Ok(wait)
}

fn coerce_bool(value: &Value) -> Result<bool, ParamsError> {
    let invalid = || ParamsError::InvalidObeyRobots(value.to_string());

    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid()),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}
