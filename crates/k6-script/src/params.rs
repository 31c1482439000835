//! Load-test parameters and their validation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::HeaderName;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScriptError};

/// Smallest accepted virtual-user count.
pub const MIN_VUS: u32 = 1;

/// Largest accepted virtual-user count.
pub const MAX_VUS: u32 = 1000;

/// Longest accepted test duration.
pub const MAX_TEST_DURATION: Duration = Duration::from_secs(24 * 3600);

const DEFAULT_DURATION: &str = "30s";

/// HTTP methods the generated script can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// GET and DELETE bodies are still interpolated but ignored by convention.
    pub fn conventionally_has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ScriptError::invalid(
                "method",
                format!("unsupported method '{}'", other),
            )),
        }
    }
}

/// How the request body is turned into text before interpolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    /// Parsed as JSON and re-serialized in compact form.
    #[default]
    Json,
    /// Interpolated exactly as supplied.
    Raw,
}

/// Parameters for one load-test run, as accepted from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestParameters {
    /// Absolute http(s) URL of the target.
    pub url: String,

    pub method: HttpMethod,

    /// Request headers sent by every virtual user.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub body_format: BodyFormat,

    /// Number of virtual users.
    #[serde(default = "default_vus", alias = "virtualUsers")]
    pub vus: u32,

    /// Test duration, e.g. `30s`, `5m`, `1h`.
    #[serde(default = "default_duration")]
    pub duration: String,
}

fn default_vus() -> u32 {
    MIN_VUS
}

fn default_duration() -> String {
    DEFAULT_DURATION.to_string()
}

impl TestParameters {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
            body_format: BodyFormat::default(),
            vus: default_vus(),
            duration: default_duration(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>, format: BodyFormat) -> Self {
        self.body = Some(body.into());
        self.body_format = format;
        self
    }

    pub fn with_vus(mut self, vus: u32) -> Self {
        self.vus = vus;
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    /// Checks every field. Nothing touches the filesystem or spawns a process
    /// before this has passed.
    pub fn validate(&self) -> Result<()> {
        self.target_url()?;

        for name in self.headers.keys() {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ScriptError::invalid("headers", format!("invalid header name '{}'", name))
            })?;
        }

        if !(MIN_VUS..=MAX_VUS).contains(&self.vus) {
            return Err(ScriptError::invalid(
                "vus",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_VUS, MAX_VUS, self.vus
                ),
            ));
        }

        self.test_duration()?;
        self.canonical_body()?;

        Ok(())
    }

    /// Parsed target URL. Only absolute http and https URLs with a host pass.
    pub fn target_url(&self) -> Result<Url> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(ScriptError::invalid("url", "must not be empty"));
        }
        if raw.len() != self.url.len() {
            return Err(ScriptError::invalid(
                "url",
                "must not have leading or trailing whitespace",
            ));
        }

        let url = Url::parse(raw).map_err(|e| ScriptError::invalid("url", e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScriptError::invalid(
                "url",
                format!("scheme '{}' is not supported", url.scheme()),
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ScriptError::invalid("url", "must include a host"));
        }

        Ok(url)
    }

    /// The target without credentials, query or fragment, for logs and status.
    pub fn display_target(&self) -> String {
        match self.target_url() {
            Ok(mut url) => {
                let _ = url.set_username("");
                let _ = url.set_password(None);
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Test duration parsed from the `<n>s|m|h` grammar, at most
    /// [`MAX_TEST_DURATION`].
    pub fn test_duration(&self) -> Result<Duration> {
        let duration = parse_duration(&self.duration)?;
        if duration > MAX_TEST_DURATION {
            return Err(ScriptError::invalid(
                "duration",
                format!("must not exceed 24h, got {}", self.duration),
            ));
        }
        Ok(duration)
    }

    /// Headers as a JSON object with keys in sorted order.
    pub fn canonical_headers(&self) -> Result<String> {
        serde_json::to_string(&self.headers)
            .map_err(|e| ScriptError::invalid("headers", e.to_string()))
    }

    /// Body text as it will be interpolated, or `None` without a body.
    pub fn canonical_body(&self) -> Result<Option<String>> {
        let Some(body) = &self.body else {
            return Ok(None);
        };

        match self.body_format {
            BodyFormat::Raw => Ok(Some(body.clone())),
            BodyFormat::Json => {
                let value: serde_json::Value = serde_json::from_str(body)
                    .map_err(|e| ScriptError::MalformedBody(e.to_string()))?;
                let compact = serde_json::to_string(&value)
                    .map_err(|e| ScriptError::MalformedBody(e.to_string()))?;
                Ok(Some(compact))
            }
        }
    }
}

/// Parses a k6 duration of the form `<positive integer><s|m|h>`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let malformed = || {
        ScriptError::invalid(
            "duration",
            format!("'{}' does not match <n>s, <n>m or <n>h", input),
        )
    };

    let unit = input.chars().last().ok_or_else(malformed)?;
    let digits = &input[..input.len() - unit.len_utf8()];

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let amount: u64 = digits.parse().map_err(|_| malformed())?;
    if amount == 0 {
        return Err(ScriptError::invalid("duration", "must be greater than zero"));
    }

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        _ => return Err(malformed()),
    };

    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| ScriptError::invalid("duration", "is too large"))
}
