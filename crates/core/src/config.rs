use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Resolves profiled keys against some variable source.
///
/// With profile `PROD`, `OPENAI_API_KEY` is looked up as `PROD_OPENAI_API_KEY`
/// first and falls back to the bare key. Empty values count as unset.
struct Profiled<'a, F> {
    profile: &'a str,
    lookup: F,
}

impl<'a, F> Profiled<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = (self.lookup)(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T
    where
        T::Err: fmt::Display,
    {
        match self.opt(key) {
            Some(raw) => match raw.parse() {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(key, value = %raw, error = %e, "invalid config value, using default");
                    default
                }
            },
            None => default,
        }
    }
}

// ── Stream end policy ─────────────────────────────────────────

/// What the stream assembler does when the frame source ends without the
/// `[DONE]` sentinel (exhaustion, transport failure or cancellation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEndPolicy {
    /// Return the best-effort response tagged as incomplete.
    #[default]
    FlagIncomplete,
    /// Fail with an error that still carries the best-effort response.
    Error,
}

impl FromStr for StreamEndPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flag" | "flag_incomplete" | "incomplete" => Ok(Self::FlagIncomplete),
            "error" | "fail" => Ok(Self::Error),
            other => Err(CoreError::InvalidValue {
                key: "PARLEY_STREAM_END_POLICY".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for StreamEndPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlagIncomplete => f.write_str("flag_incomplete"),
            Self::Error => f.write_str("error"),
        }
    }
}

// ── Client config ─────────────────────────────────────────────

/// Settings for talking to an OpenAI-compatible completion service.
///
/// Always passed explicitly into the client; nothing here is process-global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub organization: Option<String>,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Whole-request timeout applied by the HTTP transport.
    pub request_timeout_secs: u64,
    pub stream_end_policy: StreamEndPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            default_model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            stream_end_policy: StreamEndPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PARLEY_PROFILE`.
    pub fn from_env() -> Self {
        let profile = env::var("PARLEY_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        Self::from_lookup(profile, |key| env::var(key).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup<F>(profile: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = profile.to_uppercase();
        let vars = Profiled {
            profile: &profile,
            lookup,
        };
        Self {
            profile: profile.clone(),
            api_key: vars.opt("OPENAI_API_KEY"),
            base_url: vars.or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            organization: vars.opt("OPENAI_ORGANIZATION"),
            default_model: vars.or("PARLEY_MODEL", DEFAULT_MODEL),
            request_timeout_secs: vars.parsed("PARLEY_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            stream_end_policy: vars.parsed("PARLEY_STREAM_END_POLICY", StreamEndPolicy::default()),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_stream_end_policy(mut self, policy: StreamEndPolicy) -> Self {
        self.stream_end_policy = policy;
        self
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn require_api_key(&self) -> Result<&str, CoreError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CoreError::Missing("OPENAI_API_KEY not set".into()))
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  endpoint:    base_url={}", self.base_url);
        tracing::info!("  model:       default={}", self.default_model);
        tracing::info!("  auth:        configured={}", self.is_configured());
        tracing::info!("  streaming:   end_policy={}", self.stream_end_policy);
    }

    /// Return a redacted view safe for display (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "base_url": self.base_url,
            "organization": self.organization,
            "default_model": self.default_model,
            "request_timeout_secs": self.request_timeout_secs,
            "stream_end_policy": self.stream_end_policy,
            "configured": self.is_configured(),
        })
    }
}
