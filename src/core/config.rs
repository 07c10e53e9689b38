use std::env;
use std::time::Duration;

use url::Url;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Gateway configuration.
///
/// The API key is not part of the config; the client factory reads it on first use.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub openai_org_id: Option<String>,
    pub openai_api_base: String,
    pub request_timeout: Duration,
    pub expensive_cooldown: Duration,
    /// Maximum number of unsettled (running or pending) tasks; `None` leaves
    /// the queue unbounded.
    pub queue_capacity: Option<usize>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            openai_org_id: None,
            openai_api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            expensive_cooldown: DEFAULT_COOLDOWN,
            queue_capacity: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let openai_api_base = match get("OPENAI_API_BASE") {
            Some(raw) => Url::parse(raw.trim())
                .map_err(|e| format!("OPENAI_API_BASE: {}", e))?
                .to_string(),
            None => defaults.openai_api_base,
        };

        let request_timeout = match get("OPENAI_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = parse_number("OPENAI_TIMEOUT_SECS", &raw)?;
                if secs == 0 {
                    return Err("OPENAI_TIMEOUT_SECS: must be greater than zero".to_string());
                }
                Duration::from_secs(secs)
            }
            None => defaults.request_timeout,
        };

        let expensive_cooldown = match get("EXPENSIVE_MODEL_COOLDOWN_SECS") {
            Some(raw) => {
                Duration::from_secs(parse_number("EXPENSIVE_MODEL_COOLDOWN_SECS", &raw)?)
            }
            None => defaults.expensive_cooldown,
        };

        let queue_capacity = match get("TASK_QUEUE_CAPACITY") {
            Some(raw) => {
                let capacity = parse_number("TASK_QUEUE_CAPACITY", &raw)?;
                if capacity == 0 {
                    return Err("TASK_QUEUE_CAPACITY: must be greater than zero".to_string());
                }
                Some(usize::try_from(capacity).map_err(|e| format!("TASK_QUEUE_CAPACITY: {}", e))?)
            }
            None => None,
        };

        Ok(Self {
            openai_org_id: get("OPENAI_ORG_ID"),
            openai_api_base,
            request_timeout,
            expensive_cooldown,
            queue_capacity,
        })
    }

    /// Full URL of the chat-completions endpoint.
    #[must_use]
    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.openai_api_base.trim_end_matches('/')
        )
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u64, String> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| format!("{}: {}", name, e))
}
