use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

pub const ENV_SHELL: &str = "PROMPTER_SHELL";
pub const ENV_API_KEY: &str = "PROMPTER_API_KEY";
pub const ENV_API_KEY_ENV: &str = "PROMPTER_API_KEY_ENV";
pub const ENV_PUMP_INTERVAL_MS: &str = "PROMPTER_PUMP_INTERVAL_MS";

#[cfg(windows)]
pub const DEFAULT_SHELL: &str = "cmd";
#[cfg(not(windows))]
pub const DEFAULT_SHELL: &str = "sh";

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_PUMP_INTERVAL_MS: u64 = 50;
const MIN_PUMP_INTERVAL_MS: u64 = 1;
const MAX_PUMP_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PROMPTER_API_KEY_ENV: {0}")]
    InvalidApiKeyEnv(String),
    #[error("invalid PROMPTER_PUMP_INTERVAL_MS: {0}")]
    InvalidPumpInterval(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct PrompterConfig {
    pub shell: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub pump_interval: Duration,
}

impl std::fmt::Debug for PrompterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrompterConfig")
            .field("shell", &self.shell)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("pump_interval", &self.pump_interval)
            .finish()
    }
}

impl Default for PrompterConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            pump_interval: Duration::from_millis(DEFAULT_PUMP_INTERVAL_MS),
        }
    }
}

impl PrompterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let shell = non_empty(ENV_SHELL).unwrap_or(defaults.shell);
        let api_key = non_empty(ENV_API_KEY);

        let api_key_env = match non_empty(ENV_API_KEY_ENV) {
            Some(name) if is_valid_env_name(&name) => name,
            Some(name) => return Err(ConfigError::InvalidApiKeyEnv(name)),
            None => defaults.api_key_env,
        };

        let pump_interval = match non_empty(ENV_PUMP_INTERVAL_MS) {
            Some(raw) => {
                let millis = raw
                    .parse::<u64>()
                    .map_err(|error| ConfigError::InvalidPumpInterval(format!("{raw}: {error}")))?;
                Duration::from_millis(millis.clamp(MIN_PUMP_INTERVAL_MS, MAX_PUMP_INTERVAL_MS))
            }
            None => defaults.pump_interval,
        };

        Ok(Self {
            shell,
            api_key,
            api_key_env,
            pump_interval,
        })
    }

    /// Environment exported to every raw request.
    pub fn env_overrides(&self) -> BTreeMap<String, String> {
        let mut overrides = BTreeMap::new();
        if let Some(api_key) = self.api_key.as_ref() {
            overrides.insert(self.api_key_env.clone(), api_key.clone());
        }
        overrides
    }
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_ascii_alphabetic())
        && chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}
