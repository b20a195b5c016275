use crate::error::ConfigError;
use crate::gateway::DEFAULT_MAX_VALUE_LENGTH;
use crate::types::{EventKind, EventSubscription};
use std::collections::{BTreeSet, HashMap};
use std::env::VarError;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Source of environment variables.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, VarError>;
}

/// Delegates to `std::env`.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    fn var(&self, key: &str) -> Result<String, VarError> {
        std::env::var(key)
    }
}

/// Fixed set of variables, for tests.
#[derive(Default)]
pub struct InMemoryEnv {
    vars: Mutex<HashMap<String, String>>,
}

impl InMemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut vars) = self.vars.lock() {
            vars.insert(key.into(), value.into());
        }
    }
}

impl ReadEnv for InMemoryEnv {
    fn var(&self, key: &str) -> Result<String, VarError> {
        self.vars
            .lock()
            .ok()
            .and_then(|vars| vars.get(key).cloned())
            .ok_or(VarError::NotPresent)
    }
}

/// Operator settings for one Neos trigger.
///
/// Resolved from environment variables:
/// - `NEOS_INSTANCE_URL`: base URL of the Neos instance (needed for registration calls)
/// - `NEOS_ACCESS_TOKEN`: bearer token for the webhook API (required)
/// - `NEOS_EVENTS`: comma-separated event kinds to deliver (default: all)
/// - `NEOS_WEBHOOK_PORT`: HTTP listening port (default: 8080)
/// - `NEOS_WEBHOOK_URL`: callback URL registered with Neos (default: `http://127.0.0.1:{port}/webhook`)
/// - `NEOS_REQUEST_TIMEOUT_SECS`: timeout of registration calls (default: 30)
/// - `NEOS_MAX_VALUE_LENGTH`: longest `oldValue`/`newValue` forwarded untruncated (default: 4000)
/// - `NEOS_STATE_FILE`: JSON file keeping the registration across restarts (default: memory only)
#[derive(Debug, Clone)]
pub struct Config {
    pub instance_url: Option<String>,
    pub access_token: String,
    pub events: BTreeSet<EventKind>,
    pub port: u16,
    pub webhook_url: String,
    pub request_timeout: Duration,
    pub max_value_length: usize,
    pub state_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env<E: ReadEnv>(env: &E) -> Result<Self, ConfigError> {
        let access_token = non_empty(env, "NEOS_ACCESS_TOKEN")
            .ok_or(ConfigError::Missing("NEOS_ACCESS_TOKEN"))?;

        let events = match non_empty(env, "NEOS_EVENTS") {
            Some(list) => parse_events(&list)?,
            None => BTreeSet::new(),
        };

        let port = parsed(env, "NEOS_WEBHOOK_PORT").unwrap_or(DEFAULT_PORT);
        let webhook_url = non_empty(env, "NEOS_WEBHOOK_URL")
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}/webhook"));

        Ok(Self {
            instance_url: non_empty(env, "NEOS_INSTANCE_URL"),
            access_token,
            events,
            port,
            webhook_url,
            request_timeout: Duration::from_secs(
                parsed(env, "NEOS_REQUEST_TIMEOUT_SECS").unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            max_value_length: parsed(env, "NEOS_MAX_VALUE_LENGTH")
                .unwrap_or(DEFAULT_MAX_VALUE_LENGTH),
            state_file: non_empty(env, "NEOS_STATE_FILE").map(PathBuf::from),
        })
    }

    pub fn subscription(&self) -> EventSubscription {
        EventSubscription::new(self.webhook_url.clone(), self.events.iter().copied())
    }
}

fn non_empty<E: ReadEnv>(env: &E, key: &str) -> Option<String> {
    env.var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<E: ReadEnv, T: std::str::FromStr>(env: &E, key: &str) -> Option<T> {
    non_empty(env, key).and_then(|v| v.parse().ok())
}

fn parse_events(list: &str) -> Result<BTreeSet<EventKind>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.parse::<EventKind>().map_err(|e| ConfigError::Invalid {
                name: "NEOS_EVENTS",
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_token() -> InMemoryEnv {
        let env = InMemoryEnv::new();
        env.set("NEOS_ACCESS_TOKEN", "token");
        env
    }

    #[test]
    fn access_token_is_required() {
        let env = InMemoryEnv::new();
        assert!(matches!(
            Config::from_env(&env),
            Err(ConfigError::Missing("NEOS_ACCESS_TOKEN"))
        ));

        env.set("NEOS_ACCESS_TOKEN", "   ");
        assert!(Config::from_env(&env).is_err());
    }

    #[test]
    fn defaults_when_only_token_set() {
        let config = Config::from_env(&env_with_token()).unwrap();

        assert_eq!(config.instance_url, None);
        assert!(config.events.is_empty());
        assert_eq!(config.port, 8080);
        assert_eq!(config.webhook_url, "http://127.0.0.1:8080/webhook");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_value_length, 4000);
        assert_eq!(config.state_file, None);
        assert!(config.subscription().covers_all());
    }

    #[test]
    fn reads_all_env_vars() {
        let env = env_with_token();
        env.set("NEOS_INSTANCE_URL", "https://cms.example/");
        env.set("NEOS_EVENTS", "nodePublished, nodeRemoved,,nodePublished");
        env.set("NEOS_WEBHOOK_PORT", "9090");
        env.set("NEOS_WEBHOOK_URL", "https://hooks.example/neos");
        env.set("NEOS_REQUEST_TIMEOUT_SECS", "5");
        env.set("NEOS_MAX_VALUE_LENGTH", "100");
        env.set("NEOS_STATE_FILE", "/var/lib/neos/state.json");

        let config = Config::from_env(&env).unwrap();

        assert_eq!(config.instance_url.as_deref(), Some("https://cms.example/"));
        assert_eq!(
            config.events,
            BTreeSet::from([EventKind::NodePublished, EventKind::NodeRemoved])
        );
        assert_eq!(config.port, 9090);
        assert_eq!(config.webhook_url, "https://hooks.example/neos");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_value_length, 100);
        assert_eq!(config.state_file, Some(PathBuf::from("/var/lib/neos/state.json")));
    }

    #[test]
    fn default_webhook_url_follows_port() {
        let env = env_with_token();
        env.set("NEOS_WEBHOOK_PORT", "9191");
        let config = Config::from_env(&env).unwrap();
        assert_eq!(config.webhook_url, "http://127.0.0.1:9191/webhook");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let env = env_with_token();
        env.set("NEOS_WEBHOOK_PORT", "not-a-number");
        env.set("NEOS_MAX_VALUE_LENGTH", "-1");
        env.set("NEOS_REQUEST_TIMEOUT_SECS", "soon");

        let config = Config::from_env(&env).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_value_length, 4000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let env = env_with_token();
        env.set("NEOS_EVENTS", "nodeAdded,nodeExploded");
        match Config::from_env(&env) {
            Err(ConfigError::Invalid { name, reason }) => {
                assert_eq!(name, "NEOS_EVENTS");
                assert!(reason.contains("nodeExploded"));
            }
            other => panic!("expected invalid events, got {other:?}"),
        }
    }
}
