//! Service configuration resolved once at startup.

use std::time::Duration;

use crate::checkpoint::{StoreConfig, DEFAULT_NAMESPACE, DEFAULT_TTL_HOURS};
use crate::executor::DEFAULT_RECURSION_LIMIT;

/// Settings for the workflow service binary.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Connection string for the external checkpoint store; the in-memory
    /// store is used when absent.
    pub checkpoint_url: Option<String>,
    pub ttl_hours: u64,
    pub namespace: String,
    pub extend_on_access: bool,
    pub recursion_limit: usize,
    /// Deadline applied to non-streaming responses only; streaming
    /// responses hold open until the terminal or paused event.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            checkpoint_url: None,
            ttl_hours: DEFAULT_TTL_HOURS,
            namespace: DEFAULT_NAMESPACE.to_string(),
            extend_on_access: true,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            request_timeout_secs: 120,
        }
    }
}

impl ServiceConfig {
    /// Resolve configuration from the environment (and a `.env` file when
    /// present). Unset or unparsable variables fall back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            host: std::env::var("GRAPHMILL_HOST").unwrap_or(defaults.host),
            port: env_parse("GRAPHMILL_PORT", defaults.port),
            checkpoint_url: std::env::var("CHECKPOINT_URL")
                .or_else(|_| std::env::var("REDIS_URL"))
                .ok(),
            ttl_hours: env_parse("CHECKPOINT_TTL_HOURS", defaults.ttl_hours),
            namespace: std::env::var("CHECKPOINT_NAMESPACE").unwrap_or(defaults.namespace),
            extend_on_access: env_parse("CHECKPOINT_EXTEND_ON_ACCESS", defaults.extend_on_access),
            recursion_limit: env_parse("RECURSION_LIMIT", defaults.recursion_limit),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
        }
    }

    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_ttl(Duration::from_secs(self.ttl_hours * 3600))
            .with_namespace(&self.namespace)
            .with_extend_on_access(self.extend_on_access)
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
