use once_cell::sync::OnceCell;
use std::env;
use std::time::Duration;

/// Default graph endpoint, matching a locally-running Gremlin Server.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "ws://localhost:8182/gremlin";

const DEFAULT_POOL_SIZE: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

/// Connection settings for the lineage graph endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    pub endpoint: String,
    pub connection_pool_size: usize,
    pub request_timeout: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
            connection_pool_size: DEFAULT_POOL_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Retry settings applied when nothing more specific is declared.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub count: u32,
    pub delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_RETRY_COUNT,
            delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// Process-wide engine configuration, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub graph: GraphConfig,
    pub retry: RetrySettings,
}

/// Explicit overrides supplied at declaration time. These take precedence
/// over the environment, which takes precedence over built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub graph_endpoint: Option<String>,
    pub connection_pool_size: Option<usize>,
    pub request_timeout: Option<Duration>,
    pub retry_count: Option<u32>,
    pub retry_delay: Option<Duration>,
}

/// Merges declaration-time overrides, environment variables, and built-in
/// defaults, in that precedence order.
///
/// Recognized environment keys: `GREMLIN_ENDPOINT`, `GREMLIN_TIMEOUT`,
/// `RETRY_COUNT`, `RETRY_DELAY`. An environment key only overrides the
/// default when the value it produces differs from the default sentinel;
/// malformed values are ignored.
pub struct ConfigResolver;

impl ConfigResolver {
    pub fn resolve(overrides: &ConfigOverrides) -> EngineConfig {
        let defaults = EngineConfig::default();

        let endpoint = overrides
            .graph_endpoint
            .clone()
            .or_else(|| env_string("GREMLIN_ENDPOINT"))
            .unwrap_or(defaults.graph.endpoint);

        let request_timeout = overrides
            .request_timeout
            .or_else(|| env_seconds("GREMLIN_TIMEOUT"))
            .filter(|t| *t != Duration::ZERO)
            .unwrap_or(defaults.graph.request_timeout);

        let retry_count = overrides
            .retry_count
            .or_else(|| env_parsed::<u32>("RETRY_COUNT"))
            .unwrap_or(defaults.retry.count);

        let retry_delay = overrides
            .retry_delay
            .or_else(|| env_seconds("RETRY_DELAY"))
            .unwrap_or(defaults.retry.delay);

        EngineConfig {
            graph: GraphConfig {
                endpoint: normalize_endpoint(&endpoint),
                connection_pool_size: overrides
                    .connection_pool_size
                    .unwrap_or(defaults.graph.connection_pool_size),
                request_timeout,
            },
            retry: RetrySettings {
                count: retry_count,
                delay: retry_delay,
            },
        }
    }
}

/// Append the `/gremlin` path when the endpoint lacks one.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.ends_with("/gremlin") {
        endpoint.to_string()
    } else {
        format!("{}/gremlin", endpoint.trim_end_matches('/'))
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_seconds(key: &str) -> Option<Duration> {
    env_parsed::<f64>(key)
        .filter(|secs| *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

static GLOBAL_CONFIG: OnceCell<EngineConfig> = OnceCell::new();

/// Install the process-wide configuration. Later calls are no-ops; the first
/// resolution wins and the value is immutable thereafter.
pub fn init_global_config(config: EngineConfig) -> &'static EngineConfig {
    GLOBAL_CONFIG.get_or_init(|| config)
}

/// The process-wide configuration, resolving from the environment on first
/// access if `init_global_config` was never called.
pub fn global_config() -> &'static EngineConfig {
    GLOBAL_CONFIG.get_or_init(|| ConfigResolver::resolve(&ConfigOverrides::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests share process state; serialize them
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        for (key, value) in vars {
            env::set_var(key, value);
        }
        f();
        for (key, _) in vars {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_apply_without_overrides_or_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("GREMLIN_ENDPOINT");
        env::remove_var("GREMLIN_TIMEOUT");
        let config = ConfigResolver::resolve(&ConfigOverrides::default());
        assert_eq!(config.graph.endpoint, DEFAULT_GRAPH_ENDPOINT);
        assert_eq!(config.graph.connection_pool_size, 10);
        assert_eq!(config.retry.count, 3);
    }

    #[test]
    fn environment_overrides_defaults() {
        with_env(
            &[
                ("GREMLIN_ENDPOINT", "ws://graph.internal:8182"),
                ("RETRY_COUNT", "5"),
            ],
            || {
                let config = ConfigResolver::resolve(&ConfigOverrides::default());
                assert_eq!(config.graph.endpoint, "ws://graph.internal:8182/gremlin");
                assert_eq!(config.retry.count, 5);
            },
        );
    }

    #[test]
    fn explicit_overrides_beat_environment() {
        with_env(&[("GREMLIN_ENDPOINT", "ws://env-wins:8182")], || {
            let overrides = ConfigOverrides {
                graph_endpoint: Some("ws://decorator-wins:8182/gremlin".to_string()),
                ..ConfigOverrides::default()
            };
            let config = ConfigResolver::resolve(&overrides);
            assert_eq!(config.graph.endpoint, "ws://decorator-wins:8182/gremlin");
        });
    }

    #[test]
    fn malformed_environment_values_are_ignored() {
        with_env(&[("RETRY_COUNT", "lots"), ("GREMLIN_TIMEOUT", "-4")], || {
            let config = ConfigResolver::resolve(&ConfigOverrides::default());
            assert_eq!(config.retry.count, 3);
            assert_eq!(config.graph.request_timeout, Duration::from_secs(30));
        });
    }

    #[test]
    fn endpoint_path_is_normalized() {
        assert_eq!(
            normalize_endpoint("ws://localhost:8182"),
            "ws://localhost:8182/gremlin"
        );
        assert_eq!(
            normalize_endpoint("ws://localhost:8182/"),
            "ws://localhost:8182/gremlin"
        );
        assert_eq!(
            normalize_endpoint("ws://localhost:8182/gremlin"),
            "ws://localhost:8182/gremlin"
        );
    }
}
