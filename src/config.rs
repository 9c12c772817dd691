//! Server configuration read from `PAGEWRIGHT_*` environment variables.
//!
//! Empty or whitespace-only values are treated as unset.

use std::time::Duration;

use thiserror::Error;

use crate::observability::LogFormat;
use crate::task::services::{
    ControllerSettings, DEFAULT_TEMPLATES, RetryPolicy, SharedSecret, TemplateCatalog,
};

/// Startup configuration failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable holds an unusable value.
    #[error("{name} is invalid: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Configuration for the pagewright server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub http_host: String,
    /// HTTP server port.
    pub http_port: u16,
    /// Secret every build and revise request must present.
    pub shared_secret: SharedSecret,
    /// Template kinds accepted by build requests.
    pub templates: Vec<String>,
    /// Attempts per collaborator call, including the first.
    pub max_retry_attempts: u32,
    /// Delay before the first retry.
    pub retry_base_delay: Duration,
    /// Deadline of a single collaborator attempt.
    pub dispatch_timeout: Duration,
    /// How long a duplicate request waits for the original.
    pub inflight_wait: Duration,
    /// Replay retention; `None` keeps outcomes for the process lifetime.
    pub replay_retention: Option<Duration>,
    /// Base location used by the in-process publisher.
    pub pages_base_url: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_owned(),
            http_port: 8000,
            shared_secret: SharedSecret::default(),
            templates: DEFAULT_TEMPLATES
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            dispatch_timeout: Duration::from_secs(600),
            inflight_wait: Duration::from_secs(30),
            replay_retention: None,
            pages_base_url: "http://localhost:8000/pages".to_owned(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable cannot be parsed or the
    /// resulting configuration is unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps variable names to
    /// raw values.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(host) = env.string("PAGEWRIGHT_HTTP_HOST") {
            config.http_host = host;
        }
        if let Some(port) = env.parse::<u16>("PAGEWRIGHT_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(secret) = env.string("PAGEWRIGHT_SHARED_SECRET") {
            config.shared_secret = SharedSecret::new(secret);
        }
        if let Some(templates) = env.string("PAGEWRIGHT_TEMPLATES") {
            config.templates = parse_list(&templates);
        }
        if let Some(attempts) = env.parse::<u32>("PAGEWRIGHT_MAX_RETRY_ATTEMPTS")? {
            config.max_retry_attempts = attempts;
        }
        if let Some(millis) = env.parse::<u64>("PAGEWRIGHT_RETRY_BASE_DELAY_MS")? {
            config.retry_base_delay = Duration::from_millis(millis);
        }
        if let Some(seconds) = env.parse::<u64>("PAGEWRIGHT_DISPATCH_TIMEOUT_SECONDS")? {
            config.dispatch_timeout = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env.parse::<u64>("PAGEWRIGHT_INFLIGHT_WAIT_SECONDS")? {
            config.inflight_wait = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env.parse::<u64>("PAGEWRIGHT_REPLAY_RETENTION_SECONDS")? {
            config.replay_retention = Some(Duration::from_secs(seconds));
        }
        if let Some(url) = env.string("PAGEWRIGHT_PAGES_BASE_URL") {
            config.pages_base_url = url;
        }
        if let Some(format) = env.string("PAGEWRIGHT_LOG_FORMAT") {
            config.log_format = format
                .parse()
                .map_err(|reason| ConfigError::Invalid {
                    name: "PAGEWRIGHT_LOG_FORMAT",
                    reason,
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] without a shared secret and
    /// [`ConfigError::Invalid`] for zero attempts, zero timeouts or an
    /// empty template catalog.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared_secret.is_blank() {
            return Err(ConfigError::Missing("PAGEWRIGHT_SHARED_SECRET"));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "PAGEWRIGHT_MAX_RETRY_ATTEMPTS",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.dispatch_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "PAGEWRIGHT_DISPATCH_TIMEOUT_SECONDS",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.inflight_wait.is_zero() {
            return Err(ConfigError::Invalid {
                name: "PAGEWRIGHT_INFLIGHT_WAIT_SECONDS",
                reason: "must be at least 1".to_owned(),
            });
        }
        self.catalog().map(|_| ())
    }

    /// Builds the template catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a name is not a valid slug or
    /// the list is empty.
    pub fn catalog(&self) -> Result<TemplateCatalog, ConfigError> {
        TemplateCatalog::from_names(&self.templates).map_err(|err| ConfigError::Invalid {
            name: "PAGEWRIGHT_TEMPLATES",
            reason: err.to_string(),
        })
    }

    /// Retry policy shared by the collaborator dispatchers.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retry_attempts,
            self.retry_base_delay,
            self.dispatch_timeout,
        )
    }

    /// Round controller tunables.
    #[must_use]
    pub const fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            inflight_wait: self.inflight_wait,
            replay_retention: self.replay_retention,
        }
    }

    /// `host:port` the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        })
    }

    fn parse<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.string(name) else {
            return Ok(None);
        };
        value
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::Invalid {
                name,
                reason: err.to_string(),
            })
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
