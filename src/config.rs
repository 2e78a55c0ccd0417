//! Runtime options for the lifecycle host.
//!
//! Options come from defaults, from environment variables, or (with the
//! `config` feature) from a JSON document. Sources are read through the
//! [`ConfigSource`] trait so hosts can plug their own settings store.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, LifecycleResult};

/// Prefix of the environment variables read by [`RuntimeOptions::from_env`].
pub const ENV_PREFIX: &str = "FERROUS_LIFECYCLE";

/// Knobs a host sets once, before the first frame.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use ferrous_lifecycle::{MapConfigSource, RuntimeOptions};
///
/// let source = MapConfigSource::new()
///     .with("rethrow_errors", "false")
///     .with("max_update_step_ms", "50");
///
/// let options = RuntimeOptions::from_source(&source)?;
/// assert!(!options.rethrow_errors);
/// assert_eq!(options.max_update_step, Some(Duration::from_millis(50)));
/// assert!(options.start_late_services);
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct RuntimeOptions {
    /// Verdict of the default error handler: re-raise captured failures.
    pub rethrow_errors: bool,
    /// Upper bound on the elapsed time handed to one update pass.
    #[cfg_attr(feature = "config", serde(with = "duration_ms"))]
    pub max_update_step: Option<Duration>,
    /// Start services registered after initialization, not only activate them.
    pub start_late_services: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            rethrow_errors: true,
            max_update_step: None,
            start_late_services: true,
        }
    }
}

impl RuntimeOptions {
    /// Defaults overridden by `FERROUS_LIFECYCLE_*` environment variables.
    pub fn from_env() -> LifecycleResult<Self> {
        Self::from_source(&EnvironmentConfigSource::with_prefix(ENV_PREFIX))
    }

    /// Defaults overridden by whatever keys `source` provides.
    pub fn from_source(source: &dyn ConfigSource) -> LifecycleResult<Self> {
        let mut options = Self::default();
        if let Some(value) = source.get("rethrow_errors") {
            options.rethrow_errors = parse_bool("rethrow_errors", &value)?;
        }
        if let Some(value) = source.get("max_update_step_ms") {
            options.max_update_step = parse_step("max_update_step_ms", &value)?;
        }
        if let Some(value) = source.get("start_late_services") {
            options.start_late_services = parse_bool("start_late_services", &value)?;
        }
        tracing::debug!(?options, "runtime options loaded");
        Ok(options)
    }

    /// Options from a JSON object; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> LifecycleResult<Self> {
        serde_json::from_str(json).map_err(|err| LifecycleError::Config(err.to_string()))
    }

    pub fn with_rethrow_errors(mut self, rethrow: bool) -> Self {
        self.rethrow_errors = rethrow;
        self
    }

    pub fn with_max_update_step(mut self, step: Duration) -> Self {
        self.max_update_step = Some(step);
        self
    }

    pub fn with_start_late_services(mut self, start: bool) -> Self {
        self.start_late_services = start;
        self
    }

    /// `elapsed`, clamped to `max_update_step` when one is set.
    pub fn clamp_step(&self, elapsed: Duration) -> Duration {
        match self.max_update_step {
            Some(max) => elapsed.min(max),
            None => elapsed,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> LifecycleResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(LifecycleError::Config(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}

/// Zero disables the clamp.
fn parse_step(key: &str, value: &str) -> LifecycleResult<Option<Duration>> {
    let ms: u64 = value.trim().parse().map_err(|_| {
        LifecycleError::Config(format!("{key}: expected milliseconds, got {value:?}"))
    })?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}

/// A flat key/value settings store.
pub trait ConfigSource {
    /// Raw value for `key`, if the source defines it.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads `{PREFIX}_{KEY}` environment variables, upper-cased.
#[derive(Debug, Default, Clone)]
pub struct EnvironmentConfigSource {
    prefix: Option<String>,
}

impl EnvironmentConfigSource {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn variable(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(self.variable(key)).ok()
    }
}

/// In-memory source, handy for tests and embedded hosts.
#[derive(Debug, Default, Clone)]
pub struct MapConfigSource {
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(feature = "config")]
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(step) => serializer.serialize_some(&(step.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}
