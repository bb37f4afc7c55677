//! Linker configuration parameters.

use thiserror::Error;

/// Environment variable overriding [`LinkerConfig::unstable_relink_threshold`].
/// `off` disables detection.
pub const ENV_UNSTABLE_RELINK_THRESHOLD: &str = "DYNLINK_UNSTABLE_RELINK_THRESHOLD";

/// Environment variable overriding [`LinkerConfig::max_chain_length`].
pub const ENV_MAX_CHAIN_LENGTH: &str = "DYNLINK_MAX_CHAIN_LENGTH";

/// Policy shared by every call site a linker creates.
///
/// # Example
///
/// ```
/// use dynlink_linker::LinkerConfig;
///
/// // Polymorphic sites that never go megamorphic
/// let config = LinkerConfig {
///     unstable_relink_threshold: None,
///     max_chain_length: 4,
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkerConfig {
    /// Number of target installations after which a call site is considered
    /// unstable and is reset to always re-resolve.
    ///
    /// The first link counts as an installation. `None` disables detection.
    ///
    /// Default: 8
    pub unstable_relink_threshold: Option<u32>,

    /// Guarded targets a call site created by the linker keeps at once.
    ///
    /// 1 is a monomorphic site; larger values keep the newest targets first.
    ///
    /// Default: 1
    pub max_chain_length: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            unstable_relink_threshold: Some(8),
            max_chain_length: 1,
        }
    }
}

impl LinkerConfig {
    /// Build from a key lookup, starting from the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_UNSTABLE_RELINK_THRESHOLD) {
            let raw = raw.trim();
            config.unstable_relink_threshold = if raw.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(parse(ENV_UNSTABLE_RELINK_THRESHOLD, raw)?)
            };
        }
        if let Some(raw) = lookup(ENV_MAX_CHAIN_LENGTH) {
            config.max_chain_length = parse(ENV_MAX_CHAIN_LENGTH, raw.trim())?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chain_length == 0 {
            return Err(ConfigError::ZeroChainLength);
        }
        if self.unstable_relink_threshold == Some(0) {
            return Err(ConfigError::ZeroRelinkThreshold);
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    /// A call site must keep at least one target.
    #[error("max chain length must be at least 1")]
    ZeroChainLength,
    #[error("unstable relink threshold must be at least 1")]
    ZeroRelinkThreshold,
}
