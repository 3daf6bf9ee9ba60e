//! Process-wide configuration (component T): mirrors the External
//! Interfaces config-key table. Built via a typed [`ConfigBuilder`] over a
//! string-keyed override table, validated once — out-of-range values are
//! rejected with `ErrorKind::InvalidValue` rather than silently clamped,
//! the same discipline `foundation_alloc::ConfigBuilder` already uses for
//! the allocator-scoped subset of these keys.

use foundation_core::error::{error_report, ErrorKind, Severity};

use foundation_alloc::TrackerMode;

/// Maximum recognized depth for either the error-context or memory-context
/// stacks, matching `MAX_CONTEXT_DEPTH` in `foundation-core::error` and
/// `foundation-alloc::context`.
pub const MAX_STACK_DEPTH: usize = 32;

/// Default arena size, re-exported for callers that want the same default
/// `foundation-alloc::config` uses without reaching into that crate.
pub const DEFAULT_TEMPORARY_MEMORY: usize = foundation_alloc::config::DEFAULT_ARENA_SIZE;

/// Resolved process-wide configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub temporary_memory: usize,
    pub memory_tracker: TrackerMode,
    pub library_max: usize,
    pub thread_map_size: usize,
    pub error_context_depth: usize,
    pub memory_context_depth: usize,
    pub locale: [u8; 4],
}

const DEFAULT_LOCALE: [u8; 4] = *b"enUS";

impl Default for Config {
    fn default() -> Self {
        Config {
            temporary_memory: DEFAULT_TEMPORARY_MEMORY,
            memory_tracker: TrackerMode::None,
            library_max: 64,
            thread_map_size: 256,
            error_context_depth: MAX_STACK_DEPTH,
            memory_context_depth: MAX_STACK_DEPTH,
            locale: DEFAULT_LOCALE,
        }
    }
}

impl Config {
    /// The allocator-scoped subset of this configuration, as
    /// `foundation_alloc::initialize` expects it.
    #[must_use]
    pub fn allocator_config(&self) -> foundation_alloc::AllocatorConfig {
        foundation_alloc::AllocatorConfig {
            temporary_memory: self.temporary_memory,
            memory_tracker: self.memory_tracker,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

use thiserror::Error;

/// Typed builder over the full config-key table.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    temporary_memory: Option<usize>,
    memory_tracker: Option<TrackerMode>,
    library_max: Option<usize>,
    thread_map_size: Option<usize>,
    error_context_depth: Option<usize>,
    memory_context_depth: Option<usize>,
    locale: Option<[u8; 4]>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn temporary_memory(mut self, bytes: usize) -> Self {
        self.temporary_memory = Some(bytes);
        self
    }

    #[must_use]
    pub fn memory_tracker(mut self, mode: TrackerMode) -> Self {
        self.memory_tracker = Some(mode);
        self
    }

    #[must_use]
    pub fn library_max(mut self, n: usize) -> Self {
        self.library_max = Some(n);
        self
    }

    #[must_use]
    pub fn thread_map_size(mut self, n: usize) -> Self {
        self.thread_map_size = Some(n);
        self
    }

    #[must_use]
    pub fn error_context_depth(mut self, n: usize) -> Self {
        self.error_context_depth = Some(n);
        self
    }

    #[must_use]
    pub fn memory_context_depth(mut self, n: usize) -> Self {
        self.memory_context_depth = Some(n);
        self
    }

    #[must_use]
    pub fn locale(mut self, tag: [u8; 4]) -> Self {
        self.locale = Some(tag);
        self
    }

    /// Set a key by its string name (as read from an environment or file
    /// based override table), matching the External Interfaces key table.
    pub fn set_key(mut self, key: &str, value: &str) -> Result<Self, ConfigError> {
        match key {
            "temporary_memory" => {
                self.temporary_memory = Some(parse_usize(key, value)?);
            }
            "memory_tracker" => {
                self.memory_tracker = Some(TrackerMode::from_str_loose(value).ok_or_else(|| invalid(key, value))?);
            }
            "library_max" => {
                self.library_max = Some(parse_usize(key, value)?);
            }
            "thread_map_size" => {
                self.thread_map_size = Some(parse_usize(key, value)?);
            }
            "error_context_depth" => {
                self.error_context_depth = Some(parse_usize(key, value)?);
            }
            "memory_context_depth" => {
                self.memory_context_depth = Some(parse_usize(key, value)?);
            }
            "locale" => {
                let bytes = value.as_bytes();
                if bytes.len() != 4 {
                    return Err(invalid(key, value));
                }
                let mut tag = [0u8; 4];
                tag.copy_from_slice(bytes);
                self.locale = Some(tag);
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(self)
    }

    /// Validate staged values and produce a resolved [`Config`]. Reports
    /// `ErrorKind::InvalidValue` through the global error reporter on
    /// failure, mirroring `foundation_alloc::ConfigBuilder::build`.
    pub fn build(self) -> Result<Config, ConfigError> {
        let temporary_memory = self.temporary_memory.unwrap_or(DEFAULT_TEMPORARY_MEMORY);
        if temporary_memory < foundation_alloc::arena::MIN_ARENA_SIZE {
            return Err(report_invalid(
                "temporary_memory",
                temporary_memory.to_string(),
            ));
        }

        let error_context_depth = self.error_context_depth.unwrap_or(MAX_STACK_DEPTH);
        if error_context_depth > MAX_STACK_DEPTH {
            return Err(report_invalid(
                "error_context_depth",
                error_context_depth.to_string(),
            ));
        }

        let memory_context_depth = self.memory_context_depth.unwrap_or(MAX_STACK_DEPTH);
        if memory_context_depth > MAX_STACK_DEPTH {
            return Err(report_invalid(
                "memory_context_depth",
                memory_context_depth.to_string(),
            ));
        }

        Ok(Config {
            temporary_memory,
            memory_tracker: self.memory_tracker.unwrap_or_default(),
            library_max: self.library_max.unwrap_or(64),
            thread_map_size: self.thread_map_size.unwrap_or(256),
            error_context_depth,
            memory_context_depth,
            locale: self.locale.unwrap_or(DEFAULT_LOCALE),
        })
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn report_invalid(key: &str, value: String) -> ConfigError {
    error_report(
        ErrorKind::InvalidValue,
        Severity::Error,
        format!("{key}: invalid value {value}"),
    );
    ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_the_interface_table() {
        let cfg = Config::default();
        assert_eq!(cfg.temporary_memory, DEFAULT_TEMPORARY_MEMORY);
        assert_eq!(cfg.error_context_depth, MAX_STACK_DEPTH);
        assert_eq!(cfg.memory_context_depth, MAX_STACK_DEPTH);
        assert_eq!(&cfg.locale, b"enUS");
    }

    #[test]
    fn builder_accepts_explicit_values() {
        let cfg = ConfigBuilder::new()
            .library_max(8)
            .thread_map_size(16)
            .error_context_depth(4)
            .build()
            .unwrap();
        assert_eq!(cfg.library_max, 8);
        assert_eq!(cfg.thread_map_size, 16);
        assert_eq!(cfg.error_context_depth, 4);
    }

    #[test]
    fn builder_rejects_context_depth_above_the_maximum() {
        let result = ConfigBuilder::new().error_context_depth(33).build();
        assert!(result.is_err());
    }

    #[test]
    fn set_key_round_trips_every_recognized_key() {
        let builder = ConfigBuilder::new()
            .set_key("temporary_memory", "8192")
            .unwrap()
            .set_key("library_max", "10")
            .unwrap()
            .set_key("thread_map_size", "20")
            .unwrap()
            .set_key("locale", "frFR")
            .unwrap();
        let cfg = builder.build().unwrap();
        assert_eq!(cfg.temporary_memory, 8192);
        assert_eq!(cfg.library_max, 10);
        assert_eq!(cfg.thread_map_size, 20);
        assert_eq!(&cfg.locale, b"frFR");
    }

    #[test]
    fn set_key_rejects_unknown_key() {
        let result = ConfigBuilder::new().set_key("bogus_key", "1");
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn allocator_config_projects_the_shared_subset() {
        let cfg = ConfigBuilder::new().temporary_memory(8192).build().unwrap();
        let alloc_cfg = cfg.allocator_config();
        assert_eq!(alloc_cfg.temporary_memory, 8192);
    }
}
