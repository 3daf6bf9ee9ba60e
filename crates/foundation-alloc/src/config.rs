//! Allocator configuration: arena size and which tracker (if any) to wire up.
//!
//! Built via [`ConfigBuilder`] over named keys, validated once at
//! [`AllocatorConfig::build`] rather than clamped silently — an
//! out-of-range value is an `ErrorKind::InvalidValue`, not a quiet rewrite.

use foundation_core::error::{error_report, ErrorKind, Severity};

use crate::arena::MIN_ARENA_SIZE;

/// Default arena size: 2 MiB.
pub const DEFAULT_ARENA_SIZE: usize = 2 * 1024 * 1024;

/// Which leak tracker to install at `initialize`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerMode {
    #[default]
    None,
    Local,
}

impl TrackerMode {
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Resolved allocator configuration.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    pub temporary_memory: usize,
    pub memory_tracker: TrackerMode,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            temporary_memory: DEFAULT_ARENA_SIZE,
            memory_tracker: TrackerMode::None,
        }
    }
}

/// Typed builder over the config-key table. Each setter stages a value;
/// [`build`](ConfigBuilder::build) validates everything at once and reports
/// `ErrorKind::InvalidValue` through the global error reporter on failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigBuilder {
    temporary_memory: Option<usize>,
    memory_tracker: Option<TrackerMode>,
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

    /// Set a key from its string name, as read from an environment or file
    /// based override table. Returns `false` (and reports `InvalidValue`)
    /// if `key` is unrecognized or `value` doesn't parse for that key.
    #[must_use]
    pub fn set_key(mut self, key: &str, value: &str) -> (Self, bool) {
        match key {
            "temporary_memory" => match value.parse::<usize>() {
                Ok(bytes) => {
                    self.temporary_memory = Some(bytes);
                    (self, true)
                }
                Err(_) => {
                    error_report(
                        ErrorKind::InvalidValue,
                        Severity::Error,
                        format!("temporary_memory: not a number: {value}"),
                    );
                    (self, false)
                }
            },
            "memory_tracker" => match TrackerMode::from_str_loose(value) {
                Some(mode) => {
                    self.memory_tracker = Some(mode);
                    (self, true)
                }
                None => {
                    error_report(
                        ErrorKind::InvalidValue,
                        Severity::Error,
                        format!("memory_tracker: unrecognized value: {value}"),
                    );
                    (self, false)
                }
            },
            other => {
                error_report(
                    ErrorKind::InvalidValue,
                    Severity::Error,
                    format!("unknown allocator config key: {other}"),
                );
                (self, false)
            }
        }
    }

    /// Validate staged values and produce a resolved [`AllocatorConfig`].
    /// `temporary_memory` below [`MIN_ARENA_SIZE`] is rejected rather than
    /// clamped.
    pub fn build(self) -> Result<AllocatorConfig, ErrorKind> {
        let temporary_memory = self.temporary_memory.unwrap_or(DEFAULT_ARENA_SIZE);
        if temporary_memory < MIN_ARENA_SIZE {
            error_report(
                ErrorKind::InvalidValue,
                Severity::Error,
                format!("temporary_memory must be >= {MIN_ARENA_SIZE}, got {temporary_memory}"),
            );
            return Err(ErrorKind::InvalidValue);
        }
        Ok(AllocatorConfig {
            temporary_memory,
            memory_tracker: self.memory_tracker.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = AllocatorConfig::default();
        assert_eq!(cfg.temporary_memory, DEFAULT_ARENA_SIZE);
        assert_eq!(cfg.memory_tracker, TrackerMode::None);
    }

    #[test]
    fn builder_accepts_explicit_values() {
        let cfg = ConfigBuilder::new()
            .temporary_memory(8192)
            .memory_tracker(TrackerMode::Local)
            .build()
            .unwrap();
        assert_eq!(cfg.temporary_memory, 8192);
        assert_eq!(cfg.memory_tracker, TrackerMode::Local);
    }

    #[test]
    fn builder_rejects_too_small_arena_rather_than_clamping() {
        let result = ConfigBuilder::new().temporary_memory(16).build();
        assert!(result.is_err());
    }

    #[test]
    fn set_key_parses_recognized_keys() {
        let (builder, ok) = ConfigBuilder::new().set_key("temporary_memory", "4096");
        assert!(ok);
        let (builder, ok) = builder.set_key("memory_tracker", "local");
        assert!(ok);
        let cfg = builder.build().unwrap();
        assert_eq!(cfg.temporary_memory, 4096);
        assert_eq!(cfg.memory_tracker, TrackerMode::Local);
    }

    #[test]
    fn set_key_rejects_unknown_key() {
        let (_builder, ok) = ConfigBuilder::new().set_key("bogus_key", "1");
        assert!(!ok);
    }

    #[test]
    fn tracker_mode_parses_loosely() {
        assert_eq!(TrackerMode::from_str_loose("Local"), Some(TrackerMode::Local));
        assert_eq!(TrackerMode::from_str_loose("none"), Some(TrackerMode::None));
        assert_eq!(TrackerMode::from_str_loose("bogus"), None);
    }
}
