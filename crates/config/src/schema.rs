//! Config schema types (directive dispatch, logging).

use serde::{Deserialize, Serialize};

/// Description reported to listeners when a router declines to handle a
/// directive it previously accepted for pre-handling.
pub const DEFAULT_HANDLE_FAILURE_DESCRIPTION: &str = "handleDirective failed";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesperConfig {
    pub directives: DirectivesConfig,
    pub logging: LoggingConfig,
}

/// Directive processor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectivesConfig {
    /// Failure description passed to `on_failed` when `handle` returns false.
    pub handle_failure_description: String,

    /// Cancel the rest of a dialog turn when any directive in it is rejected
    /// at the handle step, regardless of its blocking policy.
    pub scrub_turn_on_handle_failure: bool,

    /// Capacity of the lifecycle event broadcast channel. Slow subscribers
    /// that fall further behind than this miss events.
    pub event_buffer: usize,
}

impl Default for DirectivesConfig {
    fn default() -> Self {
        Self {
            handle_failure_description: DEFAULT_HANDLE_FAILURE_DESCRIPTION.into(),
            scrub_turn_on_handle_failure: true,
            event_buffer: 256,
        }
    }
}

/// Logging output settings. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error).
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: VesperConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, VesperConfig::default());
        assert!(cfg.directives.scrub_turn_on_handle_failure);
        assert_eq!(
            cfg.directives.handle_failure_description,
            DEFAULT_HANDLE_FAILURE_DESCRIPTION
        );
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: VesperConfig = toml::from_str(
            r#"
            [directives]
            scrub_turn_on_handle_failure = false

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert!(!cfg.directives.scrub_turn_on_handle_failure);
        assert_eq!(cfg.directives.event_buffer, 256);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, "info");
    }
}
