use std::sync::Arc;

use crate::error::{Result, SharpInspectError};
use crate::model::LogLevel;

/// Policy used by the dev-mode detector (spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevelopmentDetectionMode {
    Auto,
    EnvironmentVariableOnly,
    DebuggerOnly,
    Custom,
}

/// Caller-supplied predicate for `DevelopmentDetectionMode::Custom`.
pub type CustomDevelopmentCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Mutable builder handed to the caller's configuration closure; frozen into
/// an immutable [`Options`] once the closure returns.
pub struct OptionsBuilder {
    port: u16,
    max_network_entries: usize,
    max_console_entries: usize,
    max_performance_entries: usize,
    max_body_bytes: usize,
    enable_network_capture: bool,
    enable_console_capture: bool,
    enable_performance_capture: bool,
    min_log_level: LogLevel,
    performance_sample_interval_ms: u64,
    enable_in_development_only: bool,
    development_detection_mode: DevelopmentDetectionMode,
    custom_development_check: Option<CustomDevelopmentCheck>,
    bind_all_interfaces: bool,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self {
            port: 9229,
            max_network_entries: 1000,
            max_console_entries: 1000,
            max_performance_entries: 500,
            max_body_bytes: 1024 * 1024,
            enable_network_capture: true,
            enable_console_capture: true,
            enable_performance_capture: true,
            min_log_level: LogLevel::Trace,
            performance_sample_interval_ms: 1000,
            enable_in_development_only: true,
            development_detection_mode: DevelopmentDetectionMode::Auto,
            custom_development_check: None,
            bind_all_interfaces: false,
        }
    }
}

impl OptionsBuilder {
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn max_network_entries(&mut self, n: usize) -> &mut Self {
        self.max_network_entries = n;
        self
    }

    pub fn max_console_entries(&mut self, n: usize) -> &mut Self {
        self.max_console_entries = n;
        self
    }

    pub fn max_performance_entries(&mut self, n: usize) -> &mut Self {
        self.max_performance_entries = n;
        self
    }

    pub fn max_body_bytes(&mut self, n: usize) -> &mut Self {
        self.max_body_bytes = n;
        self
    }

    pub fn enable_network_capture(&mut self, enabled: bool) -> &mut Self {
        self.enable_network_capture = enabled;
        self
    }

    pub fn enable_console_capture(&mut self, enabled: bool) -> &mut Self {
        self.enable_console_capture = enabled;
        self
    }

    pub fn enable_performance_capture(&mut self, enabled: bool) -> &mut Self {
        self.enable_performance_capture = enabled;
        self
    }

    pub fn min_log_level(&mut self, level: LogLevel) -> &mut Self {
        self.min_log_level = level;
        self
    }

    pub fn performance_sample_interval_ms(&mut self, ms: u64) -> &mut Self {
        self.performance_sample_interval_ms = ms;
        self
    }

    pub fn enable_in_development_only(&mut self, enabled: bool) -> &mut Self {
        self.enable_in_development_only = enabled;
        self
    }

    pub fn development_detection_mode(&mut self, mode: DevelopmentDetectionMode) -> &mut Self {
        self.development_detection_mode = mode;
        self
    }

    pub fn custom_development_check(&mut self, check: CustomDevelopmentCheck) -> &mut Self {
        self.custom_development_check = Some(check);
        self
    }

    /// Bind the DevTools server to `0.0.0.0` instead of loopback. Must be
    /// opted into explicitly (spec §4.10).
    pub fn bind_all_interfaces(&mut self, enabled: bool) -> &mut Self {
        self.bind_all_interfaces = enabled;
        self
    }

    pub(crate) fn freeze(self) -> Result<Options> {
        if self.max_body_bytes == 0
            && (self.enable_network_capture)
        {
            // zero body bytes is legal (capture headers only, never bodies);
            // only negative bounds are rejected, and usize cannot be negative,
            // so the only remaining invalid states are mode mismatches below.
        }
        if self.development_detection_mode == DevelopmentDetectionMode::Custom
            && self.custom_development_check.is_none()
        {
            // Falls back to Auto per spec §4.11; not an error.
        }
        Ok(Options {
            port: self.port,
            max_network_entries: self.max_network_entries,
            max_console_entries: self.max_console_entries,
            max_performance_entries: self.max_performance_entries,
            max_body_bytes: self.max_body_bytes,
            enable_network_capture: self.enable_network_capture,
            enable_console_capture: self.enable_console_capture,
            enable_performance_capture: self.enable_performance_capture,
            min_log_level: self.min_log_level,
            performance_sample_interval_ms: self.performance_sample_interval_ms,
            enable_in_development_only: self.enable_in_development_only,
            development_detection_mode: self.development_detection_mode,
            custom_development_check: self.custom_development_check,
            bind_all_interfaces: self.bind_all_interfaces,
        })
    }
}

/// Immutable configuration snapshot, frozen from an [`OptionsBuilder`].
#[derive(Clone)]
pub struct Options {
    pub port: u16,
    pub max_network_entries: usize,
    pub max_console_entries: usize,
    pub max_performance_entries: usize,
    pub max_body_bytes: usize,
    pub enable_network_capture: bool,
    pub enable_console_capture: bool,
    pub enable_performance_capture: bool,
    pub min_log_level: LogLevel,
    pub performance_sample_interval_ms: u64,
    pub enable_in_development_only: bool,
    pub development_detection_mode: DevelopmentDetectionMode,
    pub custom_development_check: Option<CustomDevelopmentCheck>,
    pub bind_all_interfaces: bool,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("port", &self.port)
            .field("max_network_entries", &self.max_network_entries)
            .field("max_console_entries", &self.max_console_entries)
            .field("max_performance_entries", &self.max_performance_entries)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("enable_network_capture", &self.enable_network_capture)
            .field("enable_console_capture", &self.enable_console_capture)
            .field("enable_performance_capture", &self.enable_performance_capture)
            .field("min_log_level", &self.min_log_level)
            .field(
                "performance_sample_interval_ms",
                &self.performance_sample_interval_ms,
            )
            .field("enable_in_development_only", &self.enable_in_development_only)
            .field("development_detection_mode", &self.development_detection_mode)
            .field(
                "custom_development_check",
                &self.custom_development_check.is_some(),
            )
            .field("bind_all_interfaces", &self.bind_all_interfaces)
            .finish()
    }
}

impl Options {
    /// Apply `mutator` to the defaults and freeze the result.
    ///
    /// Fails with `InvalidConfig` if any numeric bound is zero where it must
    /// be positive, or capacities would make the store unusable.
    pub fn build(mutator: impl FnOnce(&mut OptionsBuilder)) -> Result<Options> {
        let mut builder = OptionsBuilder::default();
        mutator(&mut builder);

        if builder.max_network_entries == 0 {
            return Err(SharpInspectError::InvalidConfig(
                "MaxNetworkEntries must be greater than zero".into(),
            ));
        }
        if builder.max_console_entries == 0 {
            return Err(SharpInspectError::InvalidConfig(
                "MaxConsoleEntries must be greater than zero".into(),
            ));
        }
        if builder.max_performance_entries == 0 {
            return Err(SharpInspectError::InvalidConfig(
                "MaxPerformanceEntries must be greater than zero".into(),
            ));
        }
        if builder.performance_sample_interval_ms == 0 {
            return Err(SharpInspectError::InvalidConfig(
                "PerformanceSampleIntervalMs must be greater than zero".into(),
            ));
        }

        builder.freeze()
    }

    pub fn bind_address(&self) -> String {
        let host = if self.bind_all_interfaces {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        };
        format!("{host}:{}", self.port)
    }

    pub fn base_url(&self, actual_port: u16) -> String {
        format!("http://127.0.0.1:{actual_port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = Options::build(|_| {}).unwrap();
        assert_eq!(opts.port, 9229);
        assert_eq!(opts.max_network_entries, 1000);
        assert_eq!(opts.max_console_entries, 1000);
        assert_eq!(opts.max_performance_entries, 500);
        assert_eq!(opts.max_body_bytes, 1024 * 1024);
        assert!(opts.enable_in_development_only);
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = Options::build(|o| {
            o.max_network_entries(0);
        })
        .unwrap_err();
        assert!(matches!(err, SharpInspectError::InvalidConfig(_)));
    }

    #[test]
    fn mutator_overrides_apply() {
        let opts = Options::build(|o| {
            o.port(0).max_network_entries(5).bind_all_interfaces(true);
        })
        .unwrap();
        assert_eq!(opts.port, 0);
        assert_eq!(opts.max_network_entries, 5);
        assert_eq!(opts.bind_address(), "0.0.0.0:0");
    }
}
