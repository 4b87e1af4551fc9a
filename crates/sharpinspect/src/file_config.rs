//! TOML file loading for [`Options`] (SPEC_FULL.md §4.0), grounded on the
//! teacher's `config.rs` (`toml::from_str` into a plain struct, read once at
//! startup). Additive: `sharpinspect::initialize` remains the primary path;
//! this only covers the POD subset of `Options` — `CustomDevelopmentCheck`
//! is a closure and has no TOML representation.

use std::path::Path;

use serde::Deserialize;
use sharpinspect_core::{DevelopmentDetectionMode, LogLevel, OptionsBuilder, Result, SharpInspectError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
enum FileDevelopmentDetectionMode {
    Auto,
    EnvironmentVariableOnly,
    DebuggerOnly,
}

impl From<FileDevelopmentDetectionMode> for DevelopmentDetectionMode {
    fn from(mode: FileDevelopmentDetectionMode) -> Self {
        match mode {
            FileDevelopmentDetectionMode::Auto => DevelopmentDetectionMode::Auto,
            FileDevelopmentDetectionMode::EnvironmentVariableOnly => {
                DevelopmentDetectionMode::EnvironmentVariableOnly
            }
            FileDevelopmentDetectionMode::DebuggerOnly => DevelopmentDetectionMode::DebuggerOnly,
        }
    }
}

/// The POD subset of [`Options`](sharpinspect_core::Options) a TOML file can set.
/// Every field is optional; an absent field leaves whatever the builder
/// already had (its default, or a value [`Self::apply`] is layered under).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharpInspectFileConfig {
    port: Option<u16>,
    max_network_entries: Option<usize>,
    max_console_entries: Option<usize>,
    max_performance_entries: Option<usize>,
    max_body_bytes: Option<usize>,
    enable_network_capture: Option<bool>,
    enable_console_capture: Option<bool>,
    enable_performance_capture: Option<bool>,
    min_log_level: Option<LogLevel>,
    performance_sample_interval_ms: Option<u64>,
    enable_in_development_only: Option<bool>,
    development_detection_mode: Option<FileDevelopmentDetectionMode>,
    bind_all_interfaces: Option<bool>,
}

impl SharpInspectFileConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| SharpInspectError::InvalidConfig(format!("invalid config TOML: {err}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SharpInspectError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply every field this file set onto `builder`. Fields the file left
    /// out are untouched, so this composes under a mutator that sets them
    /// some other way.
    pub fn apply(self, builder: &mut OptionsBuilder) {
        if let Some(v) = self.port {
            builder.port(v);
        }
        if let Some(v) = self.max_network_entries {
            builder.max_network_entries(v);
        }
        if let Some(v) = self.max_console_entries {
            builder.max_console_entries(v);
        }
        if let Some(v) = self.max_performance_entries {
            builder.max_performance_entries(v);
        }
        if let Some(v) = self.max_body_bytes {
            builder.max_body_bytes(v);
        }
        if let Some(v) = self.enable_network_capture {
            builder.enable_network_capture(v);
        }
        if let Some(v) = self.enable_console_capture {
            builder.enable_console_capture(v);
        }
        if let Some(v) = self.enable_performance_capture {
            builder.enable_performance_capture(v);
        }
        if let Some(v) = self.min_log_level {
            builder.min_log_level(v);
        }
        if let Some(v) = self.performance_sample_interval_ms {
            builder.performance_sample_interval_ms(v);
        }
        if let Some(v) = self.enable_in_development_only {
            builder.enable_in_development_only(v);
        }
        if let Some(v) = self.development_detection_mode {
            builder.development_detection_mode(v.into());
        }
        if let Some(v) = self.bind_all_interfaces {
            builder.bind_all_interfaces(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_only_the_fields_the_file_set() {
        let config = SharpInspectFileConfig::from_toml_str(
            r#"
            port = 9300
            minLogLevel = "Warning"
            developmentDetectionMode = "EnvironmentVariableOnly"
            "#,
        )
        .unwrap();

        let options = sharpinspect_core::Options::build(|builder| {
            config.apply(builder);
        })
        .unwrap();

        assert_eq!(options.port, 9300);
        assert_eq!(options.min_log_level, LogLevel::Warning);
        assert_eq!(
            options.development_detection_mode,
            DevelopmentDetectionMode::EnvironmentVariableOnly
        );
        // untouched fields keep their OptionsBuilder default
        assert_eq!(options.max_network_entries, 1000);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = SharpInspectFileConfig::from_toml_str("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, SharpInspectError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_unrecognized_enum_variant() {
        let err = SharpInspectFileConfig::from_toml_str("minLogLevel = \"Verbose\"").unwrap_err();
        assert!(matches!(err, SharpInspectError::InvalidConfig(_)));
    }
}
