use sharpinspect_core::{DevelopmentDetectionMode, Options};

/// Decide whether the capture pipeline should run this process (spec §4.11).
///
/// `EnableInDevelopmentOnly = false` short-circuits to `true` — the gate
/// itself, not the detector, governs whether detection even runs.
pub fn should_run(options: &Options) -> bool {
    if !options.enable_in_development_only {
        return true;
    }
    match options.development_detection_mode {
        DevelopmentDetectionMode::Auto => {
            env_says_development().unwrap_or_else(debugger_attached)
        }
        DevelopmentDetectionMode::EnvironmentVariableOnly => {
            env_says_development().unwrap_or(false)
        }
        DevelopmentDetectionMode::DebuggerOnly => debugger_attached(),
        DevelopmentDetectionMode::Custom => match &options.custom_development_check {
            Some(check) => check(),
            None => env_says_development().unwrap_or_else(debugger_attached),
        },
    }
}

/// `Some(true/false)` if either environment variable is set, `None` if
/// neither is (spec §4.11, §6 "Environment variables read").
fn env_says_development() -> Option<bool> {
    for var in ["DOTNET_ENVIRONMENT", "ASPNETCORE_ENVIRONMENT"] {
        if let Ok(value) = std::env::var(var) {
            return Some(value.eq_ignore_ascii_case("Development"));
        }
    }
    None
}

/// Best-effort debugger-attached probe. Rust has no portable equivalent of
/// `Debugger.IsAttached`; on Linux we check `TracerPid` in `/proc/self/status`
/// (the same technique `gdb`/`strace` detectors use), elsewhere we
/// conservatively report `false` (documented as DESIGN.md OQ-4).
fn debugger_attached() -> bool {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(value) = line.strip_prefix("TracerPid:") {
                    return value.trim().parse::<u32>().unwrap_or(0) != 0;
                }
            }
        }
        false
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
