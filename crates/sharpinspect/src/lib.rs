//! In-process DevTools-like telemetry sidecar: network, console and
//! performance capture, fanned out over an event bus to bounded stores, a
//! WebSocket broadcaster and a REST/HAR query layer.
//!
//! The public surface is deliberately small: [`initialize`] hands back a
//! [`Handle`] to a lazily-built singleton container, mirroring the teacher's
//! single `AppState` built once in `main` and threaded everywhere — except
//! here construction is triggered by the host's call instead of the crate's
//! own `main`.

mod api;
mod app_info;
mod assets;
mod console_hook;
mod devmode;
mod file_config;
mod har;
mod interceptor;
mod sampler;
mod server;
mod tee_body;
mod tracing_layer;
mod ws_hub;

pub use file_config::SharpInspectFileConfig;
pub use interceptor::{InterceptError, InterceptedClient};
pub use sharpinspect_core::{
    ApplicationInfo, ConsoleEntry, CustomDevelopmentCheck, DevelopmentDetectionMode, LogLevel,
    NetworkEntry, Options, OptionsBuilder, Page, PerformanceEntry, Result, SharpInspectError,
};
pub use tracing_layer::CaptureLayer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sharpinspect_core::{EventBus, Store};

use api::ApiState;
use console_hook::ConsoleHook;
use sampler::PerformanceSampler;
use server::Server;
use ws_hub::WebSocketHub;

type NetworkStore = Store<NetworkEntry>;
type ConsoleStore = Store<ConsoleEntry>;
type PerformanceStore = Store<PerformanceEntry>;

/// Guards against a second live [`Handle`] in the same process (spec §5
/// `Initialize is also idempotent`).
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Everything the running pipeline owns. Dropped in full by [`Handle::shutdown`];
/// nothing here escapes to global mutable state beyond the `INITIALIZED` flag.
struct Container {
    options: Arc<Options>,
    // Held only to keep the ring buffers alive for as long as the hook,
    // sampler, interceptor and API router (all given their own `Arc` clone)
    // are running; never read back through `Container` itself.
    #[allow(dead_code)]
    network: Arc<NetworkStore>,
    #[allow(dead_code)]
    console: Arc<ConsoleStore>,
    #[allow(dead_code)]
    performance: Arc<PerformanceStore>,
    #[allow(dead_code)]
    bus: Arc<EventBus>,
    ws_hub: Arc<WebSocketHub>,
    console_hook: Option<ConsoleHook>,
    sampler: Option<PerformanceSampler>,
    server: Option<Server>,
    client: InterceptedClient,
}

/// Handle returned by [`initialize`]. Dropping it without calling
/// [`Handle::shutdown`] leaves the pipeline running; call `shutdown` for an
/// orderly, awaited teardown (spec §5 Cancellation).
pub struct Handle {
    container: Option<Container>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

impl Handle {
    /// `Some(url)` once the DevTools server is bound, `None` for a no-op
    /// controller (spec S6: dev-mode gate failed, nothing was bound).
    pub fn dev_tools_url(&self) -> Option<String> {
        let container = self.container.as_ref()?;
        let server = container.server.as_ref()?;
        Some(container.options.base_url(server.actual_port()))
    }

    pub fn is_running(&self) -> bool {
        matches!(&self.container, Some(c) if c.server.is_some())
    }

    /// An HTTP client pre-wired with the [`NetworkInterceptor`](interceptor)
    /// (spec §6 `CreateHttpClient`). Works even for a no-op handle: capture
    /// is gated on `options.enable_network_capture`, not on whether the
    /// DevTools server is running.
    pub fn create_http_client(&self) -> Option<InterceptedClient> {
        self.container.as_ref().map(|c| c.client.clone())
    }

    /// Ordered teardown (spec §5): stop accepting connections, close
    /// WebSocket clients with a 1s grace, drop EventBus subscriptions, stop
    /// the sampler, uninstall the console hook, drop the stores. Idempotent:
    /// a second call is a no-op.
    pub async fn shutdown(&mut self) {
        let Some(mut container) = self.container.take() else {
            return;
        };

        if let Some(mut server) = container.server.take() {
            server.shutdown().await;
        }
        container.ws_hub.close_all().await;
        if let Some(mut sampler) = container.sampler.take() {
            sampler.stop().await;
        }
        drop(container.console_hook.take());

        INITIALIZED.store(false, Ordering::SeqCst);
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.container.is_some() {
            INITIALIZED.store(false, Ordering::SeqCst);
        }
    }
}

/// Build and start the capture pipeline (spec §4.1, §6 `Initialize`).
///
/// Fails with [`SharpInspectError::AlreadyInitialized`] if a previous handle
/// from this process hasn't been shut down yet. If the dev-mode gate (spec
/// §4.11) says this process shouldn't run the pipeline, returns a no-op
/// [`Handle`]: no port bound, `dev_tools_url()` is `None`, capture is never
/// installed (spec S6).
pub async fn initialize(mutator: impl FnOnce(&mut OptionsBuilder)) -> Result<Handle> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(SharpInspectError::AlreadyInitialized);
    }

    let options = match Options::build(mutator) {
        Ok(options) => Arc::new(options),
        Err(err) => {
            INITIALIZED.store(false, Ordering::SeqCst);
            return Err(err);
        }
    };

    if !devmode::should_run(&options) {
        INITIALIZED.store(false, Ordering::SeqCst);
        return Ok(Handle { container: None });
    }

    let network: Arc<NetworkStore> = Arc::new(Store::new(options.max_network_entries));
    let console: Arc<ConsoleStore> = Arc::new(Store::new(options.max_console_entries));
    let performance: Arc<PerformanceStore> = Arc::new(Store::new(options.max_performance_entries));
    let bus = Arc::new(EventBus::new());

    let console_hook = if options.enable_console_capture {
        Some(ConsoleHook::install(options.clone(), console.clone(), bus.clone()))
    } else {
        None
    };

    let sampler = if options.enable_performance_capture {
        Some(PerformanceSampler::start(options.clone(), performance.clone(), bus.clone()))
    } else {
        None
    };

    let client = InterceptedClient::new(options.clone(), network.clone(), bus.clone());
    let ws_hub = WebSocketHub::new(bus.clone());

    let api_state = ApiState {
        network: network.clone(),
        console: console.clone(),
        performance: performance.clone(),
        ws_hub: ws_hub.clone(),
        app_info: Arc::new(app_info::collect()),
        started_at: Instant::now(),
    };

    let server = match Server::bind(options.as_ref(), api_state).await {
        Ok(server) => server,
        Err(err) => {
            drop(console_hook);
            INITIALIZED.store(false, Ordering::SeqCst);
            return Err(err);
        }
    };

    Ok(Handle {
        container: Some(Container {
            options,
            network,
            console,
            performance,
            bus,
            ws_hub,
            console_hook,
            sampler,
            server: Some(server),
            client,
        }),
    })
}

/// Same as [`initialize`], but first loads a [`SharpInspectFileConfig`] from
/// `path` and applies it to the builder before `mutator` runs, so `mutator`
/// can still override anything the file set (spec §4.0: file loading is a
/// convenience layered on top of the builder, not a replacement for it).
pub async fn initialize_from_file(
    path: impl AsRef<std::path::Path>,
    mutator: impl FnOnce(&mut OptionsBuilder),
) -> Result<Handle> {
    let file_config = SharpInspectFileConfig::load(path)?;
    initialize(move |builder| {
        file_config.apply(builder);
        mutator(builder);
    })
    .await
}

/// Best-effort open of the DevTools UI in the host's default browser (spec
/// §6 `OpenDevTools`). Failures are swallowed: this is a developer
/// convenience, never load-bearing.
pub fn open_dev_tools(url: &str) {
    if let Err(err) = open::that(url) {
        tracing::warn!(error = %err, url, "sharpinspect: failed to open DevTools in a browser");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn initialize_rejects_a_second_call_without_shutdown() {
        let mut handle = initialize(|o| {
            o.port(0).enable_in_development_only(false);
        })
        .await
        .unwrap();

        let err = initialize(|o| { o.port(0); }).await.unwrap_err();
        assert!(matches!(err, SharpInspectError::AlreadyInitialized));

        handle.shutdown().await;

        // After shutdown, a fresh initialize is allowed again.
        let mut handle2 = initialize(|o| { o.port(0).enable_in_development_only(false); })
            .await
            .unwrap();
        handle2.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn s6_dev_mode_gate_produces_a_noop_handle() {
        std::env::remove_var("DOTNET_ENVIRONMENT");
        std::env::remove_var("ASPNETCORE_ENVIRONMENT");

        let mut handle = initialize(|o| {
            o.port(0)
                .enable_in_development_only(true)
                .development_detection_mode(DevelopmentDetectionMode::EnvironmentVariableOnly);
        })
        .await
        .unwrap();

        assert!(handle.dev_tools_url().is_none());
        assert!(!handle.is_running());
        assert!(handle.create_http_client().is_none());
        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn running_handle_exposes_a_bound_dev_tools_url() {
        let mut handle = initialize(|o| {
            o.port(0).enable_in_development_only(false);
        })
        .await
        .unwrap();

        let url = handle.dev_tools_url().unwrap();
        assert!(url.starts_with("http://127.0.0.1:"));
        assert!(handle.create_http_client().is_some());
        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn initialize_from_file_applies_the_file_then_the_mutator() {
        let path = std::env::temp_dir().join(format!(
            "sharpinspect-test-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "port = 0\nmaxNetworkEntries = 42\n").unwrap();

        let mut handle = initialize_from_file(&path, |o| {
            o.enable_in_development_only(false);
        })
        .await
        .unwrap();

        assert!(handle.is_running());
        handle.shutdown().await;
        std::fs::remove_file(&path).ok();
    }
}
