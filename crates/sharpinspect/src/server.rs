//! HTTP server lifecycle (spec §4.10 `Server`, §5 shutdown ordering).
//!
//! Binding and `axum::serve` driving follow the teacher's `main.rs`
//! (`TcpListener::bind` then `axum::serve`), generalized into a type the
//! facade can start once and shut down on command instead of running
//! directly off `main`.

use sharpinspect_core::{Options, Result, SharpInspectError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::ApiState;

/// An accepting HTTP server bound to a concrete port, owning the task that
/// drives it. `actual_port()` differs from `options.port` when port `0` was
/// requested (bind-to-any-free-port).
pub struct Server {
    actual_port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("actual_port", &self.actual_port)
            .finish_non_exhaustive()
    }
}

impl Server {
    pub async fn bind(options: &Options, state: ApiState) -> Result<Self> {
        let addr = options.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| SharpInspectError::PortInUse { addr: addr.clone(), source })?;
        let actual_port = listener
            .local_addr()
            .map_err(|source| SharpInspectError::PortInUse { addr, source })?
            .port();

        let router = crate::api::router(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = result {
                tracing::error!(error = %err, "sharpinspect DevTools server exited with an error");
            }
        });

        Ok(Self {
            actual_port,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub fn actual_port(&self) -> u16 {
        self.actual_port
    }

    /// Stop accepting new connections and wait for the server task to exit
    /// (spec §5 shutdown step 1). Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}
