//! Outbound HTTP client wrapper that records every request/response into the
//! network store without altering what the caller receives (spec §4.5).
//!
//! Grounded on the teacher's `proxy-server` client plumbing
//! (`HttpClient = hyper_util::client::legacy::Client<HttpConnector, Body>`,
//! built once and shared via `Arc`): the difference here is the interceptor
//! tees the response body through [`crate::tee_body::TeeBody`] instead of
//! buffering it, so capture can never delay or truncate what the caller
//! reads.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as TransportError};
use hyper_util::rt::TokioExecutor;
use sharpinspect_core::{
    cap_body, EventBus, HeaderBag, NetworkEntry, NetworkEntryEvent, Options, SharedClock, Store,
};
use uuid::Uuid;

use crate::tee_body::TeeBody;

type NetworkStore = Store<NetworkEntry>;

/// The underlying transport, built once per [`InterceptedClient`] and reused
/// across requests (same shape as the teacher's `AppState.client`).
pub type InnerClient = Client<HttpConnector, Body>;

/// Errors returned by [`InterceptedClient::request`]. `RequestBody` has no
/// counterpart in the teacher (it always had a full request in hand); it
/// exists here because an interceptor-owned client has to read the caller's
/// request body itself before it can both forward and cap it.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("failed to read request body: {0}")]
    RequestBody(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// An HTTP client pre-wired to capture request/response metadata (spec §6
/// `CreateHttpClient`). Cheap to clone; the transport and capture plumbing
/// are all behind `Arc`/a cloneable `hyper_util` client.
#[derive(Clone)]
pub struct InterceptedClient {
    inner: InnerClient,
    options: Arc<Options>,
    store: Arc<NetworkStore>,
    bus: Arc<EventBus>,
    clock: SharedClock,
}

impl InterceptedClient {
    pub fn new(options: Arc<Options>, store: Arc<NetworkStore>, bus: Arc<EventBus>) -> Self {
        Self::with_clock(options, store, bus, sharpinspect_core::system_clock())
    }

    pub fn with_clock(
        options: Arc<Options>,
        store: Arc<NetworkStore>,
        bus: Arc<EventBus>,
        clock: SharedClock,
    ) -> Self {
        let inner = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            inner,
            options,
            store,
            bus,
            clock,
        }
    }

    /// Send `req`. The returned response's body yields exactly the bytes the
    /// upstream sent, in the same order — capture only ever mirrors what
    /// flows past, it never substitutes a buffered copy (spec §8 testable
    /// property: "NetworkInterceptor preserves response bytes").
    pub async fn request(&self, req: Request<Body>) -> Result<Response<Body>, InterceptError> {
        if !self.options.enable_network_capture {
            return self
                .inner
                .request(req)
                .await
                .map(|response| response.map(Body::new))
                .map_err(InterceptError::Transport);
        }

        let start = self.clock.monotonic_now();
        let request_id = Uuid::new_v4();
        let method = req.method().to_string();
        let uri = req.uri().clone();
        let url = uri.to_string();
        let query_string = uri.query().unwrap_or("").to_string();
        let protocol = format!("{:?}", req.version());
        let request_headers = collect_headers(req.headers());
        let request_content_type = header_value(req.headers(), "content-type");
        let request_content_length = header_value(req.headers(), "content-length")
            .and_then(|v| v.parse::<u64>().ok());

        let (parts, body) = req.into_parts();
        let body_bytes = match http_body_util::BodyExt::collect(body).await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                let mut entry = NetworkEntry::opening(
                    request_id,
                    method,
                    url,
                    query_string,
                    protocol,
                    request_headers,
                    request_content_type,
                    request_content_length,
                    None,
                    self.clock.now_utc(),
                );
                entry.is_error = true;
                entry.error_message = Some(format!("failed to read request body: {err}"));
                entry.total_ms = elapsed_ms(start);
                entry.is_complete = true;
                self.seal_and_publish(entry);
                return Err(InterceptError::RequestBody(err.to_string()));
            }
        };

        let (request_body, _truncated) = cap_body(&body_bytes, self.options.max_body_bytes);
        let mut entry = NetworkEntry::opening(
            request_id,
            method,
            url,
            query_string,
            protocol,
            request_headers,
            request_content_type,
            request_content_length,
            request_body,
            self.clock.now_utc(),
        );

        let outgoing = Request::from_parts(parts, Body::from(body_bytes));

        let response = match self.inner.request(outgoing).await {
            Ok(response) => response,
            Err(err) => {
                entry.is_error = true;
                entry.error_message = Some(err.to_string());
                entry.total_ms = elapsed_ms(start);
                entry.is_complete = true;
                self.seal_and_publish(entry);
                return Err(InterceptError::Transport(err));
            }
        };

        entry.status_code = response.status().as_u16();
        entry.status_text = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        entry.response_headers = collect_headers(response.headers());
        entry.response_content_type = header_value(response.headers(), "content-type");
        entry.response_content_length =
            header_value(response.headers(), "content-length").and_then(|v| v.parse().ok());

        let (parts, body) = response.into_parts();
        let body = Body::new(body);

        let store = self.store.clone();
        let bus = self.bus.clone();
        let max_body_bytes = self.options.max_body_bytes;
        let tee = TeeBody::new(
            body,
            max_body_bytes,
            Box::new(move |captured: Vec<u8>| {
                let (response_body, _truncated) = cap_body(&captured, max_body_bytes);
                let mut entry = entry;
                entry.response_body = response_body;
                entry.total_ms = elapsed_ms(start);
                entry.is_complete = true;
                let (_id, sealed) = store.append_and_get(|id| {
                    let mut e = entry.clone();
                    e.id = id;
                    e
                });
                bus.network.publish_async(NetworkEntryEvent(sealed));
            }),
        );

        Ok(Response::from_parts(parts, Body::new(tee)))
    }

    fn seal_and_publish(&self, entry: NetworkEntry) {
        let (_id, sealed) = self.store.append_and_get(|id| {
            let mut e = entry.clone();
            e.id = id;
            e
        });
        self.bus.network.publish_async(NetworkEntryEvent(sealed));
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn collect_headers(headers: &HeaderMap) -> HeaderBag {
    let mut bag = HeaderBag::new();
    for (name, value) in headers.iter() {
        bag.append(name.as_str(), value.to_str().unwrap_or("").to_string());
    }
    bag
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::Router;
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use sharpinspect_core::{EventBus, FixedClock};
    use tokio::net::TcpListener;

    async fn spawn_echo_server() -> String {
        let app = Router::new()
            .route(
                "/echo",
                post(|body: Bytes| async move { body.to_vec().into_response() }),
            )
            .route(
                "/fail",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn caller_receives_byte_identical_response_regardless_of_capture_cap() {
        let base = spawn_echo_server().await;
        let options = Arc::new(
            Options::build(|o| {
                o.max_body_bytes(4); // tiny cap: forwarded bytes must still be the full payload
            })
            .unwrap(),
        );
        let store: Arc<NetworkStore> = Arc::new(Store::new(10));
        let bus = Arc::new(EventBus::new());
        let client = InterceptedClient::new(options, store.clone(), bus);

        let payload = b"hello world, this is longer than the cap".to_vec();
        let req = Request::builder()
            .method("POST")
            .uri(format!("{base}/echo"))
            .body(Body::from(payload.clone()))
            .unwrap();

        let response = client.request(req).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.to_vec(), payload);

        // give the tee's on_complete a moment to run after the body finished
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.count(), 1);
        let entry = store.snapshot().remove(0);
        assert!(entry.is_complete);
        assert!(entry.response_body.unwrap().ends_with("[truncated]"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_2xx_status_is_captured_without_being_treated_as_transport_error() {
        let base = spawn_echo_server().await;
        let options = Arc::new(Options::build(|_| {}).unwrap());
        let store: Arc<NetworkStore> = Arc::new(Store::new(10));
        let bus = Arc::new(EventBus::new());
        let client = InterceptedClient::new(options, store.clone(), bus);

        let req = Request::builder()
            .uri(format!("{base}/fail"))
            .body(Body::empty())
            .unwrap();
        let response = client.request(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let entry = store.snapshot().remove(0);
        assert!(!entry.is_error);
        assert_eq!(entry.status_code, 500);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connection_failure_seals_an_error_entry() {
        let options = Arc::new(Options::build(|_| {}).unwrap());
        let store: Arc<NetworkStore> = Arc::new(Store::new(10));
        let bus = Arc::new(EventBus::new());
        let client = InterceptedClient::new(options, store.clone(), bus);

        let req = Request::builder()
            .uri("http://127.0.0.1:1") // nothing listens here
            .body(Body::empty())
            .unwrap();
        let result = client.request(req).await;
        assert!(result.is_err());

        let entry = store.snapshot().remove(0);
        assert!(entry.is_error);
        assert_eq!(entry.status_code, 0);
        assert!(entry.is_complete);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn injected_clock_supplies_the_entry_timestamp() {
        let base = spawn_echo_server().await;
        let options = Arc::new(Options::build(|_| {}).unwrap());
        let store: Arc<NetworkStore> = Arc::new(Store::new(10));
        let bus = Arc::new(EventBus::new());
        let fixed_utc = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let clock: SharedClock = Arc::new(FixedClock { fixed_utc });
        let client = InterceptedClient::with_clock(options, store.clone(), bus, clock);

        let req = Request::builder()
            .uri(format!("{base}/fail"))
            .body(Body::empty())
            .unwrap();
        client.request(req).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let entry = store.snapshot().remove(0);
        assert_eq!(entry.timestamp, fixed_utc);
    }
}
