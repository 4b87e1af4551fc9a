//! Sample embedding of sharpinspect. Grounded on the teacher's
//! `demo-backend` (the upstream routes and simulated latency are copied
//! nearly verbatim) plus `proxy-server`'s pattern of forwarding a request
//! through a shared client — except here the client is the one
//! `sharpinspect::create_http_client` hands back, so every call to the
//! upstream shows up in the DevTools network feed.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use sharpinspect::InterceptedClient;
use tracing_subscriber::EnvFilter;

async fn upstream_get_item(Path(id): Path<u64>) -> Json<Value> {
    let delay = rand::thread_rng().gen_range(5..=20);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    Json(json!({
        "id": id,
        "name": format!("Item {id}"),
        "data": "x".repeat(256),
        "latency_ms": delay,
    }))
}

async fn upstream_health() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    client: InterceptedClient,
    upstream_base: String,
}

async fn get_item(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, StatusCode> {
    let url = format!("{}/api/items/{id}", state.upstream_base);
    let req = Request::builder()
        .method("GET")
        .uri(url)
        .body(Body::empty())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let response = state.client.request(req).await.map_err(|err| {
        tracing::warn!(error = %err, id, "upstream request failed");
        StatusCode::BAD_GATEWAY
    })?;

    let body = http_body_util::BodyExt::collect(response.into_body())
        .await
        .map_err(|_| StatusCode::BAD_GATEWAY)?
        .to_bytes();
    serde_json::from_slice(&body).map(Json).map_err(|_| StatusCode::BAD_GATEWAY)
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut handle = sharpinspect::initialize(|o| {
        o.port(9222).enable_in_development_only(false);
    })
    .await
    .expect("sharpinspect failed to start");

    if let Some(url) = handle.dev_tools_url() {
        tracing::info!(url, "sharpinspect DevTools listening");
    }

    let upstream_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind upstream listener");
    let upstream_base = format!("http://{}", upstream_listener.local_addr().unwrap());
    let upstream_app = Router::new()
        .route("/api/items/{id}", get(upstream_get_item))
        .route("/health", get(upstream_health));
    tokio::spawn(async move {
        axum::serve(upstream_listener, upstream_app).await.unwrap();
    });

    let client = handle
        .create_http_client()
        .expect("network capture is disabled; host-app needs it enabled to demonstrate interception");
    let state = AppState { client, upstream_base };

    let app = Router::new()
        .route("/api/items/{id}", get(get_item))
        .route("/health", get(health))
        .with_state(state);

    let addr = "0.0.0.0:3000";
    tracing::info!(addr, "host-app starting");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "host-app server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    handle.shutdown().await;
}
