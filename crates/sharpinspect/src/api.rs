//! REST + WebSocket surface (spec §4.10). Handlers follow the teacher's
//! `metrics.rs` shape: plain async functions taking `State<ApiState>`,
//! returning `impl IntoResponse`, JSON bodies built with `serde_json::json!`
//! where a one-off shape doesn't warrant its own struct.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sharpinspect_core::{ApplicationInfo, ConsoleEntry, LogLevel, NetworkEntry, PerformanceEntry, Store};
use std::str::FromStr;

use crate::har;
use crate::ws_hub::WebSocketHub;

type NetworkStore = Store<NetworkEntry>;
type ConsoleStore = Store<ConsoleEntry>;
type PerformanceStore = Store<PerformanceEntry>;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct ApiState {
    pub network: Arc<NetworkStore>,
    pub console: Arc<ConsoleStore>,
    pub performance: Arc<PerformanceStore>,
    pub ws_hub: Arc<WebSocketHub>,
    pub app_info: Arc<ApplicationInfo>,
    pub started_at: Instant,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/network", get(list_network).delete(clear_network))
        .route("/api/network/har", get(network_har))
        .route("/api/network/{id}", get(get_network_entry))
        .route("/api/console", get(list_console).delete(clear_console))
        .route("/api/performance", get(list_performance))
        .route("/api/info", get(info_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .fallback_service(crate::assets::service())
}

async fn status_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "consoleEntryCount": state.console.count(),
        "networkEntryCount": state.network.count(),
        "performanceEntryCount": state.performance.count(),
        "webSocketClients": state.ws_hub.client_count(),
    }))
}

#[derive(Default)]
struct PageQuery {
    offset: Option<String>,
    limit: Option<String>,
}

fn parse_paging(query: &PageQuery) -> Result<(usize, usize), Response> {
    let offset = match &query.offset {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| bad_request(format!("invalid offset: {raw}")))?,
        None => 0,
    };
    let limit = match &query.limit {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| bad_request(format!("invalid limit: {raw}")))?
            .min(MAX_LIMIT),
        None => DEFAULT_LIMIT,
    };
    Ok((offset, limit))
}

async fn list_network(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let paging = PageQuery {
        offset: params.get("offset").cloned(),
        limit: params.get("limit").cloned(),
    };
    let (offset, limit) = match parse_paging(&paging) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let url_filter = params.get("url").cloned();
    let method_filter = params.get("method").cloned();
    let status_filter = match params.get("status") {
        Some(raw) => match sharpinspect_core::StatusClass::from_str(raw) {
            Ok(class) => Some(class),
            Err(_) => return bad_request(format!("invalid status filter: {raw}")),
        },
        None => None,
    };

    let filter = move |entry: &NetworkEntry| -> bool {
        if let Some(url) = &url_filter {
            if !entry.url.to_ascii_lowercase().contains(&url.to_ascii_lowercase()) {
                return false;
            }
        }
        if let Some(method) = &method_filter {
            if !entry.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(class) = status_filter {
            if entry.status_class() != class {
                return false;
            }
        }
        true
    };

    let page = state.network.page(offset, limit, Some(&filter));
    Json(page).into_response()
}

async fn get_network_entry(State(state): State<ApiState>, Path(id): Path<u64>) -> Response {
    match state.network.snapshot().into_iter().find(|e| e.id == id) {
        Some(entry) => Json(entry).into_response(),
        None => not_found(format!("no network entry with id {id}")),
    }
}

async fn clear_network(State(state): State<ApiState>) -> impl IntoResponse {
    state.network.clear();
    Json(json!({ "success": true, "message": "network store cleared" }))
}

async fn network_har(State(state): State<ApiState>) -> Response {
    let entries = state.network.snapshot();
    let root = har::export(&entries);
    Json(root).into_response()
}

async fn list_console(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let paging = PageQuery {
        offset: params.get("offset").cloned(),
        limit: params.get("limit").cloned(),
    };
    let (offset, limit) = match parse_paging(&paging) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let min_level = match params.get("level") {
        Some(raw) => match LogLevel::from_str(raw) {
            Ok(level) => Some(level),
            Err(_) => return bad_request(format!("invalid level filter: {raw}")),
        },
        None => None,
    };
    let category_filter = params.get("category").cloned();
    let search_filter = params.get("search").cloned();

    let filter = move |entry: &ConsoleEntry| -> bool {
        if let Some(level) = min_level {
            if entry.level < level {
                return false;
            }
        }
        if let Some(category) = &category_filter {
            if !entry
                .category
                .to_ascii_lowercase()
                .contains(&category.to_ascii_lowercase())
            {
                return false;
            }
        }
        if let Some(search) = &search_filter {
            if !entry
                .message
                .to_ascii_lowercase()
                .contains(&search.to_ascii_lowercase())
            {
                return false;
            }
        }
        true
    };

    let page = state.console.page(offset, limit, Some(&filter));
    Json(page).into_response()
}

async fn clear_console(State(state): State<ApiState>) -> impl IntoResponse {
    state.console.clear();
    Json(json!({ "success": true, "message": "console store cleared" }))
}

async fn list_performance(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let paging = PageQuery {
        offset: params.get("offset").cloned(),
        limit: params.get("limit").cloned(),
    };
    let (offset, limit) = match parse_paging(&paging) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let page = state.performance.page(offset, limit, None);
    Json(page).into_response()
}

async fn info_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let info: &ApplicationInfo = &state.app_info;
    Json(info.clone())
}

async fn ws_handler(State(state): State<ApiState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        state.ws_hub.handle_socket(socket).await;
    })
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() }))).into_response()
}

fn not_found(message: impl Into<String>) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message.into() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use sharpinspect_core::{EventBus, HeaderBag};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_state() -> ApiState {
        let network: Arc<NetworkStore> = Arc::new(Store::new(3));
        let console: Arc<ConsoleStore> = Arc::new(Store::new(100));
        let performance: Arc<PerformanceStore> = Arc::new(Store::new(100));
        let bus = Arc::new(EventBus::new());
        ApiState {
            network,
            console,
            performance,
            ws_hub: WebSocketHub::new(bus),
            app_info: Arc::new(ApplicationInfo {
                assembly_name: "test".into(),
                runtime_version: "0".into(),
                process_id: 0,
                processor_count: 1,
                environment_variables: Default::default(),
                loaded_assemblies: vec![],
            }),
            started_at: Instant::now(),
        }
    }

    fn network_entry(url: &str, status: u16, is_error: bool) -> NetworkEntry {
        let mut entry = NetworkEntry::opening(
            Uuid::new_v4(),
            "GET".into(),
            url.into(),
            String::new(),
            "HTTP/1.1".into(),
            HeaderBag::new(),
            None,
            None,
            None,
            Utc::now(),
        );
        entry.status_code = status;
        entry.is_error = is_error;
        entry.is_complete = true;
        entry
    }

    #[tokio::test]
    async fn s1_capture_and_page_over_http() {
        let state = test_state();
        for url in ["a", "b", "c", "d", "e"] {
            state.network.append(|id| {
                let mut e = network_entry(url, 200, false);
                e.id = id;
                e
            });
        }
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/network?offset=0&limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(page["total"], 3);
        assert_eq!(page["items"][0]["url"], "e");
        assert_eq!(page["items"][1]["url"], "d");
        assert_eq!(page["items"][2]["url"], "c");
    }

    #[tokio::test]
    async fn s2_filter_by_status_class() {
        let mut state = test_state();
        let store: Arc<NetworkStore> = Arc::new(Store::new(10));
        for (status, is_error) in [(200, false), (404, false), (500, false), (0, true)] {
            store.append(|id| {
                let mut e = network_entry("x", status, is_error);
                e.id = id;
                e
            });
        }
        state.network = store;

        let app = router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/network?status=4xx")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["statusCode"], 404);

        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/network?status=error")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["isError"], true);
    }

    #[tokio::test]
    async fn unknown_network_id_is_404_with_error_body() {
        let state = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/network/999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value.get("error").is_some());
    }

    #[tokio::test]
    async fn unsupported_method_is_405() {
        let state = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/network")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
