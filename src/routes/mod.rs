//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket game sessions at `/ws`
/// - player, rating and data endpoints under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/player", get(http::http_get_player).post(http::http_post_player).delete(http::http_delete_player))
        .route("/api/v1/rating", get(http::http_get_rating).delete(http::http_delete_rating))
        .route("/api/v1/rating/last", get(http::http_get_last_result))
        .route("/api/v1/data", axum::routing::delete(http::http_delete_data))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::domain::{Difficulty, FinishReason, RatingRecord};
    use crate::logic::persist_result;

    fn record(name: &str, score: i64) -> RatingRecord {
        RatingRecord {
            name: name.into(),
            score,
            max_level: 2,
            difficulty: Difficulty::Medium,
            date: "2024-05-01 10:00".into(),
            reason: FinishReason::Manual,
        }
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let (status, body) = call(app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn player_name_is_validated_then_bound() {
        let state = Arc::new(AppState::in_memory());
        let (status, body) = call(build_router(state.clone()), "POST", "/api/v1/player", Some(json!({ "name": "!" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = call(build_router(state.clone()), "POST", "/api/v1/player", Some(json!({ "name": " Ann " }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Ann");

        let (_, body) = call(build_router(state.clone()), "GET", "/api/v1/player", None).await;
        assert_eq!(body["name"], "Ann");

        let (status, _) = call(build_router(state.clone()), "DELETE", "/api/v1/player", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.storage.current_player().is_none());
    }

    #[tokio::test]
    async fn rating_is_ranked_and_sortable() {
        let state = Arc::new(AppState::in_memory());
        for (name, score) in [("Bob", 40), ("Ann", 90), ("Cid", 10)] {
            persist_result(&state.storage, &record(name, score)).unwrap();
        }

        let (_, body) = call(build_router(state.clone()), "GET", "/api/v1/rating", None).await;
        assert_eq!(body["sort"], "score");
        assert_eq!(body["dir"], "desc");
        assert_eq!(body["rows"][0]["name"], "Ann");
        assert_eq!(body["rows"][0]["rank"], 1);
        assert_eq!(body["rows"][0]["maxLevel"], 2);

        let (_, body) = call(build_router(state.clone()), "GET", "/api/v1/rating?sort=name&dir=asc", None).await;
        let names: Vec<&str> = body["rows"].as_array().unwrap().iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Ann", "Bob", "Cid"]);

        let (_, body) = call(build_router(state.clone()), "GET", "/api/v1/rating?sort=name&dir=asc&toggle=name", None).await;
        assert_eq!(body["dir"], "desc");
        assert_eq!(body["rows"][0]["name"], "Cid");

        let (status, _) = call(build_router(state.clone()), "DELETE", "/api/v1/rating", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.storage.rating_list().is_empty());
    }

    #[tokio::test]
    async fn last_result_and_data_wipe() {
        let state = Arc::new(AppState::in_memory());
        state.storage.set_current_player("Bob").unwrap();
        persist_result(&state.storage, &record("Bob", 70)).unwrap();

        let (_, body) = call(build_router(state.clone()), "GET", "/api/v1/rating/last", None).await;
        assert_eq!(body["record"]["score"], 70);
        assert_eq!(body["bestScore"], 70);

        let (status, _) = call(build_router(state.clone()), "DELETE", "/api/v1/data", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = call(build_router(state), "GET", "/api/v1/rating/last", None).await;
        assert_eq!(body, json!({ "record": null, "bestScore": null }));
    }
}
