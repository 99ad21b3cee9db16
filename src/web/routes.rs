use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::ws::ws_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/media", get(handlers::list_media))
        .route("/media/:name", get(handlers::media_exists))
        .route("/session", get(handlers::session_status))
        .route("/session/reset", post(handlers::session_reset))
        .route("/config", get(handlers::get_all_config))
        .route(
            "/config/media",
            get(handlers::get_media_config).patch(handlers::update_media_config),
        )
        .route(
            "/config/pacing",
            get(handlers::get_pacing_config).patch(handlers::update_pacing_config),
        )
        .route(
            "/config/webrtc",
            get(handlers::get_webrtc_config).patch(handlers::update_webrtc_config),
        )
        // WebSocket endpoint for real-time events
        .route("/ws", any(ws_handler));

    Router::new()
        .route("/", get(handlers::list_media))
        .route("/signal", post(handlers::signal))
        .route("/video", post(handlers::play_video))
        .route("/video/", post(handlers::play_video))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ConfigStore};
    use crate::events::EventBus;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    fn app(media_dir: &TempDir) -> Router {
        let mut config = AppConfig::default();
        config.media.dir = media_dir.path().to_string_lossy().into_owned();
        app_with_store(ConfigStore::in_memory(config))
    }

    fn app_with_store(store: ConfigStore) -> Router {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(store, Arc::new(EventBus::new()), shutdown_tx);
        create_router(state)
    }

    fn patch_json(uri: &str, body: &str) -> Request<Body> {
        Request::patch(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let response = app(&dir)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_listing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("output.ivf"), b"DKIF").unwrap();

        let response = app(&dir)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["videos"][0]["name"], "output.ivf");
        assert_eq!(body["videos"][0]["kind"], "video");
        assert_eq!(body["videos"][0]["size"], 4);
    }

    #[tokio::test]
    async fn test_media_exists() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("output.ogg"), b"OggS").unwrap();
        let app = app(&dir);

        let found = app
            .clone()
            .oneshot(Request::get("/api/media/output.ogg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);

        let missing = app
            .oneshot(Request::get("/api/media/other.ogg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["success"], false);
    }

    #[tokio::test]
    async fn test_signal_rejects_malformed_offer() {
        let dir = TempDir::new().unwrap();
        let response = app(&dir)
            .oneshot(
                Request::post("/signal")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"type\":\"offer\",\"sdp\":"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_play_without_media_is_not_found() {
        let dir = TempDir::new().unwrap();
        let response = app(&dir)
            .oneshot(
                Request::post("/video/?name=missing")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_play_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let response = app(&dir)
            .oneshot(
                Request::post("/video/?name=..%2Fsecret")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_session_reset() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let before = json_body(
            app.clone()
                .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(before["negotiation_state"], "fresh");
        assert_eq!(before["playback"], "idle");

        let after = json_body(
            app.oneshot(
                Request::post("/api/session/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
        )
        .await;
        assert_ne!(before["session_id"], after["session_id"]);
    }

    #[tokio::test]
    async fn test_config_patch_pacing() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let patched = app
            .clone()
            .oneshot(patch_json("/api/config/pacing", r#"{"audio_page_ms":40}"#))
            .await
            .unwrap();
        assert_eq!(patched.status(), StatusCode::OK);
        assert_eq!(json_body(patched).await["audio_page_ms"], 40);

        let current = json_body(
            app.oneshot(Request::get("/api/config/pacing").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(current["audio_page_ms"], 40);
        assert_eq!(current["audio_sample_rate"], 48000);
    }

    #[tokio::test]
    async fn test_config_rejects_invalid_value() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let response = app
            .clone()
            .oneshot(patch_json("/api/config/pacing", r#"{"audio_page_ms":0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);

        let current = json_body(
            app.oneshot(Request::get("/api/config/pacing").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(current["audio_page_ms"], 20);
    }

    #[tokio::test]
    async fn test_config_media_dir_moves_listing() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join("clip.ivf"), b"DKIF").unwrap();
        let app = app(&first);

        let body = serde_json::json!({ "dir": second.path().to_string_lossy() }).to_string();
        let patched = app
            .clone()
            .oneshot(patch_json("/api/config/media", &body))
            .await
            .unwrap();
        assert_eq!(patched.status(), StatusCode::OK);

        let listing = json_body(
            app.oneshot(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listing["videos"][0]["name"], "clip.ivf");
    }

    #[tokio::test]
    async fn test_config_hides_turn_credentials() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let patched = app
            .clone()
            .oneshot(patch_json(
                "/api/config/webrtc",
                r#"{"turn_servers":[{"urls":["turn:turn.example.com:3478"],"username":"user","credential":"secret"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(patched.status(), StatusCode::OK);
        let patched = json_body(patched).await;
        assert_eq!(patched["turn_servers"][0]["urls"][0], "turn:turn.example.com:3478");
        assert_eq!(patched["turn_servers"][0]["credential"], "");

        let all = json_body(
            app.oneshot(Request::get("/api/config").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(all["webrtc"]["turn_servers"][0]["username"], "");
        assert_eq!(all["webrtc"]["turn_servers"][0]["credential"], "");
    }

    #[tokio::test]
    async fn test_config_patch_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rtc-playout.json");
        let app = app_with_store(ConfigStore::load(Some(&path)).await.unwrap());
        assert!(!path.exists());

        let response = app
            .oneshot(patch_json("/api/config/webrtc", r#"{"gathering_timeout_ms":750}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let reloaded = ConfigStore::load(Some(&path)).await.unwrap();
        assert_eq!(reloaded.get().webrtc.gathering_timeout_ms, 750);
    }
}
