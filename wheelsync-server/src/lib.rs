use axum::routing::get;
use log::info;
use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod context;
mod docs;
mod errors;
mod rooms;
mod schemas;
mod serialized;
mod sessions;
mod sse;
mod wheels;

pub use context::*;
pub use errors::StartupError;
pub use sse::{ServerEvent, ServerSentEvents};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Reads the port from `WHEELSYNC_SERVER_PORT`, or falls back to [DEFAULT_PORT]
pub fn port_from_env() -> Result<u16, StartupError> {
    match env::var("WHEELSYNC_SERVER_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .map_err(|_| StartupError::InvalidPort(value)),
        Err(_) => Ok(DEFAULT_PORT),
    }
}

/// Builds every route of the API
pub fn router(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/rooms", rooms::router())
        .nest("/sessions", sessions::router())
        .nest("/wheels", wheels::router())
        .nest("/events", sse::router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context)
}

/// Starts the wheelsync server
pub async fn run_server(context: ServerContext, port: u16) -> Result<(), StartupError> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind { port, source })?;

    info!("Listening on port {}", port);
    axum::serve(listener, router(context)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wheelsync_collab::{Collab, Config};
    use wheelsync_core::{MemoryStore, ManualClock};

    use super::*;

    fn app_with_clock(clock: Arc<ManualClock>) -> axum::Router {
        let store = MemoryStore::with_clock(clock.clone());
        let collab = Collab::new(store, clock, Config::default());

        router(ServerContext::new(Arc::new(collab)))
    }

    fn app() -> axum::Router {
        app_with_clock(Arc::new(ManualClock::default()))
    }

    async fn send(app: &axum::Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, json)
    }

    async fn create_room(app: &axum::Router) -> String {
        let (status, joined) = send(
            app,
            "POST",
            "/v1/rooms",
            json!({ "name": "Quiz", "nickname": "Alice" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        joined["connection"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn taken_nickname_is_a_conflict() {
        let app = app();
        let connection = create_room(&app).await;
        let room_id = connection.split(' ').next().unwrap();

        let (status, _) = send(
            &app,
            "POST",
            "/v1/rooms/join",
            json!({ "roomId": room_id, "nickname": "Alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, joined) = send(
            &app,
            "POST",
            "/v1/rooms/join",
            json!({ "roomId": room_id, "nickname": "Bob" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(joined["connection"], connection.as_str());
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let app = app();

        let (status, _) = send(
            &app,
            "POST",
            "/v1/rooms/join",
            json!({ "roomId": "nope", "nickname": "Bob" }),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn items_need_a_known_color() {
        let app = app();
        let connection = create_room(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            "/v1/wheels/items",
            json!({
                "connection": connection,
                "item": { "optionName": "Pizza", "color": "#ff0000" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/v1/wheels/items",
            json!({
                "connection": connection,
                "item": { "optionName": "Pizza", "color": "#1e293b" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn spinning_an_empty_wheel_is_rejected() {
        let app = app();
        let connection = create_room(&app).await;

        let (status, _) = send(&app, "POST", "/v1/wheels/spin", json!({ "connection": connection })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(
            &app,
            "POST",
            "/v1/wheels/items",
            json!({
                "connection": connection,
                "item": { "optionName": "Tacos", "color": "#334155", "size": 2 }
            }),
        )
        .await;

        let (status, result) = send(&app, "POST", "/v1/wheels/spin", json!({ "connection": connection })).await;
        assert_eq!(status, StatusCode::OK);

        let rotation = result["rotation"].as_f64().unwrap();
        assert!((0. ..360.).contains(&rotation));
    }

    #[tokio::test(start_paused = true)]
    async fn one_spin_at_a_time() {
        let clock = Arc::new(ManualClock::default());
        let app = app_with_clock(clock.clone());
        let connection = create_room(&app).await;

        send(
            &app,
            "POST",
            "/v1/wheels/items",
            json!({
                "connection": connection,
                "item": { "optionName": "Tacos", "color": "#334155" }
            }),
        )
        .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let uri = format!("/v1/wheels?connection={}", connection.replace(' ', "%20"));
        let (status, wheel) = send(&app, "GET", &uri, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wheel["items"][0]["optionName"], "Tacos");
        assert_eq!(wheel["canSpin"], true);

        clock.advance(chrono::Duration::seconds(1));
        let spin = json!({ "connection": connection });

        let (status, _) = send(&app, "POST", "/v1/wheels/spin", spin.clone()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "POST", "/v1/wheels/spin", spin.clone()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let (_, wheel) = send(&app, "GET", &uri, Value::Null).await;
        assert_eq!(wheel["spinning"], true);

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        let (_, wheel) = send(&app, "GET", &uri, Value::Null).await;
        assert_eq!(wheel["spinning"], false);

        clock.advance(chrono::Duration::seconds(1));
        let (status, _) = send(&app, "POST", "/v1/wheels/spin", spin).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn last_player_leaving_closes_the_room() {
        let clock = Arc::new(ManualClock::default());
        let app = app_with_clock(clock.clone());
        let connection = create_room(&app).await;
        let session = json!({ "connection": connection, "nickname": "Alice" });

        let (status, registered) = send(&app, "POST", "/v1/sessions/login", session.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(registered["registered"], false);

        clock.advance(chrono::Duration::seconds(2));

        let (status, outcome) = send(&app, "POST", "/v1/sessions/leave", session.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, json!("closed-room"));

        let (_, outcome) = send(&app, "POST", "/v1/sessions/leave", session).await;
        assert_eq!(outcome, json!("already-gone"));
    }

    #[tokio::test]
    async fn serves_the_api_document() {
        let app = app();
        let request = Request::builder().uri("/api.json").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let document: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(document["paths"]["/v1/wheels/spin"].is_object());
    }
}
