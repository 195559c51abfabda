use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::{rooms, schemas, serialized, sessions, sse, wheels};

#[derive(OpenApi)]
#[openapi(
    info(
        description = "wheelsync-server exposes endpoints to create rooms and spin their wheels together"
    ),
    paths(
        rooms::list_rooms,
        rooms::create_room,
        rooms::join_room,
        sessions::login,
        sessions::heartbeat,
        sessions::leave,
        wheels::wheel,
        wheels::add_item,
        wheels::edit_item,
        wheels::delete_item,
        wheels::spin,
        sse::event_stream,
    ),
    components(schemas(
        schemas::NewRoomSchema,
        schemas::JoinRoomSchema,
        schemas::SessionSchema,
        schemas::ItemSchema,
        schemas::ItemActionSchema,
        schemas::EditItemSchema,
        schemas::SpinSchema,
        serialized::Room,
        serialized::Joined,
        serialized::WheelItem,
        serialized::Wheel,
        serialized::LoginResult,
        serialized::HeartbeatResult,
        serialized::LeaveResult,
        serialized::EditResult,
        serialized::SpinResult,
        sse::ServerEvent,
    ))
)]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
