use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use wheelsync_collab::{JoinRoom, NewRoom};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{JoinRoomSchema, NewRoomSchema, ValidatedJson},
    serialized::{Joined, Room, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    responses(
        (status = 200, body = Vec<Room>, description = "Rooms with at least one active player")
    )
)]
async fn list_rooms(context: ServerContext) -> impl IntoResponse {
    Json(context.collab.active_rooms().to_serialized())
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    responses(
        (status = 200, body = Joined),
        (status = 400, description = "The name, nickname or password is invalid")
    )
)]
async fn create_room(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Joined>> {
    let joined = context
        .collab
        .create_room(NewRoom {
            name: body.name,
            password: body.password,
            nickname: body.nickname,
        })
        .await?;

    Ok(Json(joined.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/join",
    tag = "rooms",
    request_body = JoinRoomSchema,
    responses(
        (status = 200, body = Joined),
        (status = 403, description = "The password is wrong"),
        (status = 404, description = "The room doesn't exist"),
        (status = 409, description = "The nickname is taken in this room")
    )
)]
async fn join_room(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<JoinRoomSchema>,
) -> ServerResult<Json<Joined>> {
    let joined = context
        .collab
        .join_room(JoinRoom {
            room_id: body.room_id,
            password: body.password,
            nickname: body.nickname,
        })
        .await?;

    Ok(Json(joined.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms))
        .route("/", post(create_room))
        .route("/join", post(join_room))
}
