use axum::{routing::post, Json};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{SessionSchema, ValidatedJson},
    serialized::{HeartbeatResult, LeaveResult, LoginResult, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/sessions/login",
    tag = "sessions",
    request_body = SessionSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 404, description = "The room doesn't exist anymore")
    )
)]
async fn login(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<SessionSchema>,
) -> ServerResult<Json<LoginResult>> {
    let registered = context.collab.login(&body.joined()?).await?;

    Ok(Json(LoginResult::new(registered)))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/heartbeat",
    tag = "sessions",
    request_body = SessionSchema,
    responses(
        (status = 200, body = HeartbeatResult),
        (status = 404, description = "The room doesn't exist anymore")
    )
)]
async fn heartbeat(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<SessionSchema>,
) -> ServerResult<Json<HeartbeatResult>> {
    let pruned = context.collab.heartbeat(&body.joined()?).await?;

    Ok(Json(HeartbeatResult::new(pruned)))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/leave",
    tag = "sessions",
    request_body = SessionSchema,
    responses(
        (status = 200, body = LeaveResult)
    )
)]
async fn leave(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<SessionSchema>,
) -> ServerResult<Json<LeaveResult>> {
    let outcome = context.collab.leave_room(&body.joined()?).await?;

    Ok(Json(outcome.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/heartbeat", post(heartbeat))
        .route("/leave", post(leave))
}
