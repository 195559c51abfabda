use axum::{
    extract::Query,
    routing::{get, post},
    Json,
};
use wheelsync_collab::{EditOutcome, WheelItem};

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{
        parse_connection, EditItemSchema, ItemActionSchema, SpinSchema, ValidatedJson, WheelQuery,
    },
    serialized::{EditResult, SpinResult, ToSerialized, Wheel},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/wheels",
    tag = "wheels",
    params(WheelQuery),
    responses(
        (status = 200, body = Wheel),
        (status = 404, description = "The room is gone")
    )
)]
async fn wheel(context: ServerContext, Query(query): Query<WheelQuery>) -> ServerResult<Json<Wheel>> {
    let connection = parse_connection(&query.connection)?;

    let view = context
        .collab
        .wheel(&connection)
        .ok_or_else(|| ServerError::NotFound(format!("No wheel for {}", connection)))?;

    Ok(Json(view.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/wheels/items",
    tag = "wheels",
    request_body = ItemActionSchema,
    responses(
        (status = 200, description = "The option is on the wheel"),
        (status = 400, description = "The option is invalid")
    )
)]
async fn add_item(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<ItemActionSchema>,
) -> ServerResult<()> {
    let connection = parse_connection(&body.connection)?;
    let item = WheelItem::try_from(body.item)?;

    context.collab.editor(&connection).add(item).await?;
    Ok(())
}

#[utoipa::path(
    put,
    path = "/v1/wheels/items",
    tag = "wheels",
    request_body = EditItemSchema,
    responses(
        (status = 200, body = EditResult)
    )
)]
async fn edit_item(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<EditItemSchema>,
) -> ServerResult<Json<EditResult>> {
    let connection = parse_connection(&body.connection)?;
    let old = WheelItem::try_from(body.old)?;
    let new = WheelItem::try_from(body.new)?;

    let outcome = context.collab.editor(&connection).edit(&old, new).await?;

    Ok(Json(EditResult::new(outcome == EditOutcome::Replaced)))
}

#[utoipa::path(
    delete,
    path = "/v1/wheels/items",
    tag = "wheels",
    request_body = ItemActionSchema,
    responses(
        (status = 200, description = "The option is no longer on the wheel")
    )
)]
async fn delete_item(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<ItemActionSchema>,
) -> ServerResult<()> {
    let connection = parse_connection(&body.connection)?;
    let item = WheelItem::try_from(body.item)?;

    context.collab.editor(&connection).delete(&item).await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/wheels/spin",
    tag = "wheels",
    request_body = SpinSchema,
    responses(
        (status = 200, body = SpinResult),
        (status = 400, description = "The wheel has no options"),
        (status = 409, description = "The wheel is already spinning")
    )
)]
async fn spin(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<SpinSchema>,
) -> ServerResult<Json<SpinResult>> {
    let connection = parse_connection(&body.connection)?;
    let rotation = context.collab.spin(&connection).await?;

    Ok(Json(SpinResult::new(rotation)))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(wheel))
        .route("/items", post(add_item).put(edit_item).delete(delete_item))
        .route("/spin", post(spin))
}
