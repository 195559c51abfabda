use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;
use wheelsync_collab::{Color, Connection, JoinedRoom, WheelItem};

use crate::errors::{ServerError, ServerResult};

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Leave out for a public room
    #[validate(length(max = 255))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub nickname: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinRoomSchema {
    #[validate(length(min = 1, max = 255))]
    pub room_id: String,
    #[validate(length(max = 255))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub nickname: String,
}

/// Identifies a player in a room
#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionSchema {
    /// `"<roomId> <wheelKey>"` as returned when creating or joining a room
    #[validate(length(min = 3, max = 1024))]
    pub connection: String,
    #[validate(length(min = 1, max = 255))]
    pub nickname: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemSchema {
    #[validate(length(min = 1, max = 255))]
    pub option_name: String,
    /// One of `#1e293b`, `#334155`, `#94a3b8`, `#e2e8f0`
    #[validate(length(equal = 7))]
    pub color: String,
    pub size: Option<u32>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemActionSchema {
    #[validate(length(min = 3, max = 1024))]
    pub connection: String,
    #[validate(nested)]
    pub item: ItemSchema,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EditItemSchema {
    #[validate(length(min = 3, max = 1024))]
    pub connection: String,
    #[validate(nested)]
    pub old: ItemSchema,
    #[validate(nested)]
    pub new: ItemSchema,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpinSchema {
    #[validate(length(min = 3, max = 1024))]
    pub connection: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Only receive events of this room, and directory updates
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WheelQuery {
    /// The connection handed out when joining the room
    pub connection: String,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}

pub fn parse_connection(connection: &str) -> ServerResult<Connection> {
    Ok(connection.parse()?)
}

impl SessionSchema {
    pub fn joined(&self) -> ServerResult<JoinedRoom> {
        Ok(JoinedRoom {
            connection: parse_connection(&self.connection)?,
            nickname: self.nickname.clone(),
        })
    }
}

impl TryFrom<ItemSchema> for WheelItem {
    type Error = ServerError;

    fn try_from(value: ItemSchema) -> ServerResult<Self> {
        let color: Color = value.color.parse()?;

        Ok(WheelItem::new(value.option_name, color, value.size))
    }
}
