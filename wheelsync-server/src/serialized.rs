//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use serde::Serialize;
use utoipa::ToSchema;
use wheelsync_collab::{
    clip_text, ActiveRoom, JoinedRoom, LeaveOutcome, WheelItem as CollabWheelItem, WheelView,
};

/// Longest label shown on a wheel segment before it is clipped
const LABEL_LENGTH: usize = 10;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: String,
    name: String,
    players: Vec<String>,
    has_password: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Joined {
    /// Pass this back to act in the room
    connection: String,
    nickname: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WheelItem {
    option_name: String,
    /// The option name as drawn on the wheel
    label: String,
    color: String,
    label_color: String,
    size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Wheel {
    items: Vec<WheelItem>,
    /// Where the wheel is drawn right now, mid-animation included
    rotation: f64,
    spinning: bool,
    can_spin: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    /// False if the player already had a heartbeat
    registered: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResult {
    /// Players removed for being inactive
    pruned: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LeaveResult {
    Left,
    ClosedRoom,
    AlreadyGone,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    changed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpinResult {
    rotation: f64,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Room> for ActiveRoom {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self.players.clone(),
            has_password: self.has_password,
        }
    }
}

impl ToSerialized<Joined> for JoinedRoom {
    fn to_serialized(&self) -> Joined {
        Joined {
            connection: self.connection.to_string(),
            nickname: self.nickname.clone(),
        }
    }
}

impl ToSerialized<WheelItem> for CollabWheelItem {
    fn to_serialized(&self) -> WheelItem {
        WheelItem {
            option_name: self.option_name.clone(),
            label: clip_text(&self.option_name, LABEL_LENGTH),
            color: self.color.hex().to_string(),
            label_color: self.color.label_color().to_string(),
            size: self.size,
        }
    }
}

impl ToSerialized<Wheel> for WheelView {
    fn to_serialized(&self) -> Wheel {
        Wheel {
            items: self.items.to_serialized(),
            rotation: self.rotation,
            spinning: self.spinning,
            can_spin: self.can_spin,
        }
    }
}

impl ToSerialized<LeaveResult> for LeaveOutcome {
    fn to_serialized(&self) -> LeaveResult {
        match self {
            LeaveOutcome::Left => LeaveResult::Left,
            LeaveOutcome::ClosedRoom => LeaveResult::ClosedRoom,
            LeaveOutcome::AlreadyGone => LeaveResult::AlreadyGone,
        }
    }
}

impl LoginResult {
    pub fn new(registered: bool) -> Self {
        Self { registered }
    }
}

impl HeartbeatResult {
    pub fn new(pruned: Vec<String>) -> Self {
        Self { pruned }
    }
}

impl EditResult {
    pub fn new(changed: bool) -> Self {
        Self { changed }
    }
}

impl SpinResult {
    pub fn new(rotation: f64) -> Self {
        Self { rotation }
    }
}
