use std::{
    collections::BTreeMap,
    fmt::Display,
    hash::{Hash, Hasher},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use wheelsync_core::{
    validate_segment, CollectionPath, DocPath, DocumentSnapshot, FieldPath, Fields, Value,
};

use crate::{CollabError, Config, Result};

/// Collection holding every room document
pub const ROOMS_COLLECTION: &str = "rooms";
/// Subcollection of a room holding its wheel document
pub const WHEEL_COLLECTION: &str = "wheel";
/// Wheel key of rooms without a password
pub const PUBLIC_WHEEL_KEY: &str = "items";
/// Longest password accepted when creating a room, in bytes
pub const MAX_PASSWORD_LENGTH: usize = 255;

/// The id of a room document
pub type RoomId = String;

/// A nickname mapped to its last heartbeat. `None` is a player that was
/// registered without a heartbeat.
pub type Players = BTreeMap<String, Option<DateTime<Utc>>>;

/// A room document
#[derive(Debug, Clone, PartialEq)]
pub struct RoomData {
    pub id: RoomId,
    pub name: String,
    /// The wheel of the room is keyed by a password
    pub has_password: bool,
    pub players: Players,
    pub created_at: Option<DateTime<Utc>>,
}

/// A wheel document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WheelData {
    pub items: Vec<WheelItem>,
    /// The last committed orientation, in degrees
    pub rotation: f64,
    /// Changes every time a spin is requested.
    /// Absent until the store has assigned it.
    pub latest_spin_time: Option<DateTime<Utc>>,
}

/// An option on the wheel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelItem {
    pub option_name: String,
    pub color: Color,
    /// Relative weight of the option. Missing or zero weighs as 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// The record exactly as it was read from the store
    #[serde(skip)]
    stored: Option<Value>,
}

impl PartialEq for WheelItem {
    fn eq(&self, other: &Self) -> bool {
        self.option_name == other.option_name && self.color == other.color && self.size == other.size
    }
}

impl Eq for WheelItem {}

impl Hash for WheelItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.option_name.hash(state);
        self.color.hash(state);
        self.size.hash(state);
    }
}

/// The palette wheel options are painted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Color {
    #[default]
    Slate800,
    Slate700,
    Slate400,
    Slate200,
}

/// The key of the wheel document of a room: the room's password, or
/// [PUBLIC_WHEEL_KEY] when it has none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WheelKey(String);

/// The handle a client needs to act in a room, persisted as `"<roomId> <wheelKey>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    pub room_id: RoomId,
    pub wheel_key: WheelKey,
}

pub fn rooms_collection() -> Result<CollectionPath> {
    Ok(CollectionPath::root(ROOMS_COLLECTION)?)
}

pub fn room_path(room_id: &str) -> Result<DocPath> {
    Ok(rooms_collection()?.doc(room_id)?)
}

pub fn wheel_path(room_id: &str, wheel_key: &WheelKey) -> Result<DocPath> {
    Ok(room_path(room_id)?
        .collection(WHEEL_COLLECTION)?
        .doc(wheel_key.as_str())?)
}

/// Path to a player's heartbeat inside a room document
pub fn player_field(nickname: &str) -> FieldPath {
    FieldPath::new(["players", nickname])
}

/// Shortens a label to `max` characters, marking the cut with `...`
pub fn clip_text(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

fn malformed(snapshot: &DocumentSnapshot, reason: impl Into<String>) -> CollabError {
    CollabError::MalformedDocument {
        path: snapshot.path.to_string(),
        reason: reason.into(),
    }
}

impl RoomData {
    /// Reads a room from a snapshot. Returns `None` if the room doesn't exist.
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Option<Self>> {
        let Some(fields) = &snapshot.fields else {
            return Ok(None);
        };

        let name = match fields.get("name") {
            None => String::new(),
            Some(value) => value
                .as_str()
                .ok_or_else(|| malformed(snapshot, "name is not a string"))?
                .to_string(),
        };

        let players = match fields.get("players") {
            None | Some(Value::Null) => Players::new(),
            Some(value) => value
                .as_map()
                .ok_or_else(|| malformed(snapshot, "players is not a map"))?
                .iter()
                .map(|(nickname, heartbeat)| (nickname.clone(), heartbeat.as_timestamp()))
                .collect(),
        };

        Ok(Some(Self {
            id: snapshot.id().to_string(),
            name,
            has_password: fields.get("password").and_then(Value::as_bool).unwrap_or(false),
            players,
            created_at: fields.get("createdAt").and_then(Value::as_timestamp),
        }))
    }

    /// A room is active while any player has a fresh heartbeat
    pub fn is_active(&self, config: &Config, now: DateTime<Utc>) -> bool {
        self.players
            .values()
            .flatten()
            .any(|heartbeat| config.is_fresh(*heartbeat, now))
    }

    /// Returns true if anyone but `nickname` has a fresh heartbeat
    pub fn has_other_active_player(&self, nickname: &str, config: &Config, now: DateTime<Utc>) -> bool {
        self.players
            .iter()
            .filter(|(player, _)| *player != nickname)
            .filter_map(|(_, heartbeat)| *heartbeat)
            .any(|heartbeat| config.is_fresh(heartbeat, now))
    }

    /// Nicknames whose heartbeat is old enough to be pruned
    pub fn stale_players(&self, config: &Config, now: DateTime<Utc>) -> Vec<String> {
        self.players
            .iter()
            .filter_map(|(player, heartbeat)| heartbeat.map(|h| (player, h)))
            .filter(|(_, heartbeat)| config.is_stale(*heartbeat, now))
            .map(|(player, _)| player.clone())
            .collect()
    }

    /// Returns true once the room is past its creation grace period.
    /// Rooms without a creation time never are.
    pub fn is_settled(&self, config: &Config, now: DateTime<Utc>) -> bool {
        self.created_at
            .map(|created_at| config.is_settled(created_at, now))
            .unwrap_or(false)
    }

    /// Nicknames in the room, sorted
    pub fn player_names(&self) -> Vec<String> {
        self.players.keys().cloned().collect()
    }
}

impl WheelData {
    /// Reads a wheel from a snapshot. Returns `None` if the wheel doesn't exist.
    /// Items that can't be read are skipped.
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Option<Self>> {
        let Some(fields) = &snapshot.fields else {
            return Ok(None);
        };

        let items = match fields.get("wheelItems") {
            None => Vec::new(),
            Some(value) => value
                .as_array()
                .ok_or_else(|| malformed(snapshot, "wheelItems is not an array"))?
                .iter()
                .filter_map(|value| {
                    let item = WheelItem::from_value(value);

                    if item.is_none() {
                        warn!("Skipping unreadable wheel item in {}", snapshot.path);
                    }

                    item
                })
                .collect(),
        };

        Ok(Some(Self {
            items,
            rotation: fields.get("rotation").and_then(Value::as_f64).unwrap_or(0.),
            latest_spin_time: fields.get("latestSpinTime").and_then(Value::as_timestamp),
        }))
    }
}

impl WheelItem {
    pub fn new(option_name: impl Into<String>, color: Color, size: Option<u32>) -> Self {
        Self {
            option_name: option_name.into(),
            color,
            size,
            stored: None,
        }
    }

    /// The weight of the option, as used for segment sizes
    pub fn weight(&self) -> f64 {
        match self.size {
            Some(size) if size > 0 => size as f64,
            _ => 1.,
        }
    }

    /// Encodes the item for the store. An item read from the store encodes
    /// to the exact record it was read from, so removal by value matches it
    /// even if another client wrote it differently.
    pub fn to_value(&self) -> Value {
        if let Some(stored) = &self.stored {
            if Self::from_value(stored).as_ref() == Some(self) {
                return stored.clone();
            }
        }

        let mut fields = Fields::new();
        fields.insert("optionName".into(), self.option_name.as_str().into());
        fields.insert("color".into(), self.color.hex().into());

        if let Some(size) = self.size {
            fields.insert("size".into(), size.into());
        }

        Value::Map(fields)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_map()?;

        let size = match fields.get("size") {
            None | Some(Value::Null) => None,
            Some(size) => Some(u32::try_from(size.as_i64()?).ok()?),
        };

        Some(Self {
            option_name: fields.get("optionName")?.as_str()?.to_string(),
            color: fields.get("color")?.as_str()?.parse().ok()?,
            size,
            stored: Some(value.clone()),
        })
    }
}

impl Color {
    pub const ALL: [Color; 4] = [Self::Slate800, Self::Slate700, Self::Slate400, Self::Slate200];

    pub fn hex(&self) -> &'static str {
        match self {
            Self::Slate800 => "#1e293b",
            Self::Slate700 => "#334155",
            Self::Slate400 => "#94a3b8",
            Self::Slate200 => "#e2e8f0",
        }
    }

    /// The color labels drawn on this color should use
    pub fn label_color(&self) -> &'static str {
        match self {
            Self::Slate400 | Self::Slate200 => "#000",
            Self::Slate800 | Self::Slate700 => "#fff",
        }
    }
}

impl FromStr for Color {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|color| color.hex().eq_ignore_ascii_case(s))
            .ok_or(CollabError::InvalidInput("color is not in the palette"))
    }
}

impl TryFrom<String> for Color {
    type Error = CollabError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.hex().to_string()
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hex())
    }
}

impl WheelKey {
    /// The key of a wheel without password
    pub fn public() -> Self {
        Self(PUBLIC_WHEEL_KEY.to_string())
    }

    /// The key a room created with this password uses.
    /// An empty or missing password means a public wheel.
    pub fn for_password(password: Option<&str>) -> Result<Self> {
        match password {
            None | Some("") => Ok(Self::public()),
            Some(password) => {
                validate_password(password)?;
                Ok(Self(password.to_string()))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WheelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Passwords become document ids, so they must be valid path segments
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(CollabError::InvalidPassword("longer than 255 bytes"));
    }

    validate_segment(password).map_err(|_| {
        CollabError::InvalidPassword("must not contain '/', be '.' or '..', or be wrapped in '__'")
    })
}

impl Connection {
    pub fn new(room_id: impl Into<RoomId>, wheel_key: WheelKey) -> Self {
        Self {
            room_id: room_id.into(),
            wheel_key,
        }
    }

    pub fn room_path(&self) -> Result<DocPath> {
        room_path(&self.room_id)
    }

    pub fn wheel_path(&self) -> Result<DocPath> {
        wheel_path(&self.room_id, &self.wheel_key)
    }
}

impl Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.room_id, self.wheel_key)
    }
}

impl FromStr for Connection {
    type Err = CollabError;

    /// Splits on the first space. Room ids never contain one, wheel keys may.
    fn from_str(s: &str) -> Result<Self> {
        let (room_id, wheel_key) = s
            .split_once(' ')
            .ok_or(CollabError::InvalidInput("connection must be \"<roomId> <wheelKey>\""))?;

        if room_id.is_empty() || wheel_key.is_empty() {
            return Err(CollabError::InvalidInput("connection must be \"<roomId> <wheelKey>\""));
        }

        Ok(Self::new(room_id, WheelKey(wheel_key.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn room(players: &[(&str, Option<DateTime<Utc>>)], created_at: DateTime<Utc>) -> RoomData {
        RoomData {
            id: "room".into(),
            name: "Quiz".into(),
            has_password: false,
            players: players
                .iter()
                .map(|(name, heartbeat)| (name.to_string(), *heartbeat))
                .collect(),
            created_at: Some(created_at),
        }
    }

    #[test]
    fn connection_round_trips_with_spaces_in_password() {
        let connection: Connection = "abc open sesame".parse().unwrap();

        assert_eq!(connection.room_id, "abc");
        assert_eq!(connection.wheel_key.as_str(), "open sesame");
        assert_eq!(connection.to_string(), "abc open sesame");
        assert!("abc".parse::<Connection>().is_err());
    }

    #[test]
    fn password_keys() {
        assert_eq!(WheelKey::for_password(None).unwrap(), WheelKey::public());
        assert_eq!(WheelKey::for_password(Some("")).unwrap(), WheelKey::public());
        assert_eq!(WheelKey::for_password(Some("hunter2")).unwrap().as_str(), "hunter2");
        assert!(WheelKey::for_password(Some("a/b")).is_err());
        assert!(WheelKey::for_password(Some(&"x".repeat(256))).is_err());
    }

    #[test]
    fn item_encoding_is_stable() {
        let sized = WheelItem::new("Pizza", Color::Slate800, Some(2));
        let unsized_item = WheelItem::new("Tacos", Color::Slate200, None);

        assert_eq!(WheelItem::from_value(&sized.to_value()), Some(sized.clone()));
        assert_eq!(WheelItem::from_value(&unsized_item.to_value()), Some(unsized_item.clone()));
        assert!(!unsized_item.to_value().as_map().unwrap().contains_key("size"));
        assert_eq!(unsized_item.weight(), 1.);
        assert_eq!(WheelItem::new("Zero", Color::Slate700, Some(0)).weight(), 1.);
    }

    fn loose_pizza() -> Value {
        let mut fields = Fields::new();
        fields.insert("optionName".into(), "Pizza".into());
        fields.insert("color".into(), "#1E293B".into());
        fields.insert("size".into(), Value::Double(2.));
        fields.insert("addedBy".into(), "alice".into());

        Value::Map(fields)
    }

    #[test]
    fn items_read_from_the_store_keep_their_record() {
        let stored = loose_pizza();
        let item = WheelItem::from_value(&stored).unwrap();

        assert_eq!(item, WheelItem::new("Pizza", Color::Slate800, Some(2)));
        assert_eq!(item.to_value(), stored);

        let mut resized = item.clone();
        resized.size = Some(3);
        assert_eq!(resized.to_value(), WheelItem::new("Pizza", Color::Slate800, Some(3)).to_value());
    }

    #[test]
    fn presence_queries() {
        let config = Config::default();
        let now = Utc::now();
        let room = room(
            &[
                ("alice", Some(now - Duration::minutes(1))),
                ("bob", Some(now - Duration::minutes(15))),
                ("carol", None),
            ],
            now - Duration::hours(1),
        );

        assert!(room.is_active(&config, now));
        assert!(room.has_other_active_player("bob", &config, now));
        assert!(!room.has_other_active_player("alice", &config, now));
        assert_eq!(room.stale_players(&config, now), vec!["bob".to_string()]);
        assert!(room.is_settled(&config, now));
        assert_eq!(room.player_names(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn labels_are_clipped() {
        assert_eq!(clip_text("Pizza", 10), "Pizza");
        assert_eq!(clip_text("Extraordinary", 10), "Extraordin...");
    }
}
