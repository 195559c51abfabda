use log::{debug, info};
use wheelsync_core::{DocumentStore, StoreError, Update, Value};

use crate::{
    player_field, room_path, rooms_collection, CollabContext, CollabError, Connection, RoomData,
    RoomId, Result, WheelKey,
};

/// The input needed to create a room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    /// A missing or empty password creates a public room
    pub password: Option<String>,
    pub nickname: String,
}

/// The input needed to join a room
#[derive(Debug, Clone)]
pub struct JoinRoom {
    pub room_id: RoomId,
    pub password: Option<String>,
    pub nickname: String,
}

/// A player in a room, which is what a client persists between reloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    pub connection: Connection,
    pub nickname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Only the player's entry was removed
    Left,
    /// Nobody else was around, so the room and its wheel were deleted
    ClosedRoom,
    /// The room was already deleted by someone else
    AlreadyGone,
}

/// Creates a room with the creator as its first player, then its wheel
pub async fn create_room<Db>(context: &CollabContext<Db>, new_room: NewRoom) -> Result<JoinedRoom>
where
    Db: DocumentStore,
{
    let NewRoom {
        name,
        password,
        nickname,
    } = new_room;

    if name.is_empty() {
        return Err(CollabError::InvalidInput("room name is empty"));
    }

    if nickname.is_empty() {
        return Err(CollabError::InvalidInput("nickname is empty"));
    }

    let has_password = password.as_deref().is_some_and(|p| !p.is_empty());
    let wheel_key = WheelKey::for_password(password.as_deref())?;

    let room = Update::new()
        .set("name", name.as_str())
        .set("password", has_password)
        .server_timestamp(player_field(&nickname))
        .server_timestamp("createdAt");

    let path = context.store.add(&rooms_collection()?, room).await?;
    let connection = Connection::new(path.id(), wheel_key);

    let wheel = Update::new()
        .server_timestamp("latestSpinTime")
        .set("rotation", 0.)
        .set("wheelItems", Vec::<Value>::new());

    context.store.set(&connection.wheel_path()?, wheel).await?;

    info!("Room {} ({}) created by {}", name, connection.room_id, nickname);

    Ok(JoinedRoom {
        connection,
        nickname,
    })
}

/// Checks that a player can join a room. Nothing is written.
pub async fn join_room<Db>(context: &CollabContext<Db>, join: JoinRoom) -> Result<JoinedRoom>
where
    Db: DocumentStore,
{
    let JoinRoom {
        room_id,
        password,
        nickname,
    } = join;

    if room_id.is_empty() {
        return Err(CollabError::InvalidInput("room id is empty"));
    }

    if nickname.is_empty() {
        return Err(CollabError::InvalidInput("nickname is empty"));
    }

    let Ok(path) = room_path(&room_id) else {
        return Err(CollabError::RoomNotFound(room_id));
    };

    let snapshot = context.store.get(&path).await?;
    let room = RoomData::from_snapshot(&snapshot)?.ok_or(CollabError::RoomNotFound(room_id))?;

    if room.players.contains_key(&nickname) {
        return Err(CollabError::NicknameConflict(nickname));
    }

    let wheel_key = if room.has_password {
        // Only the correct password leads to an existing wheel
        let wheel_key = password
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| WheelKey::for_password(Some(p)).ok())
            .ok_or(CollabError::WrongPassword)?;

        let wheel_path = crate::wheel_path(&room.id, &wheel_key)?;

        if !context.store.get(&wheel_path).await?.exists() {
            return Err(CollabError::WrongPassword);
        }

        wheel_key
    } else {
        WheelKey::public()
    };

    info!("{} joined room {} ({})", nickname, room.name, room.id);

    Ok(JoinedRoom {
        connection: Connection::new(room.id, wheel_key),
        nickname,
    })
}

async fn read_room<Db>(context: &CollabContext<Db>, connection: &Connection) -> Result<Option<RoomData>>
where
    Db: DocumentStore,
{
    let snapshot = context.store.get(&connection.room_path()?).await?;
    RoomData::from_snapshot(&snapshot)
}

/// Writes the player's heartbeat if the room doesn't list them yet.
/// Returns true if a heartbeat was written.
pub async fn login<Db>(context: &CollabContext<Db>, joined: &JoinedRoom) -> Result<bool>
where
    Db: DocumentStore,
{
    let path = joined.connection.room_path()?;
    let room = read_room(context, &joined.connection)
        .await?
        .ok_or_else(|| CollabError::StaleReference(path.to_string()))?;

    if room.players.contains_key(&joined.nickname) {
        return Ok(false);
    }

    let update = Update::new().server_timestamp(player_field(&joined.nickname));
    context.store.update(&path, update).await?;

    debug!("{} logged into room {}", joined.nickname, room.id);

    Ok(true)
}

/// Refreshes the player's heartbeat and removes every other player whose
/// heartbeat went stale, in one update. Returns the removed nicknames.
pub async fn heartbeat<Db>(context: &CollabContext<Db>, joined: &JoinedRoom) -> Result<Vec<String>>
where
    Db: DocumentStore,
{
    let path = joined.connection.room_path()?;
    let room = read_room(context, &joined.connection)
        .await?
        .ok_or_else(|| CollabError::StaleReference(path.to_string()))?;

    let stale: Vec<_> = room
        .stale_players(&context.config, context.now())
        .into_iter()
        .filter(|player| *player != joined.nickname)
        .collect();

    let update = stale.iter().fold(
        Update::new().server_timestamp(player_field(&joined.nickname)),
        |update, player| update.delete(player_field(player)),
    );

    context.store.update(&path, update).await?;

    if !stale.is_empty() {
        info!("Pruned {} from room {}", stale.join(", "), room.id);
    }

    Ok(stale)
}

/// Removes the player from the room. The last active player deletes the
/// room and its wheel instead, unless the room was only just created.
pub async fn leave_room<Db>(context: &CollabContext<Db>, joined: &JoinedRoom) -> Result<LeaveOutcome>
where
    Db: DocumentStore,
{
    let connection = &joined.connection;

    let Some(room) = read_room(context, connection).await? else {
        debug!("Room {} was gone before {} left", connection.room_id, joined.nickname);
        return Ok(LeaveOutcome::AlreadyGone);
    };

    let now = context.now();
    let others_active = room.has_other_active_player(&joined.nickname, &context.config, now);

    if !others_active && room.is_settled(&context.config, now) {
        context.store.delete(&connection.wheel_path()?).await?;
        context.store.delete(&connection.room_path()?).await?;

        info!("{} closed room {} ({})", joined.nickname, room.name, room.id);
        return Ok(LeaveOutcome::ClosedRoom);
    }

    let update = Update::new().delete(player_field(&joined.nickname));

    match context.store.update(&connection.room_path()?, update).await {
        Ok(()) => {
            info!("{} left room {} ({})", joined.nickname, room.name, room.id);
            Ok(LeaveOutcome::Left)
        }
        Err(StoreError::NotFound(_)) => {
            debug!("Room {} vanished while {} was leaving", room.id, joined.nickname);
            Ok(LeaveOutcome::AlreadyGone)
        }
        Err(e) => Err(e.into()),
    }
}
