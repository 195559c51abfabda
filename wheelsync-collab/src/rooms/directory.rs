use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use wheelsync_core::{CollectionSnapshot, DocumentStore};

use crate::{
    room_path, rooms_collection, wheel_path, CollabContext, CollabEvent, Config, Result, RoomData,
    RoomId, WheelKey,
};

/// A room with at least one fresh heartbeat, as listed to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRoom {
    pub id: RoomId,
    pub name: String,
    /// Sorted nicknames
    pub players: Vec<String>,
    pub has_password: bool,
}

/// The result of looking through a snapshot of every room
#[derive(Debug, Default, PartialEq)]
pub struct DirectoryScan {
    pub active: Vec<ActiveRoom>,
    /// Public rooms nobody is in anymore, which anyone may delete
    pub abandoned: Vec<RoomId>,
}

/// Keeps a live listing of the active rooms, and deletes abandoned ones
pub struct RoomDirectory {
    rooms: Arc<Mutex<Vec<ActiveRoom>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Sorts every room of a snapshot into active and abandoned.
/// Rooms that can't be read are neither.
pub fn scan(snapshot: &CollectionSnapshot, config: &Config, now: DateTime<Utc>) -> DirectoryScan {
    let mut result = DirectoryScan::default();

    for document in &snapshot.documents {
        let room = match RoomData::from_snapshot(document) {
            Ok(Some(room)) => room,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping room in directory: {}", e);
                continue;
            }
        };

        if room.is_active(config, now) {
            result.active.push(ActiveRoom {
                players: room.player_names(),
                id: room.id,
                name: room.name,
                has_password: room.has_password,
            });
        } else if !room.has_password && room.is_settled(config, now) {
            result.abandoned.push(room.id);
        }
    }

    result
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: Default::default(),
            task: Default::default(),
        }
    }

    /// Subscribes to the rooms collection. Calling this again restarts the subscription.
    pub fn start<Db>(&self, context: &CollabContext<Db>)
    where
        Db: DocumentStore,
    {
        let collection = match rooms_collection() {
            Ok(collection) => collection,
            Err(e) => {
                warn!("Cannot watch the room directory: {}", e);
                return;
            }
        };

        let context = context.clone();
        let rooms = self.rooms.clone();

        let task = tokio::spawn(async move {
            let mut subscription = context.store.subscribe_collection(&collection);

            while let Some(snapshot) = subscription.next().await {
                let DirectoryScan { active, abandoned } =
                    scan(&snapshot, &context.config, context.now());

                *rooms.lock() = active.clone();
                context.emit(CollabEvent::DirectoryUpdated { rooms: active });

                if !abandoned.is_empty() {
                    tokio::spawn(collect_garbage(context.clone(), abandoned));
                }
            }

            debug!("Room directory subscription ended");
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    /// The active rooms as of the latest snapshot
    pub fn rooms(&self) -> Vec<ActiveRoom> {
        self.rooms.lock().clone()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RoomDirectory {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// Deletes the public wheel and then the room of every id.
/// Another client may be doing the same, which is fine.
async fn collect_garbage<Db>(context: CollabContext<Db>, room_ids: Vec<RoomId>)
where
    Db: DocumentStore,
{
    for room_id in room_ids {
        match delete_public_room(&context, &room_id).await {
            Ok(()) => info!("Deleted abandoned room {}", room_id),
            Err(e) => warn!("Failed to delete abandoned room {}: {}", room_id, e),
        }
    }
}

async fn delete_public_room<Db>(context: &CollabContext<Db>, room_id: &str) -> Result<()>
where
    Db: DocumentStore,
{
    context.store.delete(&wheel_path(room_id, &WheelKey::public())?).await?;
    context.store.delete(&room_path(room_id)?).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as TimeDelta;
    use wheelsync_core::{Clock, DocumentStore, Update, Value};

    use super::*;
    use crate::{
        player_field,
        rooms::testing::{harness, next_event, Harness},
        JoinedRoom, NewRoom,
    };

    async fn create(h: &Harness, name: &str, password: Option<&str>) -> JoinedRoom {
        crate::create_room(
            &h.context,
            NewRoom {
                name: name.into(),
                password: password.map(Into::into),
                nickname: "Alice".into(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn scan_sorts_rooms() {
        let h = harness();
        let active = create(&h, "Active", None).await;
        let public = create(&h, "Public", None).await;
        let private = create(&h, "Private", Some("pw")).await;
        let unmarked = create(&h, "Unmarked", None).await;

        h.clock.advance(TimeDelta::minutes(31));

        let refresh = Update::new().server_timestamp(player_field("Alice"));
        h.store
            .update(&active.connection.room_path().unwrap(), refresh)
            .await
            .unwrap();

        let unmark = Update::new().set(player_field("Alice"), Value::Null);
        h.store
            .update(&unmarked.connection.room_path().unwrap(), unmark)
            .await
            .unwrap();

        let snapshot = h
            .store
            .subscribe_collection(&rooms_collection().unwrap())
            .next()
            .await
            .unwrap();

        let result = scan(&snapshot, &h.context.config, h.clock.now());

        assert_eq!(result.active.len(), 1);
        assert_eq!(result.active[0].name, "Active");
        assert_eq!(result.active[0].players, vec!["Alice"]);

        let mut abandoned = result.abandoned.clone();
        abandoned.sort();
        let mut expected = vec![public.connection.room_id, unmarked.connection.room_id];
        expected.sort();
        assert_eq!(abandoned, expected);
        assert!(!abandoned.contains(&private.connection.room_id));
    }

    #[tokio::test]
    async fn new_rooms_are_not_collected() {
        let h = harness();
        let joined = create(&h, "Fresh", None).await;

        let unmark = Update::new().set(player_field("Alice"), Value::Null);
        h.store
            .update(&joined.connection.room_path().unwrap(), unmark)
            .await
            .unwrap();

        let snapshot = h
            .store
            .subscribe_collection(&rooms_collection().unwrap())
            .next()
            .await
            .unwrap();

        let result = scan(&snapshot, &h.context.config, h.clock.now());
        assert!(result.active.is_empty());
        assert!(result.abandoned.is_empty());
    }

    #[tokio::test]
    async fn deletes_abandoned_rooms() {
        let h = harness();
        let joined = create(&h, "Quiz", None).await;
        h.clock.advance(TimeDelta::minutes(31));

        let directory = RoomDirectory::new();
        directory.start(&h.context);

        let event = next_event(&h.events, |e| matches!(e, CollabEvent::DirectoryUpdated { .. })).await;
        assert_eq!(event, CollabEvent::DirectoryUpdated { rooms: vec![] });

        let room = joined.connection.room_path().unwrap();
        for _ in 0..100 {
            if !h.store.get(&room).await.unwrap().exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!h.store.get(&room).await.unwrap().exists());
        assert!(!h.store.get(&joined.connection.wheel_path().unwrap()).await.unwrap().exists());
    }

    #[tokio::test]
    async fn lists_active_rooms() {
        let h = harness();
        let directory = RoomDirectory::new();
        directory.start(&h.context);

        next_event(&h.events, |e| matches!(e, CollabEvent::DirectoryUpdated { .. })).await;
        let joined = create(&h, "Quiz", None).await;

        let event = next_event(&h.events, |e| {
            matches!(e, CollabEvent::DirectoryUpdated { rooms } if !rooms.is_empty())
        })
        .await;

        let CollabEvent::DirectoryUpdated { rooms } = event else {
            unreachable!()
        };

        assert_eq!(rooms[0].id, joined.connection.room_id);
        assert_eq!(directory.rooms(), rooms);
    }
}
