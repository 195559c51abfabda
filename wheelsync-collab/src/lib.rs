//! The wheelsync protocol.
//!
//! Clients share rooms and wheels through a [DocumentStore]. Presence is
//! inferred from heartbeat timestamps, abandoned rooms are deleted by
//! whichever client notices them first, and every client derives the same
//! spin outcome from the rotation stored on the wheel.

mod client;
mod config;
mod data;
mod errors;
mod events;
mod persistence;
mod rooms;
mod wheel;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::info;
use wheelsync_core::{Clock, DocumentStore};

pub use client::*;
pub use config::*;
pub use data::*;
pub use errors::*;
pub use events::*;
pub use persistence::*;
pub use rooms::*;
pub use wheel::*;

/// The wheelsync collab system, facilitating room management, presence, and wheel sync.
pub struct Collab<Db> {
    context: CollabContext<Db>,
    event_receiver: EventReceiver,
    directory: RoomDirectory,
    /// Live feeds of rooms someone joined through this instance
    feeds: DashMap<Connection, RoomFeed>,
}

/// A type passed to various components of the collab system, to access state and emit events.
pub struct CollabContext<Db> {
    pub store: Arc<Db>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    event_sender: EventSender,
}

impl<Db> CollabContext<Db>
where
    Db: DocumentStore,
{
    pub fn new(store: Arc<Db>, clock: Arc<dyn Clock>, config: Config) -> (Self, EventReceiver) {
        let (event_sender, event_receiver) = crossbeam::channel::unbounded();

        let context = Self {
            store,
            clock,
            config,
            event_sender,
        };

        (context, event_receiver)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn emit(&self, event: CollabEvent) {
        let _ = self.event_sender.send(event);
    }
}

impl<Db> Collab<Db>
where
    Db: DocumentStore,
{
    pub fn new(store: Db, clock: Arc<dyn Clock>, config: Config) -> Self {
        let (context, event_receiver) = CollabContext::new(Arc::new(store), clock, config);

        Self {
            context,
            event_receiver,
            directory: RoomDirectory::new(),
            feeds: Default::default(),
        }
    }

    /// Starts watching the room directory. Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.directory.start(&self.context);
        info!("Watching room directory");
    }

    pub fn context(&self) -> &CollabContext<Db> {
        &self.context
    }

    /// Receiver of every event emitted by this instance
    pub fn events(&self) -> &EventReceiver {
        &self.event_receiver
    }

    /// Rooms with at least one fresh heartbeat, as of the latest directory snapshot
    pub fn active_rooms(&self) -> Vec<ActiveRoom> {
        self.sweep_feeds();
        self.directory.rooms()
    }

    pub async fn create_room(&self, new_room: NewRoom) -> Result<JoinedRoom> {
        let joined = rooms::create_room(&self.context, new_room).await?;
        self.ensure_feed(&joined.connection);

        Ok(joined)
    }

    pub async fn join_room(&self, join: JoinRoom) -> Result<JoinedRoom> {
        let joined = rooms::join_room(&self.context, join).await?;
        self.ensure_feed(&joined.connection);

        Ok(joined)
    }

    /// Registers the player's first heartbeat, if it has none yet
    pub async fn login(&self, joined: &JoinedRoom) -> Result<bool> {
        self.ensure_feed(&joined.connection);
        rooms::login(&self.context, joined).await
    }

    /// Refreshes the player's heartbeat and prunes stale players
    pub async fn heartbeat(&self, joined: &JoinedRoom) -> Result<Vec<String>> {
        rooms::heartbeat(&self.context, joined).await
    }

    pub async fn leave_room(&self, joined: &JoinedRoom) -> Result<LeaveOutcome> {
        let outcome = rooms::leave_room(&self.context, joined).await?;

        if outcome != LeaveOutcome::Left {
            self.feeds.remove(&joined.connection);
        }

        Ok(outcome)
    }

    /// Returns an editor for the wheel of a room
    pub fn editor(&self, connection: &Connection) -> WheelEditor<Db> {
        WheelEditor::new(&self.context, connection.clone())
    }

    /// The wheel of a room as it should be drawn right now
    pub fn wheel(&self, connection: &Connection) -> Option<WheelView> {
        self.ensure_feed(connection);
        self.feeds.get(connection).map(|feed| feed.view())
    }

    /// Requests a spin with a random rotation, and returns the rotation.
    /// Only one spin per room can be requested or animating at a time.
    pub async fn spin(&self, connection: &Connection) -> Result<f64> {
        ensure_spinnable(&self.context, connection).await?;
        self.ensure_feed(connection);

        let claimed = self
            .feeds
            .get(connection)
            .map(|feed| feed.begin_spin())
            .unwrap_or(false);

        if !claimed {
            return Err(CollabError::SpinInProgress);
        }

        let rotation = random_rotation(&mut rand::thread_rng());

        if let Err(e) = request_spin(&self.context, connection, rotation).await {
            if let Some(feed) = self.feeds.get(connection) {
                feed.cancel_spin();
            }

            return Err(e);
        }

        Ok(rotation)
    }

    /// Starts a feed for the room unless one is already running
    fn ensure_feed(&self, connection: &Connection) {
        self.sweep_feeds();

        self.feeds
            .entry(connection.clone())
            .or_insert_with(|| RoomFeed::start(&self.context, connection.clone()));
    }

    /// Drops the feeds of rooms that were deleted
    fn sweep_feeds(&self) {
        self.feeds.retain(|_, feed| !feed.is_finished());
    }
}

impl<Db> Clone for CollabContext<Db> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            event_sender: self.event_sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use wheelsync_core::{DocumentStore, ManualClock, MemoryStore};

    use super::*;
    use crate::rooms::testing::next_event;

    #[tokio::test(start_paused = true)]
    async fn feeds_of_deleted_rooms_are_dropped() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let collab = Collab::new(MemoryStore::with_clock(clock.clone()), clock, Config::default());

        let mut joined = Vec::new();
        for name in ["Quiz", "Lunch", "Movies"] {
            let room = collab
                .create_room(NewRoom {
                    name: name.into(),
                    password: None,
                    nickname: "Alice".into(),
                })
                .await
                .unwrap();
            joined.push(room);
        }
        assert_eq!(collab.feeds.len(), 3);

        let store = collab.context().store.clone();
        for room in &joined {
            store.delete(&room.connection.wheel_path().unwrap()).await.unwrap();
            store.delete(&room.connection.room_path().unwrap()).await.unwrap();
        }

        for _ in &joined {
            next_event(collab.events(), |e| matches!(e, CollabEvent::RoomClosed { .. })).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        collab.active_rooms();
        assert_eq!(collab.feeds.len(), 0);
    }
}
