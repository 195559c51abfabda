use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use wheelsync_core::DocumentStore;

use crate::{
    ensure_spinnable, random_rotation, request_spin, CollabContext, CollabError, JoinRoom,
    JoinedRoom, KeyValueStore, LeaveOutcome, NewRoom, PresenceHandle, Result, RoomData, RoomFeed,
    RoomSession, SessionStore, TabClose, WheelView,
};

/// A native client of one player: a room session with its persisted
/// handle, presence task, and room feed.
pub struct WheelClient<Db, D, R> {
    context: CollabContext<Db>,
    sessions: SessionStore<D, R>,
    session: Arc<RoomSession<Db>>,
    running: Mutex<Option<Running>>,
}

/// Tasks that run while the client is in a room
struct Running {
    _presence: PresenceHandle,
    feed: RoomFeed,
}

impl<Db, D, R> WheelClient<Db, D, R>
where
    Db: DocumentStore,
    D: KeyValueStore,
    R: KeyValueStore,
{
    pub fn new(context: &CollabContext<Db>, sessions: SessionStore<D, R>) -> Self {
        Self {
            context: context.clone(),
            sessions,
            session: Arc::new(RoomSession::new(context)),
            running: Default::default(),
        }
    }

    pub fn session(&self) -> &RoomSession<Db> {
        &self.session
    }

    pub fn sessions(&self) -> &SessionStore<D, R> {
        &self.sessions
    }

    /// Resumes the persisted session, if its room still exists
    pub async fn restore(&self) -> Result<Option<JoinedRoom>> {
        let Some(joined) = self.sessions.load()? else {
            return Ok(None);
        };

        self.sessions.clear_reload()?;

        let snapshot = self.context.store.get(&joined.connection.room_path()?).await?;

        if RoomData::from_snapshot(&snapshot)?.is_none() {
            info!("Room {} is gone, forgetting session", joined.connection.room_id);
            self.sessions.clear()?;
            return Ok(None);
        }

        self.session.resume(joined.clone())?;
        self.connect(&joined)?;

        info!("Restored session in room {}", joined.connection.room_id);
        Ok(Some(joined))
    }

    pub async fn create_room(&self, new_room: NewRoom) -> Result<JoinedRoom> {
        let joined = self.session.create_room(new_room).await?;
        self.connect(&joined)?;

        Ok(joined)
    }

    pub async fn join_room(&self, join: JoinRoom) -> Result<JoinedRoom> {
        let joined = self.session.join_room(join).await?;
        self.connect(&joined)?;

        Ok(joined)
    }

    /// Leaves the room on purpose, so a reload won't bring the player back
    pub async fn leave(&self) -> Result<LeaveOutcome> {
        self.sessions.clear_reload()?;
        self.running.lock().take();

        let outcome = self.session.leave().await;
        self.sessions.clear()?;

        outcome
    }

    /// The wheel of the joined room as it should be drawn right now
    pub fn wheel(&self) -> Option<WheelView> {
        self.running.lock().as_ref().map(|running| running.feed.view())
    }

    /// Spins the wheel of the joined room with a random rotation, and
    /// returns the rotation. Refused while a spin is requested or animating.
    pub async fn spin(&self) -> Result<f64> {
        let joined = self.session.joined()?;
        ensure_spinnable(&self.context, &joined.connection).await?;

        let claimed = self
            .running
            .lock()
            .as_ref()
            .map(|running| running.feed.begin_spin())
            .unwrap_or(false);

        if !claimed {
            return Err(CollabError::SpinInProgress);
        }

        let rotation = random_rotation(&mut rand::thread_rng());

        if let Err(e) = request_spin(&self.context, &joined.connection, rotation).await {
            if let Some(running) = self.running.lock().as_ref() {
                running.feed.cancel_spin();
            }

            return Err(e);
        }

        Ok(rotation)
    }

    /// Called when a tab closes. The last tab leaves the room, but keeps the
    /// session around for a reload to restore.
    pub async fn close_tab(&self) -> Result<TabClose> {
        let close = self.sessions.tab_closing()?;

        if let TabClose::LastTab { .. } = close {
            self.running.lock().take();

            if let Err(e) = self.session.leave().await {
                warn!("Failed to leave room while closing: {}", e);
            }
        }

        Ok(close)
    }

    fn connect(&self, joined: &JoinedRoom) -> Result<()> {
        self.sessions.save(joined)?;
        self.sessions.tab_opened()?;

        let running = Running {
            _presence: self.session.run_presence(),
            feed: RoomFeed::start(&self.context, joined.connection.clone()),
        };

        *self.running.lock() = Some(running);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as TimeDelta;
    use wheelsync_core::{Clock, DocumentStore, MemoryStore};

    use super::*;
    use crate::{
        rooms::testing::{harness, next_event},
        CollabEvent, MemoryKeyValueStore, SessionState,
    };

    type Client = WheelClient<MemoryStore, MemoryKeyValueStore, MemoryKeyValueStore>;

    fn client(context: &CollabContext<MemoryStore>) -> Client {
        WheelClient::new(context, SessionStore::new(Default::default(), Default::default()))
    }

    fn quiz() -> NewRoom {
        NewRoom {
            name: "Quiz".into(),
            password: None,
            nickname: "Alice".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reload_restores_the_session() {
        let h = harness();
        let alice = client(&h.context);
        let joined = alice.create_room(quiz()).await.unwrap();
        next_event(&h.events, |e| matches!(e, CollabEvent::RoomUpdated { .. })).await;

        // Someone else keeps the room alive while the tab reloads
        let bob = client(&h.context);
        bob.join_room(JoinRoom {
            room_id: joined.connection.room_id.clone(),
            password: None,
            nickname: "Bob".into(),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let close = alice.close_tab().await.unwrap();
        assert_eq!(
            close,
            TabClose::LastTab {
                session: Some(joined.clone())
            }
        );
        assert_eq!(alice.session().state(), SessionState::Disconnected);

        assert_eq!(alice.restore().await.unwrap(), Some(joined.clone()));
        assert_eq!(alice.session().state(), SessionState::Joined(joined.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let room = h.store.get(&joined.connection.room_path().unwrap()).await.unwrap();
        let room = RoomData::from_snapshot(&room).unwrap().unwrap();
        assert_eq!(room.players.get("Alice"), Some(&Some(h.clock.now())));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_leave_forgets_everything() {
        let h = harness();
        let alice = client(&h.context);
        alice.create_room(quiz()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.clock.advance(TimeDelta::seconds(2));

        assert_eq!(alice.leave().await.unwrap(), LeaveOutcome::ClosedRoom);
        assert_eq!(alice.sessions().load().unwrap(), None);
        assert_eq!(alice.restore().await.unwrap(), None);
    }
}
