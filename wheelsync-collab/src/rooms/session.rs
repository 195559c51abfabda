use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{interval_at, sleep, Instant},
};
use wheelsync_core::DocumentStore;

use crate::{CollabContext, CollabError, Result};

use super::{JoinRoom, JoinedRoom, LeaveOutcome, NewRoom};

/// Where a [RoomSession] is in its lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Joining,
    Joined(JoinedRoom),
    Leaving,
}

/// The lifecycle of one client in one room at a time
pub struct RoomSession<Db> {
    context: CollabContext<Db>,
    state: Mutex<SessionState>,
}

/// A running presence task, which is stopped when this is dropped
#[derive(Debug)]
pub struct PresenceHandle {
    task: JoinHandle<()>,
}

impl<Db> RoomSession<Db>
where
    Db: DocumentStore,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
            state: Default::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Returns the joined room, or [CollabError::NotJoined]
    pub fn joined(&self) -> Result<JoinedRoom> {
        match &*self.state.lock() {
            SessionState::Joined(joined) => Ok(joined.clone()),
            _ => Err(CollabError::NotJoined),
        }
    }

    /// Picks up a room the client was in before a reload
    pub fn resume(&self, joined: JoinedRoom) -> Result<()> {
        let mut state = self.state.lock();

        if *state != SessionState::Disconnected {
            return Err(CollabError::AlreadyJoined);
        }

        *state = SessionState::Joined(joined);
        Ok(())
    }

    pub async fn create_room(&self, new_room: NewRoom) -> Result<JoinedRoom> {
        self.begin_joining()?;
        let result = super::create_room(&self.context, new_room).await;
        self.finish_joining(result)
    }

    pub async fn join_room(&self, join: JoinRoom) -> Result<JoinedRoom> {
        self.begin_joining()?;
        let result = super::join_room(&self.context, join).await;
        self.finish_joining(result)
    }

    pub async fn login(&self) -> Result<bool> {
        super::login(&self.context, &self.joined()?).await
    }

    pub async fn heartbeat(&self) -> Result<Vec<String>> {
        super::heartbeat(&self.context, &self.joined()?).await
    }

    /// Leaves the room. The session ends up disconnected whether or not
    /// the store could be updated.
    pub async fn leave(&self) -> Result<LeaveOutcome> {
        let joined = {
            let mut state = self.state.lock();

            match std::mem::replace(&mut *state, SessionState::Leaving) {
                SessionState::Joined(joined) => joined,
                previous => {
                    *state = previous;
                    return Err(CollabError::NotJoined);
                }
            }
        };

        let result = super::leave_room(&self.context, &joined).await;
        *self.state.lock() = SessionState::Disconnected;

        result
    }

    /// Writes the first heartbeat after the settle delay, then refreshes it
    /// every heartbeat interval until the session leaves or the room is gone.
    pub fn run_presence(self: &Arc<Self>) -> PresenceHandle {
        let session = self.clone();
        let config = self.context.config.clone();

        let task = tokio::spawn(async move {
            sleep(config.settle_delay).await;

            match session.login().await {
                Ok(_) => {}
                Err(e) if e.is_benign() || matches!(e, CollabError::NotJoined) => {
                    debug!("Stopping presence before login: {}", e);
                    return;
                }
                Err(e) => warn!("Failed to log into room: {}", e),
            }

            let period = config.heartbeat_interval;
            let mut interval = interval_at(Instant::now() + period, period);

            loop {
                interval.tick().await;

                match session.heartbeat().await {
                    Ok(_) => {}
                    Err(CollabError::NotJoined) => break,
                    Err(e) if e.is_benign() => {
                        info!("Room is gone, stopping presence: {}", e);
                        break;
                    }
                    Err(e) => warn!("Heartbeat failed: {}", e),
                }
            }
        });

        PresenceHandle { task }
    }

    fn begin_joining(&self) -> Result<()> {
        let mut state = self.state.lock();

        if *state != SessionState::Disconnected {
            return Err(CollabError::AlreadyJoined);
        }

        *state = SessionState::Joining;
        Ok(())
    }

    fn finish_joining(&self, result: Result<JoinedRoom>) -> Result<JoinedRoom> {
        let mut state = self.state.lock();

        *state = match &result {
            Ok(joined) => SessionState::Joined(joined.clone()),
            Err(_) => SessionState::Disconnected,
        };

        result
    }
}

impl PresenceHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
