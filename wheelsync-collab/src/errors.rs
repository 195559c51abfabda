use thiserror::Error;
use wheelsync_core::StoreError;

use crate::{PersistenceError, RoomId};

pub type Result<T> = std::result::Result<T, CollabError>;

#[derive(Debug, Error)]
pub enum CollabError {
    /// The nickname is already taken in the room being joined
    #[error("Nickname {0} is already in this room")]
    NicknameConflict(String),
    /// No wheel exists under the given password
    #[error("Incorrect password")]
    WrongPassword,
    /// The room being joined doesn't exist
    #[error("Room {0} doesn't exist")]
    RoomNotFound(RoomId),
    /// A room or wheel was deleted while it was being used
    #[error("{0} no longer exists")]
    StaleReference(String),
    /// The session has no room to act on
    #[error("Not in a room")]
    NotJoined,
    /// The session is already in a room
    #[error("Already in a room")]
    AlreadyJoined,
    /// A spin is already requested or animating in this room
    #[error("The wheel is already spinning")]
    SpinInProgress,
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("Invalid password: {0}")]
    InvalidPassword(&'static str),
    #[error("Malformed document {path}: {reason}")]
    MalformedDocument { path: String, reason: String },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// Something else went wrong with the store
    #[error(transparent)]
    Store(StoreError),
}

impl CollabError {
    /// Returns true for errors caused by a race with another client's
    /// cleanup, which callers treat as a no-op.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::RoomNotFound(_) | Self::StaleReference(_))
    }
}

impl From<StoreError> for CollabError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(path) => Self::StaleReference(path.to_string()),
            e => Self::Store(e),
        }
    }
}
