use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};

use crate::{ActiveRoom, RoomId, WheelItem};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted as the rooms and wheels change in the store
#[derive(Debug, Clone, PartialEq)]
pub enum CollabEvent {
    /// The set of active rooms was recomputed
    DirectoryUpdated { rooms: Vec<ActiveRoom> },
    /// A joined room document changed
    RoomUpdated {
        room_id: RoomId,
        name: String,
        /// Sorted nicknames
        players: Vec<String>,
    },
    /// A joined room was deleted
    RoomClosed { room_id: RoomId },
    /// The wheel of a joined room changed
    WheelUpdated {
        room_id: RoomId,
        items: Vec<WheelItem>,
        rotation: f64,
    },
    /// A spin was observed and its animation started
    SpinStarted {
        room_id: RoomId,
        /// Total rotation of the animation, in degrees
        target_rotation: f64,
        duration: Duration,
    },
    /// A spin animation ended on a winner
    SpinFinished {
        room_id: RoomId,
        winner: WheelItem,
        /// The resting rotation the wheel snaps back to
        rotation: f64,
    },
}

impl CollabEvent {
    /// The room this event concerns, if any
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::DirectoryUpdated { .. } => None,
            Self::RoomUpdated { room_id, .. }
            | Self::RoomClosed { room_id }
            | Self::WheelUpdated { room_id, .. }
            | Self::SpinStarted { room_id, .. }
            | Self::SpinFinished { room_id, .. } => Some(room_id),
        }
    }
}
