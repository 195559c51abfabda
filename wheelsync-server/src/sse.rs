use axum::{
    extract::Query,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::Stream;
use log::warn;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::VecDeque,
    convert::Infallible,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};
use utoipa::ToSchema;
use wheelsync_collab::CollabEvent;
use wheelsync_core::Id;

use crate::{
    context::ServerContext,
    schemas::EventsQuery,
    serialized::{Room, ToSerialized, WheelItem},
    Router,
};

type ConnectionId = Id<Connection>;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    /// The list of active rooms changed
    DirectoryUpdate { rooms: Vec<Room> },
    /// The name or players of a room changed
    #[serde(rename_all = "camelCase")]
    RoomUpdate {
        room_id: String,
        name: String,
        players: Vec<String>,
    },
    /// A room was deleted
    #[serde(rename_all = "camelCase")]
    RoomClosed { room_id: String },
    /// The options on a wheel changed
    #[serde(rename_all = "camelCase")]
    WheelUpdate {
        room_id: String,
        items: Vec<WheelItem>,
        /// The resting rotation of the wheel, in degrees
        rotation: f64,
    },
    /// A wheel started spinning
    #[serde(rename_all = "camelCase")]
    SpinStarted {
        room_id: String,
        /// Total rotation of the animation, in degrees
        target_rotation: f64,
        /// Length of the animation, in milliseconds
        duration: u64,
    },
    /// A wheel stopped on a winner
    #[serde(rename_all = "camelCase")]
    SpinFinished {
        room_id: String,
        winner: WheelItem,
        rotation: f64,
    },
}

impl ServerEvent {
    fn room_id(&self) -> Option<&str> {
        match self {
            Self::DirectoryUpdate { .. } => None,
            Self::RoomUpdate { room_id, .. }
            | Self::RoomClosed { room_id }
            | Self::WheelUpdate { room_id, .. }
            | Self::SpinStarted { room_id, .. }
            | Self::SpinFinished { room_id, .. } => Some(room_id),
        }
    }
}

impl From<CollabEvent> for ServerEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::DirectoryUpdated { rooms } => Self::DirectoryUpdate {
                rooms: rooms.to_serialized(),
            },
            CollabEvent::RoomUpdated {
                room_id,
                name,
                players,
            } => Self::RoomUpdate {
                room_id,
                name,
                players,
            },
            CollabEvent::RoomClosed { room_id } => Self::RoomClosed { room_id },
            CollabEvent::WheelUpdated {
                room_id,
                items,
                rotation,
            } => Self::WheelUpdate {
                room_id,
                items: items.to_serialized(),
                rotation,
            },
            CollabEvent::SpinStarted {
                room_id,
                target_rotation,
                duration,
            } => Self::SpinStarted {
                room_id,
                target_rotation,
                duration: duration.as_millis() as u64,
            },
            CollabEvent::SpinFinished {
                room_id,
                winner,
                rotation,
            } => Self::SpinFinished {
                room_id,
                winner: winner.to_serialized(),
                rotation,
            },
        }
    }
}

/// Manages server sent event connections
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    /// Only room events for this room are sent, if set
    room_id: Option<String>,
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

pub struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending messages
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove connection when dropped
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    pub fn broadcast(&self, event: ServerEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter().filter(|c| c.wants(&event)) {
            connection.send(event.clone())
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    fn connect(&self, room_id: Option<String>) -> ConnectionHandle {
        let connection = Connection::new(room_id);
        let handle = connection.handle(self.me.clone());

        self.connections.lock().push(connection);
        handle
    }

    fn disconnect(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id)
    }
}

impl Connection {
    fn new(room_id: Option<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            room_id,
            pending_messages: Default::default(),
            waker: Default::default(),
        }
    }

    fn wants(&self, event: &ServerEvent) -> bool {
        match (&self.room_id, event.room_id()) {
            (Some(wanted), Some(room_id)) => wanted == room_id,
            _ => true,
        }
    }

    fn send(&self, message: ServerEvent) {
        self.pending_messages.lock().push_back(message);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    fn handle(&self, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending_messages: self.pending_messages.clone(),
            waker: self.waker.clone(),
            manager,
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending_messages = self.pending_messages.lock();

        while let Some(message) = pending_messages.pop_front() {
            match serde_json::to_string(&message) {
                Ok(data) => return Poll::Ready(Some(Ok(Event::default().data(data)))),
                Err(err) => warn!("Dropping event that failed to serialize: {}", err),
            }
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    params(EventsQuery),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of events from wheelsync",
            body = ServerEvent
        )
    )
)]
async fn event_stream(
    context: ServerContext,
    Query(query): Query<EventsQuery>,
) -> Sse<ConnectionHandle> {
    Sse::new(context.sse.connect(query.room_id)).keep_alive(KeepAlive::default())
}

pub fn router() -> Router {
    Router::new().route("/", get(event_stream))
}
