use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use wheelsync_core::DocumentStore;

use crate::{
    CollabContext, CollabEvent, Connection, RoomData, SpinPlan, WheelData, WheelSync, WheelView,
};

/// Relays the room and wheel documents of a joined room as events, and
/// plays spins as they are observed.
///
/// The feed ends when the room is deleted or the handle is dropped, which
/// releases both subscriptions.
#[derive(Debug)]
pub struct RoomFeed {
    task: JoinHandle<()>,
    state: Arc<Mutex<FeedState>>,
}

#[derive(Debug)]
struct FeedState {
    sync: WheelSync,
    animation: Option<Animation>,
}

#[derive(Debug)]
struct Animation {
    plan: SpinPlan,
    started: Instant,
}

impl RoomFeed {
    pub fn start<Db>(context: &CollabContext<Db>, connection: Connection) -> Self
    where
        Db: DocumentStore,
    {
        let state = Arc::new(Mutex::new(FeedState {
            sync: WheelSync::new(&context.config),
            animation: None,
        }));

        let task = tokio::spawn(run(context.clone(), connection, state.clone()));
        Self { task, state }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Claims the next spin of this wheel. Returns false while a spin is
    /// animating or a requested one hasn't come back from the store.
    pub fn begin_spin(&self) -> bool {
        self.state.lock().sync.begin_request()
    }

    /// Releases a claim whose spin was never written
    pub fn cancel_spin(&self) {
        self.state.lock().sync.cancel_request()
    }

    /// The wheel as it should be drawn right now
    pub fn view(&self) -> WheelView {
        let state = self.state.lock();

        let rotation = match &state.animation {
            Some(animation) => animation.plan.rotation_at(animation.started.elapsed()),
            None => state.sync.rotation(),
        };

        WheelView {
            items: state.sync.items().to_vec(),
            rotation,
            spinning: state.sync.is_spinning(),
            can_spin: state.sync.can_spin(),
        }
    }
}

impl Drop for RoomFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<Db>(context: CollabContext<Db>, connection: Connection, state: Arc<Mutex<FeedState>>)
where
    Db: DocumentStore,
{
    let (room_path, wheel_path) = match (connection.room_path(), connection.wheel_path()) {
        (Ok(room), Ok(wheel)) => (room, wheel),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot follow room {}: {}", connection, e);
            return;
        }
    };

    let room_id = connection.room_id.clone();
    let mut rooms = context.store.subscribe_document(&room_path);
    let mut wheels = context.store.subscribe_document(&wheel_path);

    loop {
        let deadline = state
            .lock()
            .animation
            .as_ref()
            .map(|animation| animation.started + animation.plan.duration);

        tokio::select! {
            snapshot = rooms.next() => {
                let Some(snapshot) = snapshot else { break };

                match RoomData::from_snapshot(&snapshot) {
                    Ok(Some(room)) => context.emit(CollabEvent::RoomUpdated {
                        room_id: room_id.clone(),
                        players: room.player_names(),
                        name: room.name,
                    }),
                    Ok(None) => {
                        context.emit(CollabEvent::RoomClosed { room_id: room_id.clone() });
                        break;
                    }
                    Err(e) => warn!("Ignoring room update: {}", e),
                }
            }
            snapshot = wheels.next() => {
                let Some(snapshot) = snapshot else { break };

                let wheel = match WheelData::from_snapshot(&snapshot) {
                    Ok(Some(wheel)) => wheel,
                    // The room document follows shortly
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Ignoring wheel update: {}", e);
                        continue;
                    }
                };

                context.emit(CollabEvent::WheelUpdated {
                    room_id: room_id.clone(),
                    items: wheel.items.clone(),
                    rotation: wheel.rotation,
                });

                let (plan, previous) = {
                    let mut state = state.lock();
                    let Some(plan) = state.sync.apply(wheel) else { continue };

                    let previous = state.animation.replace(Animation {
                        plan: plan.clone(),
                        started: Instant::now(),
                    });

                    (plan, previous)
                };

                // A newer spin cuts the running animation short
                if let Some(previous) = previous {
                    finish(&context, &room_id, previous.plan);
                }

                context.emit(CollabEvent::SpinStarted {
                    room_id: room_id.clone(),
                    target_rotation: plan.target_rotation,
                    duration: plan.duration,
                });
            }
            _ = wait_until(deadline) => {
                let finished = {
                    let mut state = state.lock();
                    state.sync.finish();
                    state.animation.take()
                };

                if let Some(animation) = finished {
                    finish(&context, &room_id, animation.plan);
                }
            }
        }
    }

    debug!("Stopped following room {}", room_id);
}

fn finish<Db>(context: &CollabContext<Db>, room_id: &str, plan: SpinPlan)
where
    Db: DocumentStore,
{
    context.emit(CollabEvent::SpinFinished {
        room_id: room_id.to_string(),
        winner: plan.winner,
        rotation: plan.rotation,
    });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
