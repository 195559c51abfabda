mod directory;
mod feed;
mod lifecycle;
mod session;

pub use directory::*;
pub use feed::*;
pub use lifecycle::*;
pub use session::*;

#[cfg(test)]
pub(crate) mod testing {
    use std::{sync::Arc, time::Duration};

    use chrono::Utc;
    use wheelsync_core::{ManualClock, MemoryStore};

    use crate::{CollabContext, CollabEvent, Config, EventReceiver};

    pub struct Harness {
        pub clock: Arc<ManualClock>,
        pub store: Arc<MemoryStore>,
        pub context: CollabContext<MemoryStore>,
        pub events: EventReceiver,
    }

    pub fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let (context, events) = CollabContext::new(store.clone(), clock.clone(), Config::default());

        Harness {
            clock,
            store,
            context,
            events,
        }
    }

    /// Waits for the next event matching `filter`, skipping others
    pub async fn next_event<F>(events: &EventReceiver, mut filter: F) -> CollabEvent
    where
        F: FnMut(&CollabEvent) -> bool,
    {
        let wait = async {
            loop {
                match events.try_recv() {
                    Ok(event) if filter(&event) => return event,
                    Ok(_) => {}
                    Err(_) => tokio::time::sleep(Duration::from_millis(1)).await,
                }
            }
        };

        tokio::time::timeout(Duration::from_secs(30), wait)
            .await
            .expect("event should arrive")
    }
}
