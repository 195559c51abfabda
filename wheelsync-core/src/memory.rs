use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::{
    random_id, Clock, CollectionPath, CollectionSnapshot, DocPath, DocumentSnapshot,
    DocumentStore, Fields, Id, Result, StoreError, Subscription, SystemClock, Update,
};

/// Length of generated document ids
pub const GENERATED_ID_LENGTH: usize = 20;

type ListenerId = Id<Listener>;

/// An in-process document store.
///
/// Documents and listeners share one lock, so snapshots of a document are
/// delivered in the same order its writes were applied.
#[derive(Clone)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<DocPath, Fields>,
    listeners: Vec<Listener>,
}

struct Listener {
    id: ListenerId,
    target: Target,
}

enum Target {
    Document {
        path: DocPath,
        sender: UnboundedSender<DocumentSnapshot>,
    },
    Collection {
        path: CollectionPath,
        sender: UnboundedSender<CollectionSnapshot>,
    },
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store that stamps server timestamps with the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Default::default(),
        }
    }

    /// Returns the number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn write<F>(&self, path: &DocPath, write: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<DocPath, Fields>) -> Result<bool>,
    {
        let mut state = self.state.lock();
        let changed = write(&mut state.documents)?;

        if changed {
            state.notify(path);
        }

        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn document(&self, path: &DocPath) -> DocumentSnapshot {
        DocumentSnapshot {
            path: path.clone(),
            fields: self.documents.get(path).cloned(),
        }
    }

    fn collection(&self, path: &CollectionPath) -> CollectionSnapshot {
        let documents = self
            .documents
            .iter()
            .filter(|(doc_path, _)| doc_path.parent() == *path)
            .map(|(doc_path, fields)| DocumentSnapshot {
                path: doc_path.clone(),
                fields: Some(fields.clone()),
            })
            .collect();

        CollectionSnapshot {
            path: path.clone(),
            documents,
        }
    }

    /// Sends fresh snapshots to everyone watching the document or its collection
    fn notify(&mut self, path: &DocPath) {
        let parent = path.parent();
        let mut closed = Vec::new();

        for listener in &self.listeners {
            let delivered = match &listener.target {
                Target::Document { path: watched, sender } if watched == path => {
                    sender.send(self.document(path)).is_ok()
                }
                Target::Collection { path: watched, sender } if *watched == parent => {
                    sender.send(self.collection(&parent)).is_ok()
                }
                _ => true,
            };

            if !delivered {
                closed.push(listener.id);
            }
        }

        self.listeners.retain(|l| !closed.contains(&l.id));
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|l| l.id != id)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<DocumentSnapshot> {
        Ok(self.state.lock().document(path))
    }

    async fn set(&self, path: &DocPath, update: Update) -> Result<()> {
        let now = self.clock.now();

        self.write(path, |documents| {
            let mut fields = Fields::new();
            update.apply(&mut fields, now);
            documents.insert(path.clone(), fields);

            Ok(true)
        })
    }

    async fn add(&self, collection: &CollectionPath, update: Update) -> Result<DocPath> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let path = loop {
            let candidate = collection.doc(&random_id(GENERATED_ID_LENGTH))?;

            if !state.documents.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut fields = Fields::new();
        update.apply(&mut fields, now);
        state.documents.insert(path.clone(), fields);
        state.notify(&path);

        Ok(path)
    }

    async fn update(&self, path: &DocPath, update: Update) -> Result<()> {
        let now = self.clock.now();

        self.write(path, |documents| {
            let fields = documents
                .get_mut(path)
                .ok_or_else(|| StoreError::NotFound(path.clone()))?;

            update.apply(fields, now);
            Ok(true)
        })
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        self.write(path, |documents| Ok(documents.remove(path).is_some()))
    }

    fn subscribe_document(&self, path: &DocPath) -> Subscription<DocumentSnapshot> {
        let (sender, receiver) = unbounded_channel();
        let id = ListenerId::new();

        {
            let mut state = self.state.lock();

            // The current snapshot is queued before anyone else can write
            let _ = sender.send(state.document(path));

            state.listeners.push(Listener {
                id,
                target: Target::Document {
                    path: path.clone(),
                    sender,
                },
            });
        }

        debug!("Subscribed to document {}", path);

        let state = Arc::downgrade(&self.state);
        Subscription::new(receiver, move || {
            if let Some(state) = state.upgrade() {
                state.lock().remove_listener(id)
            }
        })
    }

    fn subscribe_collection(&self, collection: &CollectionPath) -> Subscription<CollectionSnapshot> {
        let (sender, receiver) = unbounded_channel();
        let id = ListenerId::new();

        {
            let mut state = self.state.lock();
            let _ = sender.send(state.collection(collection));

            state.listeners.push(Listener {
                id,
                target: Target::Collection {
                    path: collection.clone(),
                    sender,
                },
            });
        }

        debug!("Subscribed to collection {}", collection);

        let state = Arc::downgrade(&self.state);
        Subscription::new(receiver, move || {
            if let Some(state) = state.upgrade() {
                state.lock().remove_listener(id)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{ManualClock, Value};

    fn rooms() -> CollectionPath {
        CollectionPath::root("rooms").unwrap()
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = MemoryStore::new();
        let path = rooms().doc("missing").unwrap();

        let result = store.update(&path, Update::new().set("name", "x")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        // Deleting twice is fine
        store.delete(&path).await.unwrap();
        store.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn server_timestamps_use_the_store_clock() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let store = MemoryStore::with_clock(clock.clone());

        let path = store
            .add(&rooms(), Update::new().server_timestamp("createdAt"))
            .await
            .unwrap();

        assert_eq!(path.id().len(), GENERATED_ID_LENGTH);

        clock.advance(Duration::minutes(3));
        store
            .update(&path, Update::new().server_timestamp("seenAt"))
            .await
            .unwrap();

        let snapshot = store.get(&path).await.unwrap();
        assert_eq!(snapshot.get("createdAt"), Some(&Value::Timestamp(start)));
        assert_eq!(
            snapshot.get("seenAt"),
            Some(&Value::Timestamp(start + Duration::minutes(3)))
        );
    }

    #[tokio::test]
    async fn document_subscription_receives_every_change() {
        let store = MemoryStore::new();
        let path = rooms().doc("abc").unwrap();
        let mut subscription = store.subscribe_document(&path);

        assert!(!subscription.next().await.unwrap().exists());

        store.set(&path, Update::new().set("name", "Quiz")).await.unwrap();
        store.delete(&path).await.unwrap();

        let created = subscription.next().await.unwrap();
        assert_eq!(created.get("name"), Some(&Value::from("Quiz")));
        assert!(!subscription.next().await.unwrap().exists());
        assert!(subscription.try_next().is_none());
    }

    #[tokio::test]
    async fn collection_subscription_ignores_subcollections() {
        let store = MemoryStore::new();
        let room = rooms().doc("abc").unwrap();
        let wheel = room.collection("wheel").unwrap().doc("items").unwrap();
        let mut subscription = store.subscribe_collection(&rooms());

        assert!(subscription.next().await.unwrap().documents.is_empty());

        store.set(&room, Update::new()).await.unwrap();
        store.set(&wheel, Update::new()).await.unwrap();

        let snapshot = subscription.next().await.unwrap();
        assert_eq!(snapshot.documents.len(), 1);
        assert!(subscription.try_next().is_none());
    }

    #[tokio::test]
    async fn dropping_a_subscription_releases_it() {
        let store = MemoryStore::new();
        let subscription = store.subscribe_collection(&rooms());

        assert_eq!(store.listener_count(), 1);
        drop(subscription);
        assert_eq!(store.listener_count(), 0);
    }
}
