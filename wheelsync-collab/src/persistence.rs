use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::warn;
use parking_lot::Mutex;
use thiserror::Error;

use crate::{Connection, JoinedRoom};

pub const CONNECTION_KEY: &str = "connection";
pub const NICKNAME_KEY: &str = "nickname";
pub const TAB_COUNT_KEY: &str = "tabCount";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to access session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// A string key/value store on the client
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> PersistenceResult<()>;
    fn remove(&self, key: &str) -> PersistenceResult<()>;
    fn clear(&self) -> PersistenceResult<()>;
}

/// A store that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

/// A store persisted as a JSON object, rewritten on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistenceResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> PersistenceResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn modify<F>(&self, modify: F) -> PersistenceResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self.entries.lock();
        modify(&mut entries);

        fs::write(&self.path, serde_json::to_vec_pretty(&*entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> PersistenceResult<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> PersistenceResult<()> {
        self.modify(BTreeMap::clear)
    }
}

/// What happened when a tab was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabClose {
    /// Other tabs still use the session
    OtherTabsOpen(u32),
    /// This was the last tab. The session was moved to the reload marker,
    /// and the caller should leave the room.
    LastTab { session: Option<JoinedRoom> },
}

/// Remembers which room a client is in across reloads.
///
/// The durable tier survives restarts. The reload tier only holds the
/// session while the last tab reloads, so leaving on close doesn't lose it.
pub struct SessionStore<D, R> {
    durable: D,
    reload: R,
}

impl<D, R> SessionStore<D, R>
where
    D: KeyValueStore,
    R: KeyValueStore,
{
    pub fn new(durable: D, reload: R) -> Self {
        Self { durable, reload }
    }

    pub fn save(&self, session: &JoinedRoom) -> PersistenceResult<()> {
        write_session(&self.durable, session)
    }

    /// Loads the durable session, or the one left by a reload
    pub fn load(&self) -> PersistenceResult<Option<JoinedRoom>> {
        match read_session(&self.durable)? {
            Some(session) => Ok(Some(session)),
            None => read_session(&self.reload),
        }
    }

    /// Forgets the durable session and the tab count
    pub fn clear(&self) -> PersistenceResult<()> {
        self.durable.remove(CONNECTION_KEY)?;
        self.durable.remove(NICKNAME_KEY)?;
        self.durable.remove(TAB_COUNT_KEY)
    }

    pub fn mark_reload(&self, session: &JoinedRoom) -> PersistenceResult<()> {
        write_session(&self.reload, session)
    }

    pub fn clear_reload(&self) -> PersistenceResult<()> {
        self.reload.clear()
    }

    pub fn tab_count(&self) -> PersistenceResult<u32> {
        let count = self.durable.get(TAB_COUNT_KEY)?;
        Ok(count.and_then(|c| c.parse().ok()).unwrap_or(0))
    }

    /// Counts a newly opened tab. Returns the new count.
    pub fn tab_opened(&self) -> PersistenceResult<u32> {
        let count = self.tab_count()?.saturating_add(1);
        self.durable.set(TAB_COUNT_KEY, &count.to_string())?;

        Ok(count)
    }

    /// Counts a closing tab. The last tab moves the session to the reload marker.
    pub fn tab_closing(&self) -> PersistenceResult<TabClose> {
        let count = self.tab_count()?.saturating_sub(1);

        if count > 0 {
            self.durable.set(TAB_COUNT_KEY, &count.to_string())?;
            return Ok(TabClose::OtherTabsOpen(count));
        }

        let session = read_session(&self.durable)?;

        if let Some(session) = &session {
            self.mark_reload(session)?;
        }

        self.clear()?;
        Ok(TabClose::LastTab { session })
    }
}

fn write_session(store: &impl KeyValueStore, session: &JoinedRoom) -> PersistenceResult<()> {
    store.set(CONNECTION_KEY, &session.connection.to_string())?;
    store.set(NICKNAME_KEY, &session.nickname)
}

fn read_session(store: &impl KeyValueStore) -> PersistenceResult<Option<JoinedRoom>> {
    let (Some(connection), Some(nickname)) = (store.get(CONNECTION_KEY)?, store.get(NICKNAME_KEY)?)
    else {
        return Ok(None);
    };

    match connection.parse::<Connection>() {
        Ok(connection) => Ok(Some(JoinedRoom {
            connection,
            nickname,
        })),
        Err(e) => {
            warn!("Ignoring stored connection {:?}: {}", connection, e);
            Ok(None)
        }
    }
}
