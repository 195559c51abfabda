use async_trait::async_trait;
use thiserror::Error;

use crate::{CollectionPath, DocPath, Fields, Subscription, Update, Value};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The document being updated doesn't exist
    #[error("{0} doesn't exist")]
    NotFound(DocPath),
    /// A path segment is not allowed by the store
    #[error("Invalid path {0}")]
    InvalidPath(String),
    /// An unknown or internal error happened in the store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

/// The state of one document at some point in time.
/// `fields` is `None` when the document doesn't exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocPath,
    pub fields: Option<Fields>,
}

/// Every existing document of a collection at some point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub path: CollectionPath,
    pub documents: Vec<DocumentSnapshot>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Returns a top-level field, if the document and field exist
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.as_ref().and_then(|f| f.get(field))
    }
}

/// Represents a document database with push notifications on change.
///
/// Every operation is atomic per document. Subscriptions deliver the current
/// snapshot right away, then a fresh snapshot after every change.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Reads a document once
    async fn get(&self, path: &DocPath) -> Result<DocumentSnapshot>;

    /// Creates or overwrites a document with the result of applying `update`
    /// to an empty document
    async fn set(&self, path: &DocPath, update: Update) -> Result<()>;

    /// Creates a document with a generated id in the collection
    async fn add(&self, collection: &CollectionPath, update: Update) -> Result<DocPath>;

    /// Applies a partial update to an existing document.
    /// Fails with [StoreError::NotFound] if the document doesn't exist.
    async fn update(&self, path: &DocPath, update: Update) -> Result<()>;

    /// Deletes a document. Deleting a missing document is not an error.
    async fn delete(&self, path: &DocPath) -> Result<()>;

    fn subscribe_document(&self, path: &DocPath) -> Subscription<DocumentSnapshot>;

    fn subscribe_collection(&self, collection: &CollectionPath) -> Subscription<CollectionSnapshot>;
}
