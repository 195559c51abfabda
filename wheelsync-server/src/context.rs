use std::{convert::Infallible, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use wheelsync_collab::Collab;
use wheelsync_core::MemoryStore;

use crate::sse::ServerSentEvents;

/// The collab system the server exposes
pub type ServerCollab = Collab<MemoryStore>;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<ServerCollab>,
    pub sse: Arc<ServerSentEvents>,
}

impl ServerContext {
    pub fn new(collab: Arc<ServerCollab>) -> Self {
        Self {
            collab,
            sse: ServerSentEvents::new(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ServerContext
where
    ServerContext: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_ref(state))
    }
}
