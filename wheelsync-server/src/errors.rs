use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;
use wheelsync_collab::CollabError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

/// Errors that keep the server from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("WHEELSYNC_SERVER_PORT must be a port number, got {0:?}")]
    InvalidPort(String),
    #[error("Could not listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Server stopped unexpectedly: {0}")]
    Serve(#[from] std::io::Error),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Self::Unknown(message) = &self {
            error!("Request failed: {}", message);
        }

        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<CollabError> for ServerError {
    fn from(value: CollabError) -> Self {
        let message = value.to_string();

        match value {
            CollabError::NicknameConflict(_)
            | CollabError::AlreadyJoined
            | CollabError::SpinInProgress => Self::Conflict(message),
            CollabError::WrongPassword => Self::Forbidden(message),
            CollabError::RoomNotFound(_) | CollabError::StaleReference(_) => Self::NotFound(message),
            CollabError::InvalidInput(_) | CollabError::InvalidPassword(_) | CollabError::NotJoined => {
                Self::BadRequest(message)
            }
            _ => Self::Unknown(message),
        }
    }
}
