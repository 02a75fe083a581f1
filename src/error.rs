use thiserror::Error;

use crate::types::ServerMsg;

/// Reasons an intent is rejected by a room or the registry.
///
/// None of these mutate room state; the transport turns them into an
/// `error` event addressed to the originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Malformed intent, or one issued outside its preconditions.
    #[error("{0}")]
    Validation(String),
    /// Unknown room code.
    #[error("{0}")]
    NotFound(String),
    /// Room full, already started, or no free room code.
    #[error("{0}")]
    Conflict(String),
    /// The room actor stopped between lookup and dispatch.
    #[error("room is closed")]
    Closed,
}

impl RoomError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Stable machine-readable code carried by the `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) | Self::Closed => "not-found",
            Self::Conflict(_) => "conflict",
        }
    }

    pub fn to_message(&self) -> ServerMsg {
        ServerMsg::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

pub type RoomResult<T> = Result<T, RoomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_rooms_report_as_not_found() {
        let err = RoomError::Closed;
        assert_eq!(err.code(), "not-found");
        match err.to_message() {
            ServerMsg::Error { code, message } => {
                assert_eq!(code, "not-found");
                assert_eq!(message, "room is closed");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
