//! Realtime event types and frame decoding.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::request::RequestError;
use crate::transport::TransportError;

pub const HEARTBEAT_KEY: &str = "com.linkedin.realtimefrontend.Heartbeat";
pub const CLIENT_CONNECTION_KEY: &str = "com.linkedin.realtimefrontend.ClientConnection";
pub const DECORATED_EVENT_KEY: &str = "com.linkedin.realtimefrontend.DecoratedEvent";

/// Sent once the server has registered the stream.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientConnection {
    pub id: String,
    #[serde(default, rename = "personalTopics", skip_serializing_if = "Vec::is_empty")]
    pub personal_topics: Vec<String>,
}

/// A server-pushed notification; the payload is passed through untouched.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecoratedEvent {
    pub topic: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub left_server_at: Option<i64>,
    #[serde(default)]
    pub publisher_tracking_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Why a realtime stream failed.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("realtime connect failed: {0}")]
    Connect(#[from] RequestError),

    #[error("realtime stream read failed: {0}")]
    Read(#[source] TransportError),

    #[error("realtime endpoint answered {0} instead of opening a stream")]
    UnexpectedStatus(StatusCode),
}

/// One dispatchable realtime notification.
#[derive(Debug)]
pub enum RealtimeEvent {
    Heartbeat,
    ClientConnection(ClientConnection),
    /// `None` means the stream closed cleanly or was stopped.
    TransientDisconnect(Option<RealtimeError>),
    BadCredentials(RealtimeError),
    UnknownError(RealtimeError),
    DecoratedEvent(DecoratedEvent),
}

impl RealtimeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Heartbeat => EventKind::Heartbeat,
            Self::ClientConnection(_) => EventKind::ClientConnection,
            Self::TransientDisconnect(_) => EventKind::TransientDisconnect,
            Self::BadCredentials(_) => EventKind::BadCredentials,
            Self::UnknownError(_) => EventKind::UnknownError,
            Self::DecoratedEvent(_) => EventKind::DecoratedEvent,
        }
    }

    /// Terminal events end a realtime session.
    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    Heartbeat,
    ClientConnection,
    TransientDisconnect,
    BadCredentials,
    UnknownError,
    DecoratedEvent,
}

impl EventKind {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::TransientDisconnect | Self::BadCredentials | Self::UnknownError
        )
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame must be an object with exactly one key")]
    Shape,
}

/// Decodes one frame. Unknown frame types yield `Ok(None)`.
pub fn decode_frame(frame: &str) -> Result<Option<RealtimeEvent>, FrameError> {
    let mut object: Map<String, Value> = serde_json::from_str(frame)?;
    if object.len() != 1 {
        return Err(FrameError::Shape);
    }
    let Some((key, value)) = object.iter_mut().next() else {
        return Err(FrameError::Shape);
    };

    let event = match key.as_str() {
        HEARTBEAT_KEY => RealtimeEvent::Heartbeat,
        CLIENT_CONNECTION_KEY => {
            RealtimeEvent::ClientConnection(serde_json::from_value(value.take())?)
        }
        DECORATED_EVENT_KEY => RealtimeEvent::DecoratedEvent(serde_json::from_value(value.take())?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Maps a stream failure to the event reported for it.
pub fn classify_failure(error: RealtimeError) -> RealtimeEvent {
    match failure_kind(&error) {
        EventKind::BadCredentials => RealtimeEvent::BadCredentials(error),
        EventKind::TransientDisconnect => RealtimeEvent::TransientDisconnect(Some(error)),
        _ => RealtimeEvent::UnknownError(error),
    }
}

fn failure_kind(error: &RealtimeError) -> EventKind {
    match error {
        RealtimeError::Connect(RequestError::AuthRequired { .. }) => EventKind::BadCredentials,
        RealtimeError::Connect(RequestError::Network(_) | RequestError::ServerError { .. })
        | RealtimeError::Read(_) => EventKind::TransientDisconnect,
        RealtimeError::Connect(
            RequestError::UnexpectedStatus { .. } | RequestError::InvalidHeader { .. },
        )
        | RealtimeError::UnexpectedStatus(_) => EventKind::UnknownError,
    }
}
