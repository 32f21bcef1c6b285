use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{BufferSnapshot, ExitPayload, ExitSignal, PtyConfig, ResizePayload, SessionInfo};

/// Client -> daemon messages.
///
/// Each variant maps to a JSONL message with `"type"` as the tag field.
/// `requestId` is not part of the message body; it is attached by the
/// request correlator through [`Outbound`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "create")]
    Create { data: PtyConfig },

    /// Raw text for the session's stdin.
    #[serde(rename = "write")]
    Write { id: String, data: String },

    #[serde(rename = "resize")]
    Resize { id: String, data: ResizePayload },

    #[serde(rename = "kill")]
    Kill { id: String },

    #[serde(rename = "list")]
    List,

    #[serde(rename = "subscribe")]
    Subscribe { id: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { id: String },

    #[serde(rename = "getBuffer")]
    GetBuffer { id: String },

    #[serde(rename = "ping")]
    Ping,
}

impl ClientMessage {
    /// Whether the daemon answers this message with a correlated reply.
    pub fn expects_reply(&self) -> bool {
        match self {
            ClientMessage::Create { .. }
            | ClientMessage::List
            | ClientMessage::GetBuffer { .. }
            | ClientMessage::Ping => true,
            ClientMessage::Write { .. }
            | ClientMessage::Resize { .. }
            | ClientMessage::Kill { .. }
            | ClientMessage::Subscribe { .. }
            | ClientMessage::Unsubscribe { .. } => false,
        }
    }

    /// Wire name of the message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Create { .. } => "create",
            ClientMessage::Write { .. } => "write",
            ClientMessage::Resize { .. } => "resize",
            ClientMessage::Kill { .. } => "kill",
            ClientMessage::List => "list",
            ClientMessage::Subscribe { .. } => "subscribe",
            ClientMessage::Unsubscribe { .. } => "unsubscribe",
            ClientMessage::GetBuffer { .. } => "getBuffer",
            ClientMessage::Ping => "ping",
        }
    }
}

/// A client message as written to the wire.
///
/// Requests carry a `requestId`; one-way commands omit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    #[serde(flatten)]
    pub message: ClientMessage,
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,
}

impl Outbound {
    pub fn one_way(message: ClientMessage) -> Self {
        Self {
            message,
            request_id: None,
        }
    }

    pub fn request(message: ClientMessage, request_id: impl Into<String>) -> Self {
        Self {
            message,
            request_id: Some(request_id.into()),
        }
    }
}

/// Daemon -> client messages.
///
/// Replies echo the `requestId` of the request they answer. `data` and
/// `exit` are unsolicited session events and carry the session in `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DaemonMessage {
    Created {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(alias = "sessionId")]
        id: String,
    },

    List {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(default)]
        data: Vec<SessionInfo>,
    },

    Buffer {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(default)]
        data: BufferSnapshot,
    },

    Pong {
        #[serde(rename = "requestId")]
        request_id: String,
    },

    Error {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },

    Data {
        #[serde(alias = "sessionId")]
        id: String,
        data: String,
    },

    Exit {
        #[serde(alias = "sessionId")]
        id: String,
        #[serde(default)]
        data: ExitPayload,
    },
}

/// Correlated reply body, detached from its request id.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Created { session_id: String },
    List(Vec<SessionInfo>),
    Buffer(BufferSnapshot),
    Pong,
    Error(String),
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Created { .. } => "created",
            Reply::List(_) => "list",
            Reply::Buffer(_) => "buffer",
            Reply::Pong => "pong",
            Reply::Error(_) => "error",
        }
    }
}

/// Unsolicited per-session event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Data(String),
    Exit {
        exit_code: i32,
        signal: Option<ExitSignal>,
    },
}

/// Where an inbound message must be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Goes to the request correlator.
    Reply { request_id: String, reply: Reply },
    /// Goes to the event router.
    Event {
        session_id: String,
        event: SessionEvent,
    },
    /// An error the daemon raised without naming a request.
    Unsolicited { error: String },
    /// A reply that names its request but whose body could not be read.
    Malformed {
        request_id: String,
        kind: String,
        error: String,
    },
}

const UNKNOWN_DAEMON_ERROR: &str = "daemon reported an error without a message";

impl DaemonMessage {
    /// Split a decoded message by destination.
    pub fn route(self) -> Route {
        match self {
            DaemonMessage::Created { request_id, id } => Route::Reply {
                request_id,
                reply: Reply::Created { session_id: id },
            },
            DaemonMessage::List { request_id, data } => Route::Reply {
                request_id,
                reply: Reply::List(data),
            },
            DaemonMessage::Buffer { request_id, data } => Route::Reply {
                request_id,
                reply: Reply::Buffer(data),
            },
            DaemonMessage::Pong { request_id } => Route::Reply {
                request_id,
                reply: Reply::Pong,
            },
            DaemonMessage::Error { request_id, error } => {
                let error = error.unwrap_or_else(|| UNKNOWN_DAEMON_ERROR.to_string());
                match request_id {
                    Some(request_id) => Route::Reply {
                        request_id,
                        reply: Reply::Error(error),
                    },
                    None => Route::Unsolicited { error },
                }
            }
            DaemonMessage::Data { id, data } => Route::Event {
                session_id: id,
                event: SessionEvent::Data(data),
            },
            DaemonMessage::Exit { id, data } => Route::Event {
                session_id: id,
                event: SessionEvent::Exit {
                    exit_code: data.exit_code(),
                    signal: data.signal,
                },
            },
        }
    }
}

/// One line from the daemon, as the client reads it.
///
/// A line that fails to decode as a [`DaemonMessage`] but still carries a
/// string `requestId` becomes [`Inbound::Malformed`], so the request it
/// answers can fail right away. Anything else that fails to decode is a
/// decode error and the codec drops the line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(DaemonMessage),
    Malformed {
        request_id: String,
        kind: String,
        error: String,
    },
}

impl<'de> Deserialize<'de> for Inbound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match DaemonMessage::deserialize(&value) {
            Ok(message) => Ok(Inbound::Message(message)),
            Err(e) => match value.get("requestId").and_then(Value::as_str) {
                Some(request_id) => Ok(Inbound::Malformed {
                    request_id: request_id.to_string(),
                    kind: value
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    error: e.to_string(),
                }),
                None => Err(de::Error::custom(e)),
            },
        }
    }
}

impl Inbound {
    pub fn route(self) -> Route {
        match self {
            Inbound::Message(message) => message.route(),
            Inbound::Malformed {
                request_id,
                kind,
                error,
            } => Route::Malformed {
                request_id,
                kind,
                error,
            },
        }
    }
}
