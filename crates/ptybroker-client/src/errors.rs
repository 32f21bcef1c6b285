use std::error::Error;

use ptybroker_paths::PathError;
use ptybroker_protocol::ProtocolError;
use ptybroker_reaper::TerminateError;

/// Base trait for all broker errors.
pub trait BrokerError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Errors surfaced by client operations.
///
/// `Clone` so one failed connect attempt can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Could not connect to the PTY daemon: {message}")]
    Connection { message: String },

    #[error("Request '{kind}' ({request_id}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        request_id: String,
        kind: &'static str,
        timeout_ms: u64,
    },

    #[error("Failed to start the PTY daemon: {message}")]
    DaemonSpawn { message: String },

    #[error("Daemon error: {message}")]
    Daemon { message: String },

    #[error("Connection to the PTY daemon closed before a reply arrived")]
    ConnectionClosed,

    #[error("Client is shutting down")]
    ShuttingDown,

    #[error("Expected a '{expected}' reply, got '{got}'")]
    UnexpectedReply {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Reply '{kind}' to {request_id} could not be read: {message}")]
    MalformedReply {
        request_id: String,
        kind: String,
        message: String,
    },
}

impl BrokerError for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            ClientError::Connection { .. } => "CONNECTION_FAILED",
            ClientError::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            ClientError::DaemonSpawn { .. } => "DAEMON_SPAWN_FAILED",
            ClientError::Daemon { .. } => "DAEMON_ERROR",
            ClientError::ConnectionClosed => "CONNECTION_CLOSED",
            ClientError::ShuttingDown => "CLIENT_SHUTTING_DOWN",
            ClientError::UnexpectedReply { .. } => "UNEXPECTED_REPLY",
            ClientError::MalformedReply { .. } => "MALFORMED_REPLY",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, ClientError::Daemon { .. })
    }
}

/// Errors from launching the daemon process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Could not determine daemon binary path: {message}")]
    BinaryNotFound { message: String },

    #[error("Failed to spawn '{binary}': {message}")]
    SpawnFailed { binary: String, message: String },
}

impl BrokerError for SupervisorError {
    fn error_code(&self) -> &'static str {
        match self {
            SupervisorError::BinaryNotFound { .. } => "DAEMON_BINARY_NOT_FOUND",
            SupervisorError::SpawnFailed { .. } => "DAEMON_SPAWN_FAILED",
        }
    }
}

impl From<SupervisorError> for ClientError {
    fn from(e: SupervisorError) -> Self {
        ClientError::DaemonSpawn {
            message: e.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Failed to read config file '{path}': {message}")]
    Read { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl BrokerError for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::Parse { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::Read { .. } => "CONFIG_READ_ERROR",
            ConfigError::Invalid { .. } => "CONFIG_INVALID",
        }
    }

    fn is_user_error(&self) -> bool {
        true
    }
}

impl BrokerError for ProtocolError {
    fn error_code(&self) -> &'static str {
        ProtocolError::error_code(self)
    }
}

impl BrokerError for TerminateError {
    fn error_code(&self) -> &'static str {
        TerminateError::error_code(self)
    }
}

impl BrokerError for PathError {
    fn error_code(&self) -> &'static str {
        match self {
            PathError::HomeNotFound => "HOME_NOT_FOUND",
        }
    }

    fn is_user_error(&self) -> bool {
        true
    }
}
