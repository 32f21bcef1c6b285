use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Launch parameters for a PTY session.
///
/// Sent as the `data` payload of a `create` request and echoed back by the
/// daemon inside every `SessionInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtyConfig {
    pub shell: String,
    #[serde(rename = "shellArgs", alias = "args", default)]
    pub args: Vec<String>,
    pub cwd: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
}

impl PtyConfig {
    /// A config for `shell` in `cwd` with no arguments, no extra
    /// environment and the default 24x80 geometry.
    pub fn new(shell: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            rows: default_rows(),
            cols: default_cols(),
        }
    }
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

/// Terminal geometry carried by a `resize` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizePayload {
    pub cols: u16,
    pub rows: u16,
}

/// Snapshot of a session as reported by the daemon. Read-only on the client.
///
/// Timestamps are epoch milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub config: PtyConfig,
    pub created_at: i64,
    #[serde(default)]
    pub last_data_at: Option<i64>,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default)]
    pub buffer_size: usize,
}

impl SessionInfo {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }

    pub fn last_data_at(&self) -> Option<DateTime<Utc>> {
        self.last_data_at.and_then(DateTime::from_timestamp_millis)
    }
}

/// Output the daemon retained for a session, plus whether its process is gone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferSnapshot {
    #[serde(default)]
    pub buffer: String,
    #[serde(default)]
    pub is_dead: bool,
}

/// Signal that terminated a session's process.
///
/// Daemons report either the numeric signal or its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExitSignal {
    Number(i32),
    Name(String),
}

impl std::fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitSignal::Number(n) => write!(f, "{}", n),
            ExitSignal::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Payload of an `exit` event. Both fields may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitPayload {
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub signal: Option<ExitSignal>,
}

impl ExitPayload {
    /// Exit code with the protocol default (0) applied.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(0)
    }
}
