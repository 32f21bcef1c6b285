//! Wire protocol shared by the PTY broker client and its daemon.
//!
//! Messages are newline-delimited UTF-8 JSON objects tagged by `"type"`.

pub mod codec;
mod errors;
mod messages;
mod types;

pub use codec::JsonLineCodec;
pub use errors::ProtocolError;
pub use messages::{ClientMessage, DaemonMessage, Inbound, Outbound, Reply, Route, SessionEvent};
pub use types::{BufferSnapshot, ExitPayload, ExitSignal, PtyConfig, ResizePayload, SessionInfo};
