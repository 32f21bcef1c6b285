//! ptybroker-client: talk to the PTY daemon from any host process.
//!
//! The daemon owns the pseudo-terminals; this crate owns the connection to
//! it. Requests are correlated to their replies by id, session output is
//! routed to per-session handlers, and a daemon that is not running is
//! started on first use.
//!
//! # Main Entry Points
//!
//! - [`BrokerClient`] - Create, drive and observe PTY sessions
//! - [`ClientConfig`] - Timeouts, backoff and endpoint settings
//! - [`init_logging`] - Structured JSON logs on stderr

mod client;
mod config;
mod connection;
mod correlator;
mod errors;
mod logging;
mod router;
mod supervisor;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::BrokerClient;
pub use config::{ClientConfig, DAEMON_ENV_VAR};
pub use connection::{ConnectionState, ReconnectPolicy};
pub use errors::{BrokerError, ClientError, ConfigError, SupervisorError};
pub use logging::init_logging;
pub use router::{FnHandler, SessionHandler};
pub use supervisor::{DaemonLauncher, ProcessLauncher};
pub use transport::{Connector, EndpointConnector, Transport};

pub use ptybroker_paths::{BrokerPaths, Endpoint};
pub use ptybroker_protocol::{BufferSnapshot, ExitSignal, PtyConfig, SessionEvent, SessionInfo};
pub use ptybroker_reaper::{ExitObservation, Terminate, TerminateError, TerminationOutcome};
