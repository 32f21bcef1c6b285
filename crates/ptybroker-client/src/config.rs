//! Client configuration.
//!
//! Loaded from the `[client]` section of `~/.ptybroker/config.toml`:
//!
//! ```toml
//! [client]
//! endpoint = "/run/user/1000/ptybroker.sock"
//! request_timeout_ms = 10000
//! kill_timeout_ms = 5000
//! ```
//!
//! Every field is optional. A missing file yields the defaults; a file that
//! cannot be read or parsed is logged and the defaults are used instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ptybroker_paths::{BrokerPaths, DAEMON_BINARY_NAME, Endpoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{ConfigError, SupervisorError};

/// Environment variable that overrides the daemon executable path.
pub const DAEMON_ENV_VAR: &str = "PTYBROKER_DAEMON";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Socket path (POSIX) or pipe name (Windows). Derived from the user
    /// identity when unset.
    pub endpoint: Option<String>,
    pub daemon_binary: Option<PathBuf>,
    pub connect_timeout_ms: u64,
    /// Delay between spawning the daemon and the second connect attempt.
    pub spawn_warmup_ms: u64,
    pub request_timeout_ms: u64,
    /// Automatic reconnects after an unexpected close. 0 disables them.
    pub max_reconnect_attempts: u32,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// Grace period before a daemon this client spawned is force-killed.
    pub kill_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            daemon_binary: None,
            connect_timeout_ms: 3000,
            spawn_warmup_ms: 1000,
            request_timeout_ms: 10_000,
            max_reconnect_attempts: 5,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 10_000,
            kill_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    client: ClientConfig,
}

impl ClientConfig {
    /// Load `config.toml` under `paths` and validate the result.
    ///
    /// # Errors
    ///
    /// Only validation failures are errors. Read and parse failures fall
    /// back to the defaults.
    pub fn load(paths: &BrokerPaths) -> Result<Self, ConfigError> {
        let config = match Self::load_file(&paths.user_config()) {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!(event = "client.config.file_missing", path = %paths.user_config().display());
                Self::default()
            }
            Err(e) => {
                warn!(event = "client.config.load_failed", error = %e, "Using default client configuration");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from the default `~/.ptybroker/config.toml`.
    pub fn load_default() -> Result<Self, ConfigError> {
        match BrokerPaths::resolve() {
            Ok(paths) => Self::load(&paths),
            Err(e) => {
                warn!(event = "client.config.paths_unresolved", error = %e);
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Read one config file. `Ok(None)` when it does not exist.
    fn load_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        };
        Self::from_toml_str(&content)
            .map(Some)
            .map_err(|e| match e {
                ConfigError::Parse { message, .. } => ConfigError::Parse {
                    path: path.display().to_string(),
                    message,
                },
                other => other,
            })
    }

    /// Parse the `[client]` section out of a full config document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Ok(file.client)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("reconnect_base_ms", self.reconnect_base_ms),
            ("reconnect_max_ms", self.reconnect_max_ms),
            ("kill_timeout_ms", self.kill_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    message: format!("{} must be greater than 0", name),
                });
            }
        }

        if self.reconnect_base_ms > self.reconnect_max_ms {
            return Err(ConfigError::Invalid {
                message: format!(
                    "reconnect_base_ms ({}) must not exceed reconnect_max_ms ({})",
                    self.reconnect_base_ms, self.reconnect_max_ms
                ),
            });
        }

        if let Some(endpoint) = &self.endpoint
            && endpoint.trim().is_empty()
        {
            return Err(ConfigError::Invalid {
                message: "endpoint must not be empty when set".to_string(),
            });
        }

        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        match &self.endpoint {
            Some(value) => Endpoint::from_override(value),
            None => Endpoint::for_current_user(),
        }
    }

    /// Resolve the daemon executable.
    ///
    /// Resolution order:
    /// 1. `PTYBROKER_DAEMON` environment variable
    /// 2. `daemon_binary` from the config file
    /// 3. `ptybroker-daemon` next to the current executable
    pub fn daemon_binary(&self) -> Result<PathBuf, SupervisorError> {
        resolve_daemon_binary(self.daemon_binary.as_deref())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn spawn_warmup(&self) -> Duration {
        Duration::from_millis(self.spawn_warmup_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

pub(crate) fn resolve_daemon_binary(configured: Option<&Path>) -> Result<PathBuf, SupervisorError> {
    if let Some(value) = std::env::var_os(DAEMON_ENV_VAR)
        && !value.is_empty()
    {
        return Ok(PathBuf::from(value));
    }
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    ptybroker_paths::find_sibling_binary(DAEMON_BINARY_NAME)
        .map_err(|message| SupervisorError::BinaryNotFound { message })
}
