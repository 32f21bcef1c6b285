use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("home directory not found; set $HOME environment variable")]
    HomeNotFound,
}

/// Name of the daemon executable, looked up next to the current binary.
pub const DAEMON_BINARY_NAME: &str = if cfg!(windows) {
    "ptybroker-daemon.exe"
} else {
    "ptybroker-daemon"
};

/// Transport endpoint the daemon listens on.
///
/// POSIX hosts use a filesystem stream socket; Windows uses a named pipe.
/// Both names embed the current user identity so two users on one host
/// never share a daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Socket(PathBuf),
    Pipe(String),
}

impl Endpoint {
    /// Default endpoint for the current user on this platform.
    pub fn for_current_user() -> Self {
        Self::for_identity(&user_token())
    }

    /// Default endpoint for an explicit identity token.
    pub fn for_identity(token: &str) -> Self {
        if cfg!(windows) {
            Endpoint::Pipe(format!(r"\\.\pipe\ptybroker-{token}"))
        } else {
            Endpoint::Socket(std::env::temp_dir().join(format!("ptybroker-{token}.sock")))
        }
    }

    /// Interpret a user-supplied override (config file or CLI flag).
    ///
    /// On Windows a bare name is placed under `\\.\pipe\`; a full pipe path
    /// is kept as is. Everywhere else the value is a socket path.
    pub fn from_override(value: &str) -> Self {
        if cfg!(windows) {
            if value.starts_with(r"\\.\pipe\") {
                Endpoint::Pipe(value.to_string())
            } else {
                Endpoint::Pipe(format!(r"\\.\pipe\{value}"))
            }
        } else {
            Endpoint::Socket(PathBuf::from(value))
        }
    }

    /// Socket path, if this is a filesystem endpoint.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Endpoint::Socket(path) => Some(path),
            Endpoint::Pipe(_) => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Socket(path) => write!(f, "{}", path.display()),
            Endpoint::Pipe(name) => write!(f, "{}", name),
        }
    }
}

/// Identity token used in endpoint names.
///
/// The numeric uid on POSIX. On Windows, the `USERNAME` environment
/// variable reduced to characters that are valid in a pipe name.
#[cfg(unix)]
pub fn user_token() -> String {
    nix::unistd::getuid().as_raw().to_string()
}

#[cfg(not(unix))]
pub fn user_token() -> String {
    let raw = std::env::var("USERNAME").unwrap_or_default();
    sanitize_token(&raw)
}

/// Keep alphanumerics, `-` and `_`; fall back to `default` when nothing is left.
pub fn sanitize_token(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Path construction for the `~/.ptybroker/` directory.
///
/// Use `resolve()` in production code and `from_dir()` in tests.
#[derive(Debug, Clone)]
pub struct BrokerPaths {
    base_dir: PathBuf,
}

impl BrokerPaths {
    /// Resolve paths from the user's home directory (`~/.ptybroker`).
    pub fn resolve() -> Result<Self, PathError> {
        let home = dirs::home_dir().ok_or(PathError::HomeNotFound)?;
        Ok(Self {
            base_dir: home.join(".ptybroker"),
        })
    }

    /// Create paths from an explicit base directory. Use in tests.
    pub fn from_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn user_config(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }
}

/// Find a sibling binary next to the currently running executable.
pub fn find_sibling_binary(binary_name: &str) -> Result<PathBuf, String> {
    let our_binary =
        std::env::current_exe().map_err(|e| format!("could not determine binary path: {}", e))?;
    let bin_dir = our_binary
        .parent()
        .ok_or_else(|| format!("binary has no parent directory: {}", our_binary.display()))?;
    let sibling = bin_dir.join(binary_name);
    if !sibling.exists() {
        return Err(format!(
            "{} binary not found at {}",
            binary_name,
            sibling.display()
        ));
    }
    Ok(sibling)
}
