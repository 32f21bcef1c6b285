use std::io;

/// Errors raised while framing messages on the broker stream.
///
/// Malformed inbound lines never surface here; the codec logs and skips them.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ProtocolError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::Io(_) => "io_error",
            ProtocolError::Serialize(_) => "serialization_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: ProtocolError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err.error_code(), "io_error");
        assert!(err.to_string().contains("pipe closed"));
    }
}
