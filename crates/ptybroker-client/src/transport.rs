use std::io;
use std::pin::Pin;

use futures::future::BoxFuture;
use ptybroker_paths::Endpoint;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Both halves of one open stream to the daemon.
pub struct Transport {
    pub reader: BoxReader,
    pub writer: BoxWriter,
}

impl Transport {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            writer: Box::pin(writer),
        }
    }

    /// Split a bidirectional stream into a transport.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Transport(..)")
    }
}

/// Opens streams to the daemon.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, io::Result<Transport>>;

    /// Where this connector points, for logs.
    fn describe(&self) -> String;
}

/// Connects to the daemon's socket (POSIX) or named pipe (Windows).
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: Endpoint,
}

impl EndpointConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Connector for EndpointConnector {
    fn connect(&self) -> BoxFuture<'_, io::Result<Transport>> {
        Box::pin(async move {
            debug!(event = "client.transport.connect_started", endpoint = %self.endpoint);
            connect_endpoint(&self.endpoint).await
        })
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

#[cfg(unix)]
async fn connect_endpoint(endpoint: &Endpoint) -> io::Result<Transport> {
    match endpoint {
        Endpoint::Socket(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            let (reader, writer) = stream.into_split();
            Ok(Transport::new(reader, writer))
        }
        Endpoint::Pipe(name) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("named pipes are not available on this platform: {}", name),
        )),
    }
}

#[cfg(windows)]
async fn connect_endpoint(endpoint: &Endpoint) -> io::Result<Transport> {
    use tokio::net::windows::named_pipe::ClientOptions;

    match endpoint {
        Endpoint::Pipe(name) => {
            let client = ClientOptions::new().open(name)?;
            Ok(Transport::from_stream(client))
        }
        Endpoint::Socket(path) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("socket endpoints are not available on this platform: {}", path.display()),
        )),
    }
}
