use std::future::Future;
use std::time::Duration;

use ptybroker_client::{BrokerClient, ClientConfig, ClientError};
use tracing::warn;

use crate::color;

/// Load configuration with a warning on errors.
///
/// Falls back to defaults, but tells the user on stderr and logs
/// `cli.config.load_failed`.
pub fn load_config_with_warning() -> ClientConfig {
    match ClientConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{}",
                color::error(&format!("Warning: Could not load config: {}. Using defaults.", e))
            );
            eprintln!(
                "{}",
                color::hint("Tip: Check ~/.ptybroker/config.toml for syntax errors.")
            );
            warn!(
                event = "cli.config.load_failed",
                error = %e,
                "Config load failed, using defaults"
            );
            ClientConfig::default()
        }
    }
}

/// Run `f` with a connected client on a fresh runtime.
///
/// The client disconnects afterwards without stopping the daemon: sessions
/// must outlive this command even when it started the daemon.
pub fn with_client<F, Fut, T>(f: F) -> Result<T, Box<dyn std::error::Error>>
where
    F: FnOnce(BrokerClient) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let config = load_config_with_warning();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let client = BrokerClient::new(&config);
        client.connect().await?;
        let result = f(client.clone()).await;
        client.disconnect();
        result
    });
    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result.map_err(|e| {
        eprintln!("{}", color::error(&format!("Error: {}", e)));
        e.into()
    })
}

/// Make sure queued one-way commands reached the daemon.
///
/// Commands and replies share one ordered stream, so a pong means every
/// command sent before the ping was read.
pub async fn flush(client: &BrokerClient) -> Result<(), ClientError> {
    if client.ping().await {
        Ok(())
    } else {
        Err(ClientError::ConnectionClosed)
    }
}
