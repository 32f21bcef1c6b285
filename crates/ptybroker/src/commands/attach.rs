use std::io::Write;

use clap::ArgMatches;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use ptybroker_client::{BrokerClient, ClientError, SessionEvent};

use super::helpers::with_client;
use crate::color;

/// How an attach ended.
enum Detach {
    Exited { exit_code: i32 },
    AlreadyDead,
    Interrupted,
}

pub(crate) fn handle_attach_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = matches
        .get_one::<String>("id")
        .ok_or("Session id is required")?
        .clone();
    let replay = !matches.get_flag("no-replay");

    info!(event = "cli.attach_started", session_id = %id, replay = replay);
    eprintln!(
        "{}",
        color::hint(&format!("Attached to {}. Press Ctrl-C to detach.", id))
    );

    let target = id.clone();
    let detach = with_client(|client| stream_session(client, target, replay))
        .inspect_err(|e| error!(event = "cli.attach_failed", session_id = %id, error = %e))?;

    let message = match detach {
        Detach::Exited { exit_code } => format!("[session {} exited with code {}]", id, exit_code),
        Detach::AlreadyDead => format!("[session {} has already exited]", id),
        Detach::Interrupted => format!("[detached from {}]", id),
    };
    eprintln!("{}", color::hint(&message));
    info!(event = "cli.attach_completed", session_id = %id);
    Ok(())
}

async fn stream_session(
    client: BrokerClient,
    id: String,
    replay: bool,
) -> Result<Detach, ClientError> {
    // Subscribe before reading the buffer so nothing falls between the two.
    // Output produced in that window may print twice.
    let mut events = client.subscribe_channel(&id);

    if replay {
        let snapshot = client.get_buffer(&id).await?;
        write_stdout(&snapshot.buffer);
        if snapshot.is_dead {
            client.unsubscribe(&id);
            return Ok(Detach::AlreadyDead);
        }
    }

    let mut stdin = tokio::io::stdin();
    let mut buf = vec![0u8; 4096];
    let mut input = Utf8Chunks::default();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Data(data)) => write_stdout(&data),
                Some(SessionEvent::Exit { exit_code, .. }) => {
                    return Ok(Detach::Exited { exit_code });
                }
                None => return Err(ClientError::ConnectionClosed),
            },
            read = stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) | Err(_) => {
                    stdin_open = false;
                    let rest = input.finish();
                    if !rest.is_empty() {
                        client.write(&id, &rest);
                    }
                }
                Ok(n) => {
                    let text = input.push(&buf[..n]);
                    if !text.is_empty() {
                        client.write(&id, &text);
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                client.unsubscribe(&id);
                return Ok(Detach::Interrupted);
            }
        }
    }
}

fn write_stdout(data: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(data.as_bytes());
    let _ = stdout.flush();
}

/// Turns stdin reads into text without splitting a character.
///
/// An incomplete sequence at the end of a read is held back until the
/// next one. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Chunks {
    pending: Vec<u8>,
}

impl Utf8Chunks {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let complete = complete_prefix_len(&self.pending);
        let tail = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Whatever is still held back, e.g. at end of input.
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of `bytes` without a trailing, still incomplete UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let start = len - back;
        let byte = bytes[start];
        // Skip continuation bytes until the lead byte.
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if width > back { start } else { len };
    }
    len
}
