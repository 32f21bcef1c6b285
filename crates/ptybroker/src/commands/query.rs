use clap::ArgMatches;
use tracing::{error, info};

use ptybroker_client::ClientError;

use super::helpers::with_client;
use crate::color;
use crate::table::SessionTable;

pub(crate) fn handle_list_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");

    info!(event = "cli.list_started", json_output = json_output);

    let sessions = with_client(|client| async move { client.list().await })
        .inspect_err(|e| error!(event = "cli.list_failed", error = %e))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else if sessions.is_empty() {
        println!("No sessions.");
    } else {
        SessionTable::new(&sessions).print();
    }

    info!(event = "cli.list_completed", count = sessions.len());
    Ok(())
}

pub(crate) fn handle_buffer_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = matches
        .get_one::<String>("id")
        .ok_or("Session id is required")?
        .clone();
    let json_output = matches.get_flag("json");

    info!(event = "cli.buffer_started", session_id = %id);

    let target = id.clone();
    let snapshot = with_client(|client| async move { client.get_buffer(&target).await })
        .inspect_err(|e| error!(event = "cli.buffer_failed", error = %e))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", snapshot.buffer);
        if snapshot.is_dead {
            eprintln!("{}", color::hint(&format!("[session {} has exited]", id)));
        }
    }

    info!(
        event = "cli.buffer_completed",
        session_id = %id,
        bytes = snapshot.buffer.len(),
        is_dead = snapshot.is_dead,
    );
    Ok(())
}

pub(crate) fn handle_ping_command() -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.ping_started");

    let alive = with_client(|client| async move { Ok::<_, ClientError>(client.ping().await) })
        .inspect_err(|e| error!(event = "cli.ping_failed", error = %e))?;

    if alive {
        println!("{}", color::leaf("daemon is running"));
        info!(event = "cli.ping_completed");
        Ok(())
    } else {
        eprintln!("{}", color::error("daemon did not answer"));
        error!(event = "cli.ping_failed", error = "no pong");
        Err("daemon did not answer".into())
    }
}
