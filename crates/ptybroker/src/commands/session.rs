use std::collections::BTreeMap;

use clap::ArgMatches;
use tracing::{error, info};

use ptybroker_client::PtyConfig;

use super::helpers::{flush, with_client};
use crate::color;

pub(crate) fn handle_create_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = pty_config_from_matches(matches)?;
    let json_output = matches.get_flag("json");

    info!(
        event = "cli.create_started",
        shell = %config.shell,
        cwd = %config.cwd,
    );

    let shell = config.shell.clone();
    match with_client(|client| async move { client.create_pty(config).await }) {
        Ok(session_id) => {
            if json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "id": session_id,
                        "shell": shell,
                    }))?
                );
            } else {
                println!("Created session {} ({})", color::teal(&session_id), shell);
            }
            info!(event = "cli.create_completed", session_id = %session_id);
            Ok(())
        }
        Err(e) => {
            error!(event = "cli.create_failed", error = %e);
            Err(e)
        }
    }
}

pub(crate) fn handle_write_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = matches
        .get_one::<String>("id")
        .ok_or("Session id is required")?
        .clone();
    let mut data = matches
        .get_one::<String>("data")
        .ok_or("Data is required")?
        .clone();
    if matches.get_flag("enter") {
        data.push('\r');
    }

    info!(event = "cli.write_started", session_id = %id, bytes = data.len());

    with_client(|client| async move {
        client.write(&id, &data);
        flush(&client).await
    })
    .inspect_err(|e| error!(event = "cli.write_failed", error = %e))?;

    info!(event = "cli.write_completed");
    Ok(())
}

pub(crate) fn handle_resize_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = matches
        .get_one::<String>("id")
        .ok_or("Session id is required")?
        .clone();
    let cols = *matches.get_one::<u16>("cols").ok_or("Columns are required")?;
    let rows = *matches.get_one::<u16>("rows").ok_or("Rows are required")?;

    info!(event = "cli.resize_started", session_id = %id, cols = cols, rows = rows);

    with_client(|client| async move {
        client.resize(&id, cols, rows);
        flush(&client).await
    })
    .inspect_err(|e| error!(event = "cli.resize_failed", error = %e))?;

    info!(event = "cli.resize_completed");
    Ok(())
}

pub(crate) fn handle_kill_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let id = matches
        .get_one::<String>("id")
        .ok_or("Session id is required")?
        .clone();

    info!(event = "cli.kill_started", session_id = %id);

    let target = id.clone();
    with_client(|client| async move {
        client.kill(&target);
        flush(&client).await
    })
    .inspect_err(|e| error!(event = "cli.kill_failed", error = %e))?;

    println!("Killed session {}", color::teal(&id));
    info!(event = "cli.kill_completed", session_id = %id);
    Ok(())
}

fn pty_config_from_matches(matches: &ArgMatches) -> Result<PtyConfig, Box<dyn std::error::Error>> {
    let shell = match matches.get_one::<String>("shell") {
        Some(shell) => shell.clone(),
        None => default_shell(),
    };
    let cwd = match matches.get_one::<String>("cwd") {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir()?.display().to_string(),
    };

    let mut config = PtyConfig::new(shell, cwd);
    config.rows = matches.get_one::<u16>("rows").copied().unwrap_or(24);
    config.cols = matches.get_one::<u16>("cols").copied().unwrap_or(80);
    config.args = matches
        .get_many::<String>("args")
        .map(|args| args.cloned().collect())
        .unwrap_or_default();
    config.env = parse_env(
        matches
            .get_many::<String>("env")
            .into_iter()
            .flatten()
            .map(String::as_str),
    )?;
    Ok(config)
}

fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

/// Parse `KEY=VALUE` pairs. The value may itself contain `=`.
fn parse_env<'a>(
    pairs: impl Iterator<Item = &'a str>,
) -> Result<BTreeMap<String, String>, String> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| format!("Invalid --env value '{}': expected KEY=VALUE", pair))?;
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}
