use clap::{Arg, ArgAction, Command};

pub fn list_command() -> Command {
    Command::new("list")
        .about("List the daemon's sessions")
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output in JSON format")
                .action(ArgAction::SetTrue),
        )
}

pub fn buffer_command() -> Command {
    Command::new("buffer")
        .about("Print the output the daemon retained for a session")
        .arg(
            Arg::new("id")
                .help("Session id")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output in JSON format")
                .action(ArgAction::SetTrue),
        )
}

pub fn ping_command() -> Command {
    Command::new("ping").about("Check whether the daemon is reachable (starts it if needed)")
}
