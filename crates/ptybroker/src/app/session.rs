use clap::{Arg, ArgAction, Command};

pub fn create_command() -> Command {
    Command::new("create")
        .about("Start a new PTY session in the daemon")
        .arg(
            Arg::new("shell")
                .long("shell")
                .help("Program to run (default: $SHELL, then /bin/sh)"),
        )
        .arg(
            Arg::new("cwd")
                .long("cwd")
                .help("Working directory (default: current directory)"),
        )
        .arg(
            Arg::new("rows")
                .long("rows")
                .help("Terminal height in rows")
                .value_parser(clap::value_parser!(u16).range(1..))
                .default_value("24"),
        )
        .arg(
            Arg::new("cols")
                .long("cols")
                .help("Terminal width in columns")
                .value_parser(clap::value_parser!(u16).range(1..))
                .default_value("80"),
        )
        .arg(
            Arg::new("env")
                .long("env")
                .short('e')
                .help("Extra environment variable as KEY=VALUE (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("args")
                .help("Arguments passed to the shell")
                .num_args(0..)
                .last(true),
        )
}

pub fn write_command() -> Command {
    Command::new("write")
        .about("Send input to a session")
        .arg(
            Arg::new("id")
                .help("Session id")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("data")
                .help("Text to send")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("enter")
                .long("enter")
                .help("Append a carriage return")
                .action(ArgAction::SetTrue),
        )
}

pub fn resize_command() -> Command {
    Command::new("resize")
        .about("Change a session's terminal size")
        .arg(
            Arg::new("id")
                .help("Session id")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("cols")
                .help("Width in columns")
                .required(true)
                .value_parser(clap::value_parser!(u16).range(1..))
                .index(2),
        )
        .arg(
            Arg::new("rows")
                .help("Height in rows")
                .required(true)
                .value_parser(clap::value_parser!(u16).range(1..))
                .index(3),
        )
}

pub fn kill_command() -> Command {
    Command::new("kill").about("Kill a session").arg(
        Arg::new("id")
            .help("Session id")
            .required(true)
            .index(1),
    )
}

pub fn attach_command() -> Command {
    Command::new("attach")
        .about("Stream a session's output and forward stdin to it (Ctrl-C detaches)")
        .arg(
            Arg::new("id")
                .help("Session id")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("no-replay")
                .long("no-replay")
                .help("Skip the retained output and show only new output")
                .action(ArgAction::SetTrue),
        )
}
