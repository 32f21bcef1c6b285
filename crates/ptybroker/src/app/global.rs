use clap::{Arg, ArgAction, Command};

pub fn root_command() -> Command {
    Command::new("ptybroker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Create and drive pseudo-terminals owned by a background daemon")
        .long_about("ptybroker talks to a per-user daemon that owns pseudo-terminal sessions. Sessions outlive the commands that created them, so any number of clients can attach, read the retained output and send input. The daemon is started automatically when no daemon is running.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
