mod global;
mod query;
mod session;


use clap::Command;

pub fn build_cli() -> Command {
    global::root_command()
        .subcommand(session::create_command())
        .subcommand(query::list_command())
        .subcommand(session::write_command())
        .subcommand(session::resize_command())
        .subcommand(session::kill_command())
        .subcommand(query::buffer_command())
        .subcommand(session::attach_command())
        .subcommand(query::ping_command())
}
