use clap::ArgMatches;

mod attach;
mod helpers;
mod query;
mod session;

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    match matches.subcommand() {
        Some(("create", sub_matches)) => session::handle_create_command(sub_matches),
        Some(("list", sub_matches)) => query::handle_list_command(sub_matches),
        Some(("write", sub_matches)) => session::handle_write_command(sub_matches),
        Some(("resize", sub_matches)) => session::handle_resize_command(sub_matches),
        Some(("kill", sub_matches)) => session::handle_kill_command(sub_matches),
        Some(("buffer", sub_matches)) => query::handle_buffer_command(sub_matches),
        Some(("attach", sub_matches)) => attach::handle_attach_command(sub_matches),
        Some(("ping", _)) => query::handle_ping_command(),
        _ => {
            eprintln!("Unknown command. Use --help for usage information.");
            Err("Unknown command".into())
        }
    }
}
