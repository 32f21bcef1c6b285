use ptybroker_client::init_logging;

mod app;
pub(crate) mod color;
mod commands;
mod table;

fn main() {
    let app = app::build_cli();
    let matches = app.get_matches();

    if matches.get_flag("no-color") {
        color::set_no_color();
    }

    let verbose = matches.get_flag("verbose");
    init_logging(!verbose);

    // Handlers already reported the error on stderr.
    if commands::run_command(&matches).is_err() {
        std::process::exit(1);
    }
}
