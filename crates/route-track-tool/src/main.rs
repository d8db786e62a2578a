mod commands;
mod logging;
mod settings;

use clap::Parser;
use settings::Settings;
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::parse();
    tracing::debug!(?settings, "Parsed arguments");

    let stdout = std::io::stdout();
    match commands::run(&settings, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
