//! Main entry point for the cdfs CLI app

use std::process::ExitCode;

fn main() -> ExitCode {
    match cdfs::cli_runner::run_cli_app() {
        Ok(code) => code,
        Err(e) => {
            if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
                // Help and version requests land here too.
                let _ = clap_err.print();
                return if clap_err.use_stderr() {
                    ExitCode::from(2)
                } else {
                    ExitCode::SUCCESS
                };
            }
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
