use anyhow::Result;
use clap::Parser;
use dockshell_core::errors::DockshellError;

mod cli;
mod commands;

fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch() {
        Ok(()) => Ok(()),
        Err(err) => {
            // A failed remote command exits with that command's status
            if let Some(status) = err
                .downcast_ref::<DockshellError>()
                .and_then(DockshellError::exit_status)
            {
                eprintln!("Error: {}", err);
                std::process::exit(i32::from(status));
            }

            Err(err)
        }
    }
}
