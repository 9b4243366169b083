//! stac CLI - search STAC APIs and download items.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::process::ExitCode;

use stac_dl::Error;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    match stac_dl::cli::run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cancelled) => {
            eprintln!("Cancelled.");
            ExitCode::from(130)
        }
        Err(e @ Error::InvalidArgument(_)) => {
            eprintln!("error: {e}\n");
            stac_dl::cli::print_usage();
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
