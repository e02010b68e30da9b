// src/main.rs

use std::process::ExitCode;

use sitepipe::errors::SitepipeError;
use sitepipe::{RunStatus, cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("sitepipe error: {err:?}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(RunStatus::TasksFailed) => ExitCode::from(1),
        Err(err @ SitepipeError::PublishConflict { .. }) => {
            eprintln!("sitepipe error: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("sitepipe error: {err}");
            ExitCode::FAILURE
        }
    }
}
