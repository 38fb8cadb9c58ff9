use std::env;
use std::process::ExitCode;

use ggmp::config::get_config;
use ggmp::server::logging::init_logging;
use ggmp::server::{parse_service_command, run};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match get_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    let args: Vec<String> = env::args().collect();
    let selection = match parse_service_command(&args) {
        Ok(selection) => selection,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Usage: ggmp_server [keymaster|nucleus|policy|all]");
            return ExitCode::from(2);
        }
    };

    match run(selection, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server exited with error: {}", e);
            ExitCode::FAILURE
        }
    }
}
