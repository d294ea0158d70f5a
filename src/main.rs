use mapbox_agent::errors::is_config_error;
use mapbox_agent::prompts::DEFAULT_TASK;
use mapbox_agent::{bootstrap, logger, Config};
use std::process::ExitCode;

/// Package version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    // .env has to be applied before the log level is known
    let _ = dotenv::dotenv();
    logger::init(logger::verbosity_from_env());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let task = if args.is_empty() {
        DEFAULT_TASK.to_string()
    } else {
        args.join(" ")
    };

    tracing::debug!(version = VERSION, "mapbox-agent starting");

    let result = match Config::load() {
        Ok(config) => {
            logger::apply_verbosity(config.verbosity);
            bootstrap::run(&config, &task, None).await
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(answer) => {
            println!("{}", answer);
            ExitCode::SUCCESS
        }
        Err(e) if is_config_error(&e) => {
            eprintln!("Configuration error: {:#}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
