//! DevOps API server

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use devops_apiserver::{
    cli::{Cli, Command},
    config::Config,
    server::ApiServer,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Config) => print_config(&cli),
        Some(Command::HashPassword { ref password, cost }) => hash_password(password, cost),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Print the configured sections, never their values
fn print_config(cli: &Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&config.to_map()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize configuration: {e}");
            ExitCode::FAILURE
        }
    }
}

fn hash_password(password: &str, cost: u32) -> ExitCode {
    match bcrypt::hash(password, cost) {
        Ok(hash) => {
            println!("{hash}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to hash password: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the API server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        redis = config.redis.is_some(),
        "Starting DevOps API server"
    );

    let server = match ApiServer::new(config, cli.debug).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create API server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("API server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("API server shutdown complete");
    ExitCode::SUCCESS
}
