mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command, LogFormat};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let result = match cli.command {
        Command::Check(args) => commands::check(args).await,
        Command::Validate { config } => commands::validate(config).map(|()| true),
    };

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    ExitCode::from(commands::exit_status(&result))
}
