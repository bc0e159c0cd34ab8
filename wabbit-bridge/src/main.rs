use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments first to get verbosity level
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        2.. => "trace",
    };

    // Predictions go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            debug!("Run command: {:?}", args);
            cli::commands::run::execute(args, &config)?;
        }
        Commands::Check(args) => {
            debug!("Check command: {:?}", args);
            cli::commands::check::execute(args, &config)?;
        }
        Commands::Config => cli::commands::config::execute(&config)?,
    }

    Ok(())
}
