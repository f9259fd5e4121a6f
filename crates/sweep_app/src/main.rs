use anyhow::Result;
use clap::Parser;
use sweep_app::cli::{self, Cli};
use sweep_app::{initialize_logging, AppConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    initialize_logging(config.log_destination, config.level()?, &config.log_file);
    cli::run(cli, &config)
}
