use clap::Parser;
use dimse_scu::config::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config_path)?;
    dimse_scu::init_logging(&config.logging)?;

    let success = dimse_scu::run(&config, cli.command).await?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
