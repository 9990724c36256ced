mod app;

use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = app::Cli::parse();
    let config = app::load_config(cli.config.as_deref())?;

    app::logging::setup_logger(&config.logging, cli.debug)?;

    app::run(cli, config).await?;

    Ok(())
}
