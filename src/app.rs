use clap::{Parser, Subcommand};
use std::{
    fs::File,
    io::{self, Write},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};

use covid_counties::{
    config::PluginConfig,
    registration::{self, PipeParameters},
    routing::StateRouter,
    store::SqliteStore,
    sync::{sqlite_overlay, SubprocessSync},
    CovidFetcher, FetchOptions, StateTable,
};

pub mod logging;
mod prompt;

#[derive(Parser, Debug)]
#[command(name = "covid_counties", about = "County-level COVID-19 cases, routed through per-state plugins")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask for the counties to follow and write the pipe parameters as JSON.
    Register {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show which state pipe each county is routed to.
    Route {
        #[arg(short, long)]
        parameters: PathBuf,
    },
    /// Sync every state pipe and write the merged cases as CSV.
    Fetch {
        #[arg(short, long)]
        parameters: PathBuf,
        #[arg(short, long)]
        workers: Option<NonZeroUsize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the FIPS prefix table.
    States,
}

pub fn load_config(path: Option<&Path>) -> Result<PluginConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(PluginConfig::from_file(path)?),
        None => Ok(PluginConfig::default()),
    }
}

pub async fn run(cli: Cli, config: PluginConfig) -> Result<(), Box<dyn std::error::Error>> {
    let states = Arc::new(StateTable::packaged()?);
    match cli.command {
        Command::Register { output } => {
            let parameters = registration::register(&mut prompt::TerminalPrompter::new())?;
            let mut writer = create_output(output.as_deref())?;
            serde_json::to_writer_pretty(&mut writer, &parameters)?;
            writeln!(writer)?;
        }
        Command::Route { parameters } => {
            let parameters = read_parameters(&parameters)?;
            let router = StateRouter::new(
                states,
                config.implemented_states.iter().cloned(),
                config.fallback_state.clone(),
            );
            let groups = router.route(&parameters.covid.fips)?;
            serde_json::to_writer_pretty(io::stdout().lock(), &groups)?;
            println!();
        }
        Command::Fetch {
            parameters,
            workers,
            output,
        } => {
            let parameters = read_parameters(&parameters)?;
            let options = FetchOptions {
                debug: cli.debug,
                workers: workers.or(config.fetch.workers),
            };
            fetch(states, &config, &parameters, &options, output.as_deref()).await?;
        }
        Command::States => {
            let mut writer = csv::Writer::from_writer(io::stdout().lock());
            for record in states.records() {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

async fn fetch(
    states: Arc<StateTable>,
    config: &PluginConfig,
    parameters: &PipeParameters,
    options: &FetchOptions,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = config.database_path();
    tracing::info!("Using state pipe database {}", database.display());
    let store = SqliteStore::open(&database)?;
    let synchronizer = SubprocessSync::new(
        config.host.command.clone(),
        config.host.patch_env_var.clone(),
        sqlite_overlay(&config.host.name, &config.instance_label, &database),
    );

    let fetcher = CovidFetcher::new(states, store, synchronizer, config.fetch_settings());
    match fetcher.fetch(parameters, options).await? {
        Some(frame) => frame.write_csv(create_output(output)?)?,
        None => eprintln!("No data returned for {} counties.", parameters.covid.fips.len()),
    }
    Ok(())
}

fn read_parameters(path: &Path) -> Result<PipeParameters, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

fn create_output(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    })
}
