use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde_json::{json, Value};
use std::{num::NonZeroUsize, path::PathBuf, process::ExitCode};

use covid_counties::{
    handler::InstanceKey,
    host::RawRow,
    store::{RegisteredPipe, SqliteStore},
};

/// Stand-in for the host's `sync pipes` command. Fills every matching state
/// pipe with random daily case counts for its counties.
#[derive(Parser, Debug)]
#[command(name = "dummy_covid_host")]
struct HostCli {
    /// Exit with this code without syncing anything.
    #[arg(long)]
    fail_with: Option<u8>,

    #[arg(long, default_value = "MRSM_PATCH")]
    patch_env_var: String,

    #[arg(long, default_value = "meerschaum")]
    host_name: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
}

#[derive(Subcommand, Debug)]
enum SyncTarget {
    Pipes(SyncPipesArgs),
}

#[derive(clap::Args, Debug)]
struct SyncPipesArgs {
    #[arg(short = 'c', num_args = 1..)]
    connector_keys: Vec<String>,

    #[arg(short = 'm', num_args = 1..)]
    metric_keys: Vec<String>,

    #[arg(short = 'l', num_args = 1..)]
    location_keys: Vec<String>,

    #[arg(long)]
    debug: bool,

    #[arg(short = 'i')]
    instance: String,

    #[arg(short = 'w')]
    workers: Option<NonZeroUsize>,

    #[arg(long, default_value_t = 7)]
    days: i64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = HostCli::parse();
    if let Some(code) = cli.fail_with {
        eprintln!("Sync failed on request (exit {code}).");
        return ExitCode::from(code);
    }

    let Action::Sync {
        target: SyncTarget::Pipes(args),
    } = cli.action;
    setup_logger(args.debug);

    match sync_pipes(&cli.patch_env_var, &cli.host_name, &args) {
        Ok(synced) => {
            tracing::info!("Synced {synced} pipes");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Failed to sync pipes: {error}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logger(debug: bool) {
    let level = if debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn sync_pipes(patch_env_var: &str, host_name: &str, args: &SyncPipesArgs) -> Result<usize, Box<dyn std::error::Error>> {
    let instance = InstanceKey::parse(&args.instance).ok_or_else(|| format!("invalid instance key {:?}", args.instance))?;
    let database = database_from_overlay(patch_env_var, host_name, &instance)?;
    tracing::debug!("Instance {instance} resolves to {}", database.display());

    let store = SqliteStore::open(&database)?;
    let pipes = store.pipes_matching(&args.connector_keys, &args.metric_keys, &args.location_keys)?;
    if let Some(workers) = args.workers {
        tracing::debug!("Syncing {} pipes with {workers} workers", pipes.len());
    }
    for pipe in &pipes {
        let rows = random_cases(pipe, args.days);
        tracing::info!("Syncing {} rows into {}", rows.len(), pipe.keys);
        store.replace_rows(pipe.id, &rows)?;
        println!("Synced {} rows into {}", rows.len(), pipe.keys);
    }
    Ok(pipes.len())
}

fn database_from_overlay(
    patch_env_var: &str,
    host_name: &str,
    instance: &InstanceKey,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let patch = std::env::var(patch_env_var).map_err(|_| format!("{patch_env_var} is not set"))?;
    let overlay: Value = serde_json::from_str(&patch)?;
    let database = overlay[host_name]["connectors"][&instance.flavor][&instance.label]["database"]
        .as_str()
        .ok_or_else(|| format!("{patch_env_var} does not define instance {instance}"))?;
    Ok(PathBuf::from(database))
}

fn random_cases(pipe: &RegisteredPipe, days: i64) -> Vec<RawRow> {
    let section = pipe
        .keys
        .connector
        .strip_prefix("plugin:")
        .unwrap_or(&pipe.keys.connector);
    let fips: Vec<String> = pipe.parameters[section]["fips"]
        .as_array()
        .map(|codes| codes.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let mut rng = rand::thread_rng();
    let today = Utc::now().date_naive();
    let mut rows = Vec::with_capacity(fips.len() * days.max(0) as usize);
    for code in &fips {
        for offset in (0..days).rev() {
            let date = today - Duration::days(offset);
            let row = json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "fips": code,
                "cases": rng.gen_range(0, 500),
            });
            if let Value::Object(row) = row {
                rows.push(row);
            }
        }
    }
    rows
}
