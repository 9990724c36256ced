//! Ways of handing a batch of state pipes to the host's sync engine.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{path::Path, process::Stdio};
use tokio::process::Command;

use crate::{
    error::HostError,
    handler::{HandlerKeys, HandlerPipe},
    host::{SyncAction, SyncOptions, SyncStatus, Synchronizer},
};

/// Calls straight into the host's action table. There is no status to check.
pub struct InProcessSync<A> {
    action: A,
}

impl<A: SyncAction> InProcessSync<A> {
    pub fn new(action: A) -> Self {
        Self { action }
    }
}

#[async_trait]
impl<A: SyncAction> Synchronizer for InProcessSync<A> {
    async fn sync(&self, pipes: &[HandlerPipe], options: &SyncOptions) -> Result<SyncStatus, HostError> {
        let keys: Vec<HandlerKeys> = pipes.iter().map(|p| p.keys.clone()).collect();
        self.action.sync_pipes(&keys, options).await?;
        Ok(SyncStatus::Unchecked)
    }
}

/// Configuration patch that makes a temporary SQLite instance visible to the
/// host subprocess without editing the shared config file.
pub fn sqlite_overlay(host_name: &str, label: &str, database: &Path) -> Value {
    let mut connector = serde_json::Map::new();
    connector.insert(
        label.to_string(),
        json!({ "flavor": "sqlite", "database": database.to_string_lossy() }),
    );
    let mut overlay = serde_json::Map::new();
    overlay.insert(host_name.to_string(), json!({ "connectors": { "sql": connector } }));
    Value::Object(overlay)
}

/// Runs `<command> sync pipes ...` as a child process and waits for it.
pub struct SubprocessSync {
    command: Vec<String>,
    patch_env_var: String,
    overlay: Value,
}

impl SubprocessSync {
    pub fn new(command: Vec<String>, patch_env_var: impl Into<String>, overlay: Value) -> Self {
        Self {
            command,
            patch_env_var: patch_env_var.into(),
            overlay,
        }
    }

    pub fn sync_args(pipes: &[HandlerPipe], options: &SyncOptions) -> Vec<String> {
        let mut args = vec!["sync".to_string(), "pipes".to_string()];
        args.push("-c".to_string());
        args.extend(pipes.iter().map(|p| p.keys.connector.clone()));
        args.push("-m".to_string());
        args.extend(pipes.iter().map(|p| p.keys.metric.clone()));
        args.push("-l".to_string());
        args.extend(pipes.iter().map(|p| p.keys.location.clone()));
        if options.debug {
            args.push("--debug".to_string());
        }
        args.push("-i".to_string());
        args.push(options.instance.to_string());
        if let Some(workers) = options.workers {
            args.push("-w".to_string());
            args.push(workers.to_string());
        }
        args
    }
}

#[async_trait]
impl Synchronizer for SubprocessSync {
    async fn sync(&self, pipes: &[HandlerPipe], options: &SyncOptions) -> Result<SyncStatus, HostError> {
        let (program, base_args) = self.command.split_first().ok_or(HostError::EmptyCommand)?;
        let args = Self::sync_args(pipes, options);
        tracing::info!("Running {program} {} {}", base_args.join(" "), args.join(" "));

        let status = Command::new(program)
            .args(base_args)
            .args(&args)
            .env(&self.patch_env_var, serde_json::to_string(&self.overlay)?)
            .stdin(Stdio::null())
            // stdout carries the CSV this process writes.
            .stdout(std::io::stderr())
            .status()
            .await
            .map_err(|source| HostError::Spawn {
                program: program.clone(),
                source,
            })?;

        let status = SyncStatus::from_exit_code(status.code());
        tracing::info!("Sync finished: {status:?}");
        Ok(status)
    }
}
