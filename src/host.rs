//! The seams between this plugin and the host framework.
//!
//! The host owns pipe storage and synchronization. The router only needs to
//! look pipes up, register them, read their rows back, and ask the host to
//! sync a batch of them.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::num::NonZeroUsize;

use crate::{
    error::HostError,
    handler::{HandlerKeys, HandlerPipe, InstanceKey},
};

/// One row as the host hands it back, before coercion.
pub type RawRow = Map<String, Value>;

#[async_trait]
pub trait PipeInstance: Send + Sync {
    /// The host's id for this pipe, or `None` if it was never registered.
    async fn pipe_id(&self, pipe: &HandlerPipe) -> Result<Option<i64>, HostError>;

    async fn register_pipe(&self, pipe: &HandlerPipe) -> Result<i64, HostError>;

    /// Parameters the pipe is registered with, or `None` if it was never registered.
    async fn pipe_parameters(&self, pipe: &HandlerPipe) -> Result<Option<Value>, HostError>;

    /// Replaces a registered pipe's parameters with `pipe.parameters()`.
    async fn edit_pipe(&self, pipe: &HandlerPipe) -> Result<(), HostError>;

    /// Synchronized rows for the pipe. `None` means the pipe has no data.
    async fn get_data(&self, pipe: &HandlerPipe) -> Result<Option<Vec<RawRow>>, HostError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub instance: InstanceKey,
    pub workers: Option<NonZeroUsize>,
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Succeeded,
    Failed { code: Option<i32> },
    /// The sync ran in-process and reports no status.
    Unchecked,
}

impl SyncStatus {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => SyncStatus::Succeeded,
            code => SyncStatus::Failed { code },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncStatus::Failed { .. })
    }
}

/// Runs the host's synchronization for a whole batch of pipes at once.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    async fn sync(&self, pipes: &[HandlerPipe], options: &SyncOptions) -> Result<SyncStatus, HostError>;
}

/// An entry in the host's in-process action table.
#[async_trait]
pub trait SyncAction: Send + Sync {
    async fn sync_pipes(&self, keys: &[HandlerKeys], options: &SyncOptions) -> Result<(), HostError>;
}

#[async_trait]
impl<T: PipeInstance + ?Sized> PipeInstance for std::sync::Arc<T> {
    async fn pipe_id(&self, pipe: &HandlerPipe) -> Result<Option<i64>, HostError> {
        (**self).pipe_id(pipe).await
    }

    async fn register_pipe(&self, pipe: &HandlerPipe) -> Result<i64, HostError> {
        (**self).register_pipe(pipe).await
    }

    async fn pipe_parameters(&self, pipe: &HandlerPipe) -> Result<Option<Value>, HostError> {
        (**self).pipe_parameters(pipe).await
    }

    async fn edit_pipe(&self, pipe: &HandlerPipe) -> Result<(), HostError> {
        (**self).edit_pipe(pipe).await
    }

    async fn get_data(&self, pipe: &HandlerPipe) -> Result<Option<Vec<RawRow>>, HostError> {
        (**self).get_data(pipe).await
    }
}

#[async_trait]
impl<T: Synchronizer + ?Sized> Synchronizer for std::sync::Arc<T> {
    async fn sync(&self, pipes: &[HandlerPipe], options: &SyncOptions) -> Result<SyncStatus, HostError> {
        (**self).sync(pipes, options).await
    }
}
