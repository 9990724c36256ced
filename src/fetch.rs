//! The fetch cycle: route, provision, sync, retrieve, merge.
//!
//! Each call to [`CovidFetcher::fetch`] runs those stages in order and keeps
//! no state between calls. A failed sync aborts before any pipe is read.

use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, sync::Arc};

use crate::{
    case_report::CaseFrame,
    error::{FetchError, HostError},
    handler::{HandlerPipe, InstanceKey},
    host::{PipeInstance, SyncOptions, SyncStatus, Synchronizer},
    registration::PipeParameters,
    routing::{StateGroups, StateRouter},
    states::{StateCode, StateTable},
};

/// What to do when one state pipe cannot be read or coerced.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPolicy {
    /// Fail the whole fetch.
    #[default]
    Abort,
    /// Log a warning and leave that state out of the result.
    WarnAndSkip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub implemented_states: Vec<StateCode>,
    pub fallback_state: StateCode,
    pub metric: String,
    pub instance: InstanceKey,
    pub retrieval_policy: RetrievalPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub debug: bool,
    /// Bound on concurrent reads and passed through to the sync. `None` reads sequentially.
    pub workers: Option<NonZeroUsize>,
}

pub struct CovidFetcher<I, S> {
    router: StateRouter,
    instance: I,
    synchronizer: S,
    settings: FetchSettings,
}

impl<I: PipeInstance, S: Synchronizer> CovidFetcher<I, S> {
    pub fn new(states: Arc<StateTable>, instance: I, synchronizer: S, settings: FetchSettings) -> Self {
        let router = StateRouter::new(
            states,
            settings.implemented_states.iter().cloned(),
            settings.fallback_state.clone(),
        );
        Self {
            router,
            instance,
            synchronizer,
            settings,
        }
    }

    pub fn router(&self) -> &StateRouter {
        &self.router
    }

    pub fn handler_pipes(&self, groups: StateGroups) -> Vec<HandlerPipe> {
        groups
            .into_iter()
            .map(|(state, fips)| {
                HandlerPipe::for_state(state, fips, &self.settings.metric, self.settings.instance.clone())
            })
            .collect()
    }

    pub async fn fetch(
        &self,
        parameters: &PipeParameters,
        options: &FetchOptions,
    ) -> Result<Option<CaseFrame>, FetchError> {
        let groups = self.router.route(&parameters.covid.fips)?;
        tracing::info!(
            "Routed {} counties to {} state pipes",
            parameters.covid.fips.len(),
            groups.len()
        );
        if groups.is_empty() {
            tracing::info!("No counties to fetch");
            return Ok(None);
        }
        let pipes = self.handler_pipes(groups);

        self.provision(&pipes).await?;
        self.sync(&pipes, options).await?;

        let frames = self.retrieve_all(&pipes, options.workers).await?;
        if frames.is_empty() {
            tracing::info!("No state pipe returned data");
            return Ok(None);
        }
        let merged = CaseFrame::concat(frames);
        tracing::info!("Merged {} rows", merged.len());
        Ok(Some(merged))
    }

    /// Registers any state pipe the host does not know yet, so the state
    /// plugins' interactive registration never runs. A known pipe whose
    /// counties changed since the last fetch gets its parameters rewritten.
    async fn provision(&self, pipes: &[HandlerPipe]) -> Result<(), FetchError> {
        for pipe in pipes {
            let provision_error = |source: HostError| FetchError::Provision {
                keys: pipe.keys.clone(),
                source,
            };
            if self.instance.pipe_id(pipe).await.map_err(provision_error)?.is_none() {
                let id = self.instance.register_pipe(pipe).await.map_err(provision_error)?;
                tracing::info!("Registered {} (id {id})", pipe.keys);
                continue;
            }
            let parameters = pipe.parameters();
            let stored = self.instance.pipe_parameters(pipe).await.map_err(provision_error)?;
            if stored.as_ref() != Some(&parameters) {
                self.instance.edit_pipe(pipe).await.map_err(provision_error)?;
                tracing::info!("Updated the counties of {}", pipe.keys);
            }
        }
        Ok(())
    }

    async fn sync(&self, pipes: &[HandlerPipe], options: &FetchOptions) -> Result<(), FetchError> {
        let sync_options = SyncOptions {
            instance: self.settings.instance.clone(),
            workers: options.workers,
            debug: options.debug,
        };
        let status = self
            .synchronizer
            .sync(pipes, &sync_options)
            .await
            .map_err(FetchError::Sync)?;
        match status {
            SyncStatus::Failed { code } => Err(FetchError::SyncFailed { code }),
            _ => Ok(()),
        }
    }

    async fn retrieve_all(
        &self,
        pipes: &[HandlerPipe],
        workers: Option<NonZeroUsize>,
    ) -> Result<Vec<CaseFrame>, FetchError> {
        let results: Vec<Option<CaseFrame>> = match workers {
            Some(workers) => {
                stream::iter(pipes)
                    .map(|pipe| self.retrieve_or_skip(pipe))
                    .buffered(workers.get())
                    .try_collect()
                    .await?
            }
            None => {
                let mut results = Vec::with_capacity(pipes.len());
                for pipe in pipes {
                    results.push(self.retrieve_or_skip(pipe).await?);
                }
                results
            }
        };
        Ok(results.into_iter().flatten().collect())
    }

    async fn retrieve_or_skip(&self, pipe: &HandlerPipe) -> Result<Option<CaseFrame>, FetchError> {
        match self.retrieve(pipe).await {
            Err(error) if self.settings.retrieval_policy == RetrievalPolicy::WarnAndSkip => {
                tracing::warn!("Skipping {}: {error}", pipe.keys);
                Ok(None)
            }
            result => result,
        }
    }

    async fn retrieve(&self, pipe: &HandlerPipe) -> Result<Option<CaseFrame>, FetchError> {
        let rows = self
            .instance
            .get_data(pipe)
            .await
            .map_err(|source| FetchError::Retrieval {
                keys: pipe.keys.clone(),
                source,
            })?;
        let Some(rows) = rows.filter(|rows| !rows.is_empty()) else {
            tracing::debug!("{} has no data", pipe.keys);
            return Ok(None);
        };
        tracing::debug!("Read {} rows from {}", rows.len(), pipe.keys);
        let frame = CaseFrame::from_raw(rows, &pipe.columns).map_err(|source| FetchError::Coercion {
            keys: pipe.keys.clone(),
            source,
        })?;
        Ok(Some(frame))
    }
}
