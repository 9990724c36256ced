#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use covid_counties::{
    error::HostError,
    handler::{HandlerKeys, HandlerPipe, InstanceKey},
    host::{PipeInstance, RawRow, SyncOptions, SyncStatus, Synchronizer},
    FetchSettings, RetrievalPolicy, StateCode,
};

pub fn settings(implemented: &[&str], policy: RetrievalPolicy) -> FetchSettings {
    FetchSettings {
        implemented_states: implemented.iter().map(|&s| StateCode::from(s)).collect(),
        fallback_state: StateCode::from("US"),
        metric: "cases".to_string(),
        instance: InstanceKey::sql("_covid"),
        retrieval_policy: policy,
    }
}

pub fn row(value: Value) -> RawRow {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

/// One day of cases for each county, as a state plugin would sync it.
pub fn rows_for(fips: &[&str], cases: i64) -> Vec<RawRow> {
    fips.iter()
        .map(|f| row(json!({ "date": "2021-03-01", "fips": f, "cases": cases, "source": "fake" })))
        .collect()
}

pub enum Reply {
    Rows(Vec<RawRow>),
    Empty,
    Fail,
}

/// In-memory host instance keyed by pipe location.
#[derive(Default)]
pub struct FakeInstance {
    pub registered: Mutex<HashMap<HandlerKeys, i64>>,
    pub parameters: Mutex<HashMap<HandlerKeys, Value>>,
    pub register_calls: AtomicUsize,
    pub edit_calls: AtomicUsize,
    pub get_data_calls: AtomicUsize,
    replies: Mutex<HashMap<String, Reply>>,
}

impl FakeInstance {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, location: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(location.to_string(), reply);
    }

    /// Registers the pipe as an earlier fetch would have.
    pub fn preregister(&self, pipe: &HandlerPipe) {
        let mut registered = self.registered.lock().unwrap();
        let id = registered.len() as i64 + 1;
        registered.insert(pipe.keys.clone(), id);
        self.parameters.lock().unwrap().insert(pipe.keys.clone(), pipe.parameters());
    }

    pub fn get_data_calls(&self) -> usize {
        self.get_data_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipeInstance for FakeInstance {
    async fn pipe_id(&self, pipe: &HandlerPipe) -> Result<Option<i64>, HostError> {
        Ok(self.registered.lock().unwrap().get(&pipe.keys).copied())
    }

    async fn register_pipe(&self, pipe: &HandlerPipe) -> Result<i64, HostError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let mut registered = self.registered.lock().unwrap();
        let id = registered.len() as i64 + 1;
        registered.insert(pipe.keys.clone(), id);
        self.parameters.lock().unwrap().insert(pipe.keys.clone(), pipe.parameters());
        Ok(id)
    }

    async fn pipe_parameters(&self, pipe: &HandlerPipe) -> Result<Option<Value>, HostError> {
        Ok(self.parameters.lock().unwrap().get(&pipe.keys).cloned())
    }

    async fn edit_pipe(&self, pipe: &HandlerPipe) -> Result<(), HostError> {
        self.edit_calls.fetch_add(1, Ordering::SeqCst);
        self.parameters.lock().unwrap().insert(pipe.keys.clone(), pipe.parameters());
        Ok(())
    }

    async fn get_data(&self, pipe: &HandlerPipe) -> Result<Option<Vec<RawRow>>, HostError> {
        self.get_data_calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().unwrap().get(&pipe.keys.location) {
            Some(Reply::Rows(rows)) => Ok(Some(rows.clone())),
            Some(Reply::Empty) => Ok(Some(Vec::new())),
            Some(Reply::Fail) => Err(HostError::Other("table is locked".into())),
            None => Ok(None),
        }
    }
}

/// Records each sync batch and answers with a fixed status.
pub struct FakeSync {
    status: SyncStatus,
    pub batches: Mutex<Vec<(Vec<HandlerKeys>, SyncOptions)>>,
}

impl FakeSync {
    pub fn new(status: SyncStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            batches: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Synchronizer for FakeSync {
    async fn sync(&self, pipes: &[HandlerPipe], options: &SyncOptions) -> Result<SyncStatus, HostError> {
        let keys = pipes.iter().map(|p| p.keys.clone()).collect();
        self.batches.lock().unwrap().push((keys, options.clone()));
        Ok(self.status)
    }
}
