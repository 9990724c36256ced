//! The state routing table: two-digit FIPS prefix to postal code.
//!
//! Loaded once from the packaged `data/states.csv` and shared read-only
//! (behind an `Arc`) with every router that needs it.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, io::Read};

use crate::error::StateTableError;

const PACKAGED_STATES_CSV: &str = include_str!("../data/states.csv");

/// A state postal code such as `CA`, or the national fallback `US`.
#[derive(Eq, PartialEq, Clone, Serialize, Deserialize, Debug, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct StateCode(pub String);

impl StateCode {
    pub fn new(code: impl Into<String>) -> Self {
        StateCode(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateCode {
    fn from(code: &str) -> Self {
        StateCode(code.to_string())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub state_name: String,
    pub postal_code: StateCode,
    pub state_fips: String,
}

#[derive(Debug, Clone)]
pub struct StateTable {
    records: Vec<StateRecord>,
    by_prefix: HashMap<String, usize>,
}

impl StateTable {
    /// Parses the table shipped with the crate.
    pub fn packaged() -> Result<Self, StateTableError> {
        Self::from_reader(PACKAGED_STATES_CSV.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StateTableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();
        for record in csv_reader.deserialize() {
            records.push(record?);
        }
        Self::from_records(records)
    }

    pub fn from_records(records: Vec<StateRecord>) -> Result<Self, StateTableError> {
        let mut by_prefix = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if let Some(previous) = by_prefix.insert(record.state_fips.clone(), index) {
                return Err(StateTableError::DuplicatePrefix {
                    prefix: record.state_fips.clone(),
                    first: records[previous].postal_code.to_string(),
                    second: record.postal_code.to_string(),
                });
            }
        }
        Ok(Self { records, by_prefix })
    }

    pub fn postal_code(&self, state_fips: &str) -> Option<&StateCode> {
        self.by_prefix
            .get(state_fips)
            .map(|&index| &self.records[index].postal_code)
    }

    pub fn records(&self) -> &[StateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
