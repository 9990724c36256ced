//! Descriptions of the per-state pipes this plugin delegates to.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::{county::Fips, states::StateCode};

/// The data-shape contract shared by this pipe and every state pipe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub datetime: String,
    pub id: String,
    pub value: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            datetime: "date".to_string(),
            id: "fips".to_string(),
            value: "cases".to_string(),
        }
    }
}

/// `connector:label` key of the storage target the state pipes live on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub flavor: String,
    pub label: String,
}

impl InstanceKey {
    pub fn sql(label: impl Into<String>) -> Self {
        Self {
            flavor: "sql".to_string(),
            label: label.into(),
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let (flavor, label) = key.split_once(':')?;
        if flavor.is_empty() || label.is_empty() {
            return None;
        }
        Some(Self {
            flavor: flavor.to_string(),
            label: label.to_string(),
        })
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.flavor, self.label)
    }
}

/// Identity of a pipe as the host knows it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKeys {
    pub connector: String,
    pub metric: String,
    pub location: String,
}

impl HandlerKeys {
    pub fn for_state(state: &StateCode, metric: &str) -> Self {
        Self {
            connector: format!("plugin:{}", plugin_name(state)),
            metric: metric.to_string(),
            location: state.to_string(),
        }
    }
}

impl fmt::Display for HandlerKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipe('{}', '{}', '{}')", self.connector, self.metric, self.location)
    }
}

/// Name of the sub-plugin that fetches one state, e.g. `CA-covid`.
pub fn plugin_name(state: &StateCode) -> String {
    format!("{state}-covid")
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerPipe {
    pub state: StateCode,
    pub keys: HandlerKeys,
    pub instance: InstanceKey,
    pub columns: Columns,
    pub fips: Vec<Fips>,
}

impl HandlerPipe {
    pub fn for_state(state: StateCode, fips: Vec<Fips>, metric: &str, instance: InstanceKey) -> Self {
        Self {
            keys: HandlerKeys::for_state(&state, metric),
            state,
            instance,
            columns: Columns::default(),
            fips,
        }
    }

    /// Parameters the state plugin reads on sync: the column contract plus
    /// its assigned counties under the plugin's own section.
    pub fn parameters(&self) -> Value {
        let mut parameters = json!({ "columns": self.columns });
        parameters[plugin_name(&self.state)] = json!({ "fips": self.fips });
        parameters
    }
}
