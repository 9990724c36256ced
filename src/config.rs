//! Plugin configuration, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use crate::{
    error::ConfigError,
    fetch::{FetchSettings, RetrievalPolicy},
    handler::InstanceKey,
    states::StateCode,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginConfig {
    /// States with a dedicated `<STATE>-covid` plugin.
    pub implemented_states: Vec<StateCode>,
    pub fallback_state: StateCode,
    pub metric: String,
    /// Label of the temporary SQL instance, e.g. `_covid` for `sql:_covid`.
    pub instance_label: String,
    /// Defaults to the platform data directory.
    pub resources_dir: Option<PathBuf>,
    pub host: HostConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Program and leading arguments of the host CLI.
    pub command: Vec<String>,
    /// Top-level key of the host's configuration tree.
    pub name: String,
    pub patch_env_var: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub workers: Option<NonZeroUsize>,
    pub retrieval_policy: RetrievalPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
    pub level: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            implemented_states: ["CA", "CO", "GA", "TX", "US"]
                .into_iter()
                .map(StateCode::from)
                .collect(),
            fallback_state: StateCode::from("US"),
            metric: "cases".to_string(),
            instance_label: "_covid".to_string(),
            resources_dir: None,
            host: HostConfig::default(),
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command: vec!["python".to_string(), "-m".to_string(), "meerschaum".to_string()],
            name: "meerschaum".to_string(),
            patch_env_var: "MRSM_PATCH".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_name: "covid_counties.log".to_string(),
            level: "info".to_string(),
        }
    }
}

impl PluginConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.resources_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("covid_counties")
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.resources_dir().join("sqlite").join("covid.db")
    }

    pub fn instance_key(&self) -> InstanceKey {
        InstanceKey::sql(self.instance_label.clone())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            implemented_states: self.implemented_states.clone(),
            fallback_state: self.fallback_state.clone(),
            metric: self.metric.clone(),
            instance: self.instance_key(),
            retrieval_policy: self.fetch.retrieval_policy,
        }
    }
}
