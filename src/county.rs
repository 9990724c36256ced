use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RoutingError;

/// A county FIPS code. The first two characters are the state prefix.
#[derive(Eq, PartialEq, Clone, Serialize, Deserialize, Debug, Hash)]
#[serde(transparent)]
pub struct Fips(pub String);

impl Fips {
    pub fn new(code: impl Into<String>) -> Self {
        Fips(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn state_prefix(&self) -> Result<&str, RoutingError> {
        match self.0.get(..2) {
            Some(prefix) if prefix.bytes().all(|b| b.is_ascii_digit()) => Ok(prefix),
            _ => Err(RoutingError::MalformedFips(self.0.clone())),
        }
    }
}

impl fmt::Display for Fips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fips {
    fn from(code: &str) -> Self {
        Fips(code.to_string())
    }
}
