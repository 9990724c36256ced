//! Assigns every county to the state handler that owns it.

use indexmap::IndexMap;
use std::{collections::HashSet, sync::Arc};

use crate::{county::Fips, error::RoutingError, states::StateCode, states::StateTable};

/// Counties grouped by owning state, in first-seen state order.
pub type StateGroups = IndexMap<StateCode, Vec<Fips>>;

pub struct StateRouter {
    table: Arc<StateTable>,
    implemented: HashSet<StateCode>,
    fallback: StateCode,
}

impl StateRouter {
    pub fn new(
        table: Arc<StateTable>,
        implemented: impl IntoIterator<Item = StateCode>,
        fallback: StateCode,
    ) -> Self {
        Self {
            table,
            implemented: implemented.into_iter().collect(),
            fallback,
        }
    }

    pub fn fallback(&self) -> &StateCode {
        &self.fallback
    }

    /// Resolves the state handler for one county.
    pub fn state_for(&self, fips: &Fips) -> Result<StateCode, RoutingError> {
        let prefix = fips.state_prefix()?;
        let Some(state) = self.table.postal_code(prefix) else {
            tracing::warn!("No state has FIPS prefix {prefix} ({fips}); using {}", self.fallback);
            return Ok(self.fallback.clone());
        };
        if self.implemented.contains(state) {
            Ok(state.clone())
        } else {
            tracing::debug!("{state} has no plugin; routing {fips} to {}", self.fallback);
            Ok(self.fallback.clone())
        }
    }

    pub fn route(&self, fips_list: &[Fips]) -> Result<StateGroups, RoutingError> {
        let mut groups = StateGroups::new();
        for fips in fips_list {
            let state = self.state_for(fips)?;
            groups.entry(state).or_default().push(fips.clone());
        }
        Ok(groups)
    }
}
