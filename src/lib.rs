//! Fetches county-level COVID-19 case counts by routing each county to the
//! plugin for its state and merging what those plugins sync.

pub mod case_report;
pub mod config;
pub mod county;
pub mod error;
pub mod fetch;
pub mod handler;
pub mod host;
pub mod registration;
pub mod routing;
pub mod states;
pub mod store;
pub mod sync;

pub use case_report::{CaseFrame, CaseRow};
pub use county::Fips;
pub use fetch::{CovidFetcher, FetchOptions, FetchSettings, RetrievalPolicy};
pub use states::{StateCode, StateTable};
