//! Interactive registration of the counties this pipe follows.

use serde::{Deserialize, Serialize};

use crate::{county::Fips, error::BoxError, error::RegistrationError, handler::Columns};

/// The source of operator answers during registration.
pub trait Prompter {
    fn input(&mut self, prompt: &str) -> Result<String, BoxError>;
    fn confirm(&mut self, question: &str) -> Result<bool, BoxError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CovidSection {
    pub fips: Vec<Fips>,
}

/// Stored configuration of the county pipe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PipeParameters {
    pub columns: Columns,
    pub covid: CovidSection,
}

impl PipeParameters {
    pub fn new(fips: Vec<Fips>) -> Self {
        Self {
            columns: Columns::default(),
            covid: CovidSection { fips },
        }
    }
}

/// Splits operator input on commas, ignoring whitespace and empty entries.
pub fn parse_fips_list(input: &str) -> Vec<Fips> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split(',')
        .filter(|code| !code.is_empty())
        .map(Fips::from)
        .collect()
}

/// Asks for counties until the operator confirms a non-empty list.
pub fn register<P: Prompter + ?Sized>(prompter: &mut P) -> Result<PipeParameters, RegistrationError> {
    loop {
        let answer = prompter
            .input("Please enter a list of FIPS codes separated by commas")
            .map_err(RegistrationError::Prompt)?;
        let fips = parse_fips_list(&answer);
        if fips.is_empty() {
            tracing::debug!("Empty FIPS list submitted; asking again");
            continue;
        }

        let mut question = String::from("Is this correct?");
        for code in &fips {
            question.push_str(&format!("\n  - {code}"));
        }
        if prompter.confirm(&question).map_err(RegistrationError::Prompt)? {
            return Ok(PipeParameters::new(fips));
        }
    }
}
