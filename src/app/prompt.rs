use dialoguer::{theme::ColorfulTheme, Confirm, Input};

use covid_counties::{error::BoxError, registration::Prompter};

pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn input(&mut self, prompt: &str) -> Result<String, BoxError> {
        let answer = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(answer)
    }

    fn confirm(&mut self, question: &str) -> Result<bool, BoxError> {
        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(true)
            .interact()?;
        Ok(answer)
    }
}
