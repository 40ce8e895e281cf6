//! Interactive prompting seam and the pure parsers behind it.
//!
//! All prompt answers are free text; parsing is separated from I/O so the
//! selection rules stay testable without a terminal. Invalid or empty input
//! always falls back to a safe default instead of erroring.

use std::str::FromStr;

use dialoguer::Input;

use stratos_domain::OperationKind;

use crate::error::CliError;

/// Source of operator answers. The terminal implementation prompts via
/// dialoguer; non-interactive runs use [`SilentPrompter`], which yields every
/// question's documented default.
pub trait Prompter {
    /// Ask one free-text question; an empty answer means "use the default".
    ///
    /// # Errors
    ///
    /// Returns an error when reading the answer fails.
    fn ask(&mut self, question: &str) -> Result<String, CliError>;
}

#[derive(Debug, Default)]
pub struct TermPrompter;

impl Prompter for TermPrompter {
    fn ask(&mut self, question: &str) -> Result<String, CliError> {
        let answer: String = Input::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()?;
        Ok(answer)
    }
}

/// Answers every question with empty input, selecting the defaults.
#[derive(Debug, Default)]
pub struct SilentPrompter;

impl Prompter for SilentPrompter {
    fn ask(&mut self, _question: &str) -> Result<String, CliError> {
        Ok(String::new())
    }
}

/// Parse an operation answer; empty or unknown input defaults to preview.
#[must_use]
pub fn parse_operation(input: &str) -> OperationKind {
    OperationKind::from_str(input.trim()).unwrap_or(OperationKind::Preview)
}

/// An indexed-choice answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSelection {
    /// The literal `all`.
    All,
    /// Zero-based indices into the presented list. Empty on empty or
    /// unparseable input.
    Indices(Vec<usize>),
}

/// Parse a comma-separated list of 1-based indices, or `all`.
///
/// Tokens that do not parse or fall outside `1..=count` are dropped; fully
/// invalid input yields the empty selection.
#[must_use]
pub fn parse_index_selection(input: &str, count: usize) -> IndexSelection {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return IndexSelection::All;
    }
    if trimmed.is_empty() {
        return IndexSelection::Indices(Vec::new());
    }

    let mut indices = Vec::new();
    for token in trimmed.split(',') {
        let Ok(position) = token.trim().parse::<usize>() else {
            continue;
        };
        if position >= 1 && position <= count && !indices.contains(&(position - 1)) {
            indices.push(position - 1);
        }
    }
    IndexSelection::Indices(indices)
}
