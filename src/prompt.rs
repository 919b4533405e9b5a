// 🙋 Interactive Disambiguator - Ask the operator when the matcher can't decide
//
// Input comes through `InputProvider`, so tests drive the prompt with a
// scripted token list instead of a terminal. Every answer except `q` is
// written to the decision store before it is returned.

use crate::decisions::{Choice, Decision, DecisionStore};
use crate::error::{ReconcileError, Result};
use crate::matcher::{Candidate, ExclusionSet};
use crate::model::Record;
use crate::registry::{CanonicalId, CanonicalRegistry};
use crossterm::style::Stylize;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use tracing::debug;

// ============================================================================
// INPUT PROVIDERS
// ============================================================================

/// Source of operator input lines
pub trait InputProvider {
    /// Next line without its newline; `None` when input is exhausted
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// Reads from the terminal, printing `> ` first
#[derive(Debug, Default)]
pub struct StdinInput;

impl InputProvider for StdinInput {
    fn next_line(&mut self) -> Result<Option<String>> {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Pre-recorded answers
#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
    prompts: usize,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedInput {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: 0,
        }
    }

    /// How many lines were requested so far
    pub fn prompts(&self) -> usize {
        self.prompts
    }

    /// Answers never consumed
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl InputProvider for ScriptedInput {
    fn next_line(&mut self) -> Result<Option<String>> {
        self.prompts += 1;
        Ok(self.lines.pop_front())
    }
}

// ============================================================================
// SELECTION PARSING
// ============================================================================

/// What one line of operator input means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 0-based position in the candidate list
    Candidate(usize),
    CreateNew,
    Skip,
    Quit,
}

/// Parse a token against a list of `candidates` entries; `None` = invalid
pub fn parse_selection(token: &str, candidates: usize) -> Option<Selection> {
    let token = token.trim().to_lowercase();
    match token.as_str() {
        "" if candidates == 1 => Some(Selection::Candidate(0)),
        "" => None,
        "x" => Some(Selection::CreateNew),
        "s" => Some(Selection::Skip),
        "q" => Some(Selection::Quit),
        n => match n.parse::<usize>() {
            Ok(i) if i >= 1 && i <= candidates => Some(Selection::Candidate(i - 1)),
            _ => None,
        },
    }
}

fn usage(candidates: usize) -> String {
    match candidates {
        0 => "Invalid input. Try again. Input must be x, s or q.".to_string(),
        n => format!(
            "Invalid input. Try again. Input must be a number between 1 and {}, or x, s or q.",
            n
        ),
    }
}

// ============================================================================
// DISAMBIGUATOR
// ============================================================================

/// Resolved outcome for one source record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Matched(CanonicalId),
    CreateNew,
    Skip,
}

pub struct Disambiguator<'a> {
    input: &'a mut dyn InputProvider,
}

impl<'a> Disambiguator<'a> {
    pub fn new(input: &'a mut dyn InputProvider) -> Self {
        Disambiguator { input }
    }

    /// Print the ranked candidates for `record`
    pub fn render(
        &self,
        record: &Record,
        candidates: &[Candidate],
        registry: &CanonicalRegistry,
        exclusion: &ExclusionSet,
    ) {
        println!("Looking for match: {}", record);
        for (i, candidate) in candidates.iter().enumerate() {
            let taken = if exclusion.contains(candidate.id) {
                "!taken already!".red().bold().to_string()
            } else {
                String::new()
            };
            let canonical = registry
                .get(candidate.id)
                .map(|c| c.to_string())
                .unwrap_or_else(|| candidate.key.to_string());
            println!(
                " ({:>2}) [{:>3} %] {}{}{}",
                i + 1,
                candidate.score,
                taken,
                " ".repeat(5),
                canonical
            );
        }
        println!(" (x) Add as new entry (q to quit, s to skip)");
    }

    /// Block until the operator picks something valid
    ///
    /// End of input counts as `q`.
    pub fn ask(&mut self, candidates: usize) -> Result<Selection> {
        loop {
            let Some(line) = self.input.next_line()? else {
                println!("Input closed");
                return Ok(Selection::Quit);
            };
            match parse_selection(&line, candidates) {
                Some(selection) => return Ok(selection),
                None => println!("{}", usage(candidates)),
            }
        }
    }

    /// Render, ask, record the answer, return it
    ///
    /// Returns `ReconcileError::Aborted` on `q`; nothing is recorded then.
    pub fn disambiguate(
        &mut self,
        source: &str,
        record: &Record,
        candidates: &[Candidate],
        registry: &CanonicalRegistry,
        exclusion: &ExclusionSet,
        store: &mut dyn DecisionStore,
    ) -> Result<(Resolution, Choice)> {
        self.render(record, candidates, registry, exclusion);

        let (resolution, choice) = loop {
            match self.ask(candidates.len())? {
                Selection::Quit => {
                    println!("Selected to exit");
                    return Err(ReconcileError::Aborted);
                }
                Selection::CreateNew => break (Resolution::CreateNew, Choice::CreateNew),
                Selection::Skip => break (Resolution::Skip, Choice::Skip),
                Selection::Candidate(i) => {
                    let id = candidates[i].id;
                    let name = registry
                        .get(id)
                        .map(|c| c.name().to_string())
                        .unwrap_or_default();
                    // The log stores the raw name; it must lead back to this record
                    if registry.find_by_raw_name(&name) != Some(id) {
                        println!("'{}' names an earlier record too and cannot be logged. Choose another option.", name);
                        continue;
                    }
                    break (Resolution::Matched(id), Choice::Select(name));
                }
            }
        };

        store.append(&Decision::new(source, record.name.clone(), choice.clone()))?;
        debug!(source, name = %record.name, choice = choice.as_field(), "decision recorded");

        Ok((resolution, choice))
    }
}

// ============================================================================
// TESTS
// ============================================================================
