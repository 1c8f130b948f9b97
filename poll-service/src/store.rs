//! In-memory vote tallies for the poll.
//!
//! The option set is fixed when the store is built and every count starts at
//! zero. All reads and writes go through a single mutex, so a vote is never
//! lost and a tally listing always reflects one consistent moment.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Errors produced by the vote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// The requested option is not part of the poll.
    #[error("the choice {0} is not an option in the poll")]
    UnknownOption(String),
    /// The same option name was supplied twice at construction.
    #[error("option '{0}' was given more than once")]
    DuplicateOption(String),
    /// An option name was empty.
    #[error("option names cannot be empty")]
    EmptyOption,
    /// No options were supplied at all.
    #[error("a poll needs at least one option")]
    NoOptions,
}

/// Thread-safe option → count map shared by every connection worker.
///
/// A `BTreeMap` keeps the listing stable between calls, but callers must not
/// rely on any particular order of lines.
#[derive(Debug)]
pub struct VoteStore {
    tallies: Mutex<BTreeMap<String, u64>>,
}

impl VoteStore {
    /// Builds a store with every option at zero votes.
    pub fn new<I, S>(options: I) -> Result<Self, PollError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tallies = BTreeMap::new();
        for option in options {
            let option = option.into();
            if option.is_empty() {
                return Err(PollError::EmptyOption);
            }
            if tallies.contains_key(&option) {
                return Err(PollError::DuplicateOption(option));
            }
            tallies.insert(option, 0);
        }

        if tallies.is_empty() {
            return Err(PollError::NoOptions);
        }

        Ok(Self {
            tallies: Mutex::new(tallies),
        })
    }

    /// Adds one vote to `option` and returns its new count.
    ///
    /// Unknown options leave every count untouched.
    pub fn increment(&self, option: &str) -> Result<u64, PollError> {
        let mut tallies = self.lock();
        match tallies.get_mut(option) {
            Some(count) => {
                *count += 1;
                Ok(*count)
            }
            None => Err(PollError::UnknownOption(option.to_string())),
        }
    }

    /// Returns the current count for `option`.
    pub fn get(&self, option: &str) -> Result<u64, PollError> {
        self.lock()
            .get(option)
            .copied()
            .ok_or_else(|| PollError::UnknownOption(option.to_string()))
    }

    /// Renders one `"<option> has <count> vote(s)"` line per option.
    pub fn render(&self) -> String {
        self.lock()
            .iter()
            .map(|(option, count)| format!("{option} has {count} vote(s)"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Copies every tally under a single lock acquisition.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.lock().clone()
    }

    /// Names of the configured options.
    pub fn options(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    // Every mutation is a single `+= 1`, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, u64>> {
        self.tallies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
