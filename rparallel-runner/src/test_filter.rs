// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selection and ordering of tasks.

use crate::{catalog::Task, errors::ConfigValidationError};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use regex::Regex;
use std::{collections::BTreeSet, fmt};

/// A filter for tasks, by identifier pattern and by tag.
#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pattern: Option<Regex>,
    include_tags: BTreeSet<String>,
    exclude_tags: BTreeSet<String>,
}

impl TaskFilter {
    /// Creates a new `TaskFilter`.
    ///
    /// `pattern` is a regular expression matched against task identifiers. `tags` is a
    /// comma-separated list of tags; tags prefixed with `~` exclude tasks rather than include
    /// them.
    pub fn new(pattern: Option<&str>, tags: Option<&str>) -> Result<Self, ConfigValidationError> {
        let pattern = pattern
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| ConfigValidationError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    message: err.to_string(),
                })
            })
            .transpose()?;

        let mut include_tags = BTreeSet::new();
        let mut exclude_tags = BTreeSet::new();
        for tag in tags.into_iter().flat_map(|tags| tags.split(',')) {
            let tag = tag.trim();
            match tag.strip_prefix('~') {
                Some(excluded) => {
                    exclude_tags.insert(excluded.trim_start_matches('~').to_owned());
                }
                None if !tag.is_empty() => {
                    include_tags.insert(tag.to_owned());
                }
                None => {}
            }
        }

        Ok(Self {
            pattern,
            include_tags,
            exclude_tags,
        })
    }

    /// Creates a new `TaskFilter` that matches every task.
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns an enum describing the match status of this filter.
    pub fn filter_match(&self, task: &Task) -> FilterMatch {
        if let Some(pattern) = &self.pattern
            && !pattern.is_match(&task.identifier)
        {
            return FilterMatch::Mismatch {
                reason: MismatchReason::Pattern,
            };
        }

        if !self.include_tags.is_empty() && task.tags.is_disjoint(&self.include_tags) {
            return FilterMatch::Mismatch {
                reason: MismatchReason::NotIncluded,
            };
        }

        if !task.tags.is_disjoint(&self.exclude_tags) {
            return FilterMatch::Mismatch {
                reason: MismatchReason::Excluded,
            };
        }

        FilterMatch::Matches
    }
}

/// An enum describing whether a task matches a filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// This task matches this filter.
    Matches,

    /// This task does not match this filter.
    ///
    /// The `MismatchReason` inside describes the reason this filter isn't matched.
    Mismatch {
        /// The reason for the mismatch.
        reason: MismatchReason,
    },
}

impl FilterMatch {
    /// Returns true if the filter matches.
    pub fn is_match(&self) -> bool {
        matches!(self, FilterMatch::Matches)
    }
}

/// The reason for why a task doesn't match a filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MismatchReason {
    /// The identifier does not match the pattern.
    Pattern,

    /// Inclusion tags were given, and the task carries none of them.
    NotIncluded,

    /// The task carries an excluded tag.
    Excluded,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MismatchReason::Pattern => write!(f, "does not match the pattern"),
            MismatchReason::NotIncluded => write!(f, "carries none of the included tags"),
            MismatchReason::Excluded => write!(f, "carries an excluded tag"),
        }
    }
}

/// The order in which selected tasks are dispatched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskOrder {
    /// The order tasks were listed in.
    Listed,

    /// A pseudo-random permutation, reproducible from the seed.
    Random {
        /// The seed used.
        seed: u64,
    },
}

impl TaskOrder {
    /// Puts `tasks` in this order.
    pub fn apply(self, tasks: &mut [Task]) {
        match self {
            TaskOrder::Listed => {}
            TaskOrder::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                tasks.shuffle(&mut rng);
            }
        }
    }

    /// Returns the seed, if the order is random.
    pub fn seed(self) -> Option<u64> {
        match self {
            TaskOrder::Listed => None,
            TaskOrder::Random { seed } => Some(seed),
        }
    }
}

/// Returns the tasks that match `filter`, in the given order.
pub fn select_tasks(tasks: Vec<Task>, filter: &TaskFilter, order: TaskOrder) -> Vec<Task> {
    let mut selected: Vec<_> = tasks
        .into_iter()
        .filter(|task| filter.filter_match(task).is_match())
        .collect();
    order.apply(&mut selected);
    selected
}
