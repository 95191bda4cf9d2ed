// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of the documentation-formatted output of a single RSpec example.
//!
//! RSpec's documentation formatter doesn't produce anything machine-readable, so the output of
//! each run is taken apart by position:
//!
//! ```text
//! <preamble: anything the process printed before the marker>
//! Run options: include {:locations=>{"./spec/calc_spec.rb"=>[5]}}
//!
//! Calculator                                   <- group
//! output printed by the example                <- user output (not indented)
//!   when dividing                              <- nested context (indented)
//!     by zero raises (FAILED - 1)              <- description
//!
//! Failures:
//!
//!   1) Calculator when dividing by zero raises
//!      Failure/Error: expect { 1 / 0 }.to raise_error(RuntimeError)
//!        expected RuntimeError, got #<ZeroDivisionError: divided by 0>
//!      # ./spec/calc_spec.rb:6:in `block (3 levels) in <top (required)>'
//!
//! Finished in 0.01 seconds
//! 1 example, 1 failure
//!
//! Failed examples:
//!
//! rspec ./spec/calc_spec.rb:5 # Calculator when dividing by zero raises
//! ```
//!
//! The last non-blank line decides the status.

use regex::Regex;
use std::{sync::LazyLock, time::Duration};

/// The marker line printed by RSpec before any structured output.
pub static RUN_OPTIONS_MARKER: &str = "Run options:";

/// The prefix RSpec uses for the commands listed under "Failed examples".
pub static DEFAULT_RERUN_PREFIX: &str = "rspec ";

static ZERO_EXAMPLES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0 examples").expect("regex is valid"));
static ZERO_FAILURES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0 failures").expect("regex is valid"));
static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((FAILED|PENDING)[^)]*\)").expect("regex is valid"));
static FIRST_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*1\) ").expect("regex is valid"));

/// The outcome of a single example.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    /// The example passed.
    Passed,

    /// The example failed or raised an error.
    Failed,

    /// The example is pending.
    Pending,

    /// The output ended in a way that isn't recognized.
    Unknown,
}

/// Failure information extracted from the output of a failed example.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseFailure {
    /// The failure message, as printed by RSpec (indented, one line per entry).
    pub message: String,

    /// The backtrace lines, still carrying their `# ` markers.
    pub stack_trace: String,

    /// A short, single-line summary of the failure.
    pub details: String,

    /// The command that reruns this example, e.g. `rspec ./spec/calc_spec.rb:5 # Calculator ...`.
    pub rerun_command: String,
}

/// The result of running a single task, as extracted from its output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseResult {
    /// The top-level example group.
    pub group_name: String,

    /// The example description, including any nested context names.
    pub description: String,

    /// The outcome.
    pub status: CaseStatus,

    /// How long the runner took.
    pub duration: Duration,

    /// Output printed by the example itself.
    pub stdout: String,

    /// Output printed by the process before RSpec started reporting.
    pub stderr: String,

    /// Present if `status` is [`CaseStatus::Failed`].
    pub failure: Option<CaseFailure>,

    /// The pending explanation, present if `status` is [`CaseStatus::Pending`].
    pub pending_info: Option<String>,
}

impl CaseResult {
    /// The full name of the example: the group followed by the description.
    pub fn test_name(&self) -> String {
        format!("{} {}", self.group_name, self.description)
    }
}

/// Turns the captured output of one runner invocation into a [`CaseResult`].
#[derive(Clone, Debug)]
pub struct TranscriptParser {
    rerun_prefix: String,
}

impl Default for TranscriptParser {
    fn default() -> Self {
        Self::new(DEFAULT_RERUN_PREFIX)
    }
}

impl TranscriptParser {
    /// Creates a new parser. `rerun_prefix` is how the runner's own rerun commands begin.
    pub fn new(rerun_prefix: impl Into<String>) -> Self {
        Self {
            rerun_prefix: rerun_prefix.into(),
        }
    }

    /// Returns the rerun prefix this parser recognizes.
    pub fn rerun_prefix(&self) -> &str {
        &self.rerun_prefix
    }

    /// Parses the combined output of one run.
    ///
    /// Returns `None` if no example was run, or if the output doesn't have the expected shape.
    pub fn parse(&self, output: &str, duration: Duration) -> Option<CaseResult> {
        let output = strip_ansi_escapes::strip_str(output);
        if ZERO_EXAMPLES.is_match(&output) {
            return None;
        }

        let lines: Vec<&str> = output.lines().collect();
        let marker = lines
            .iter()
            .position(|line| line.trim_start().starts_with(RUN_OPTIONS_MARKER))?;
        let stderr = join_lines(&lines[..marker]);

        // Line 0 is the marker and line 1 is blank.
        let rest = &lines[marker..];
        let group_name = rest.get(2)?.trim().to_owned();
        let header_end = rest
            .iter()
            .skip(3)
            .position(|line| line.trim().is_empty())
            .map_or(rest.len(), |pos| pos + 3);
        let header = rest.get(3..header_end).filter(|header| !header.is_empty())?;
        if group_name.is_empty() {
            return None;
        }

        let (description, stdout) = split_header(header);
        let description = ANNOTATION.replace_all(&description, "").trim().to_owned();

        let body = &rest[header_end..];
        let last_line = body.iter().rev().find(|line| !line.trim().is_empty());

        let mut result = CaseResult {
            group_name,
            description,
            status: CaseStatus::Unknown,
            duration,
            stdout,
            stderr,
            failure: None,
            pending_info: None,
        };

        match last_line {
            Some(line) if line.contains("pending") => {
                result.status = CaseStatus::Pending;
                let entry = first_entry(body);
                let info: Vec<&str> = entry
                    .iter()
                    .copied()
                    .filter(|line| !line.trim().is_empty())
                    .collect();
                result.pending_info = Some(join_lines(&info));
            }
            Some(line) if ZERO_FAILURES.is_match(line) => {
                result.status = CaseStatus::Passed;
            }
            Some(line) if line.trim_start().starts_with(self.rerun_prefix.as_str()) => {
                result.status = CaseStatus::Failed;
                result.failure = Some(parse_failure(body, line.trim()));
            }
            _ => {}
        }

        Some(result)
    }
}

/// Splits the lines between the group name and the first blank line into the description and
/// any output the example printed.
///
/// RSpec indents nested context names and the example description; anything that isn't indented
/// was printed by the example itself.
fn split_header(header: &[&str]) -> (String, String) {
    let mut contexts = Vec::new();
    let mut stdout = Vec::new();
    for line in header {
        if line.starts_with(char::is_whitespace) && !line.trim().is_empty() {
            contexts.push(line.trim());
        } else {
            stdout.push(*line);
        }
    }

    if contexts.is_empty() {
        // No indentation to go by: the last line is the description.
        if let Some(last) = stdout.pop() {
            contexts.push(last.trim());
        }
    }

    (contexts.join(" "), join_lines(&stdout))
}

/// Returns the lines of the first numbered entry (`1) ...`) up to the "Finished in" line.
fn first_entry<'a>(body: &'a [&'a str]) -> &'a [&'a str] {
    let Some(start) = body.iter().position(|line| FIRST_ENTRY.is_match(line)) else {
        return &[];
    };
    let end = body[start..]
        .iter()
        .position(|line| line.trim_start().starts_with("Finished in"))
        .map_or(body.len(), |pos| pos + start);
    &body[start..end]
}

fn parse_failure(body: &[&str], rerun_command: &str) -> CaseFailure {
    let entry = first_entry(body);

    let mut message = String::new();
    let mut stack_trace = String::new();
    // Skip the "1) <name>" header itself.
    for line in entry.iter().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let target = if line.trim_start().starts_with("# ") {
            &mut stack_trace
        } else {
            &mut message
        };
        target.push_str(line);
        target.push('\n');
    }

    let details = error_details(&message);
    CaseFailure {
        message,
        stack_trace,
        details,
        rerun_command: rerun_command.to_owned(),
    }
}

/// Picks the first message line that isn't an "Error:" label, and marks it with an ellipsis if
/// more of the message follows it.
fn error_details(message: &str) -> String {
    let Some(first) = message
        .lines()
        .find(|line| !line.contains("Error:"))
        .or_else(|| message.lines().next())
    else {
        return String::new();
    };

    let details = first.trim();
    let index = message.find(details).unwrap_or(0);
    let tail_start = message.len().saturating_sub(details.len() + 10);
    if index < tail_start {
        format!("{details}...")
    } else {
        details.to_owned()
    }
}

fn join_lines(lines: &[&str]) -> String {
    let mut joined = String::new();
    for line in lines {
        joined.push_str(line);
        joined.push('\n');
    }
    joined
}
