// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    DeserializeError, SerializeError,
    deserialize::{deserialize_summary, deserialize_test_suite},
    serialize::{serialize_summary, serialize_test_suite},
};
use std::{io, time::Duration};

/// The keyword that marks a failure body as a failed expectation rather than an error.
pub static EXPECTATION_KEYWORD: &str = "expect";

/// The root element of a summary report: `result`.
///
/// A summary report holds one [`SummarySuite`] per group, in the order they were added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SummaryReport {
    /// The suites contained in this report.
    pub suites: Vec<SummarySuite>,

    /// The overall time taken by the run that last wrote this report.
    ///
    /// Serialized as the number of seconds. Absent while a report is being merged.
    pub duration: Option<Duration>,

    /// Value of the `keepLongStdio` marker.
    pub keep_long_stdio: Option<bool>,
}

impl SummaryReport {
    /// Creates a new, empty summary report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a suite to the end of this report.
    pub fn add_suite(&mut self, suite: SummarySuite) -> &mut Self {
        self.suites.push(suite);
        self
    }

    /// Returns the suite with the given name, if any.
    pub fn suite_mut(&mut self, name: &str) -> Option<&mut SummarySuite> {
        self.suites.iter_mut().find(|suite| suite.name == name)
    }

    /// Sets the run duration and the `keepLongStdio` marker.
    pub fn set_footer(&mut self, duration: Duration, keep_long_stdio: bool) -> &mut Self {
        self.duration = Some(duration);
        self.keep_long_stdio = Some(keep_long_stdio);
        self
    }

    /// Removes the run duration and the `keepLongStdio` marker.
    pub fn clear_footer(&mut self) -> &mut Self {
        self.duration = None;
        self.keep_long_stdio = None;
        self
    }

    /// Iterates over all cases in all suites.
    pub fn cases(&self) -> impl Iterator<Item = &SummaryCase> + '_ {
        self.suites.iter().flat_map(|suite| suite.cases.iter())
    }

    /// Iterates over all cases that carry error details.
    pub fn failed_cases(&self) -> impl Iterator<Item = &SummaryCase> + '_ {
        self.cases().filter(|case| case.error.is_some())
    }

    /// Serialize this report to the given writer.
    pub fn serialize(&self, writer: impl io::Write) -> Result<(), SerializeError> {
        serialize_summary(self, writer).map_err(SerializeError::from)
    }

    /// Serialize this report to a string.
    pub fn to_string(&self) -> Result<String, SerializeError> {
        let mut buf: Vec<u8> = vec![];
        self.serialize(&mut buf)?;
        // All inputs are `str`s, so the output is valid UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Reads a summary report from its XML form.
    pub fn from_xml(input: &str) -> Result<Self, DeserializeError> {
        deserialize_summary(input)
    }
}

/// A single `suite` within a summary report: the cases belonging to one group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummarySuite {
    /// The path of the standalone group report for this suite.
    pub file: String,

    /// The name of this suite.
    pub name: String,

    /// Output captured from the cases in this suite.
    pub stdout: String,

    /// Auxiliary error output captured from the cases in this suite.
    pub stderr: String,

    /// The sum of the durations of the cases in this suite.
    pub duration: Duration,

    /// The cases in this suite.
    pub cases: Vec<SummaryCase>,
}

impl SummarySuite {
    /// Creates a new, empty suite.
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            cases: vec![],
        }
    }

    /// Adds a case and accumulates its duration.
    pub fn add_case(&mut self, case: SummaryCase) -> &mut Self {
        self.duration += case.duration;
        self.cases.push(case);
        self
    }

    /// Recomputes the suite duration from its cases.
    pub fn recount(&mut self) -> &mut Self {
        self.duration = self.cases.iter().map(|case| case.duration).sum();
        self
    }
}

/// A single `case` within a summary suite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryCase {
    /// The time it took to execute this case.
    pub duration: Duration,

    /// The group this case belongs to.
    pub class_name: String,

    /// The full name of the case.
    pub test_name: String,

    /// Whether this case was skipped (pending).
    pub skipped: bool,

    /// Error information, present if the case failed.
    pub error: Option<CaseError>,

    /// The build number this case has been failing since. Always 0 for rparallel.
    pub failed_since: u64,
}

impl SummaryCase {
    /// Creates a new passing case.
    pub fn new(
        class_name: impl Into<String>,
        test_name: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            duration,
            class_name: class_name.into(),
            test_name: test_name.into(),
            skipped: false,
            error: None,
            failed_since: 0,
        }
    }
}

/// Error information recorded for a failed summary case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseError {
    /// The failure message followed by the stack trace.
    pub stack_trace: String,

    /// A short, single-line summary of the failure.
    pub details: String,

    /// The command that reruns exactly this case.
    pub rerun_command: String,
}

/// Whether a failure is an unmet expectation or an unexpected error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NonSuccessKind {
    /// An expectation was not met.
    Failure,

    /// Something unexpected happened, e.g. an exception was raised.
    Error,
}

impl NonSuccessKind {
    /// Classifies a failure by its message: messages mentioning [`EXPECTATION_KEYWORD`] are
    /// failures, everything else is an error.
    ///
    /// Only the message is looked at. Stack traces routinely mention paths like
    /// `expectations_spec.rb` and say nothing about the kind.
    pub fn classify(message: &str) -> Self {
        if message.contains(EXPECTATION_KEYWORD) {
            NonSuccessKind::Failure
        } else {
            NonSuccessKind::Error
        }
    }
}

/// The root element of a group report: a JUnit `testsuite`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestSuite {
    /// The name of this testsuite.
    pub name: String,

    /// The total number of tests in this testsuite.
    pub tests: usize,

    /// The overall time taken by the testsuite.
    pub time: Duration,

    /// The number of tests in this suite that failed an expectation.
    pub failures: usize,

    /// The number of tests in this suite that errored.
    pub errors: usize,

    /// The number of tests in this suite that were skipped.
    pub skipped: usize,

    /// The testcases that form this testsuite.
    pub testcases: Vec<TestCase>,

    /// Data written to standard output by the latest run of this testsuite.
    pub system_out: Option<String>,

    /// Auxiliary error output from the latest run of this testsuite.
    pub system_err: Option<String>,
}

impl TestSuite {
    /// Creates a new `TestSuite`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: 0,
            time: Duration::ZERO,
            failures: 0,
            errors: 0,
            skipped: 0,
            testcases: vec![],
            system_out: None,
            system_err: None,
        }
    }

    /// Adds a testcase to this testsuite and updates the counts.
    ///
    /// When generating a new report, use of this method is recommended over adding to
    /// `self.testcases` directly.
    pub fn add_testcase(&mut self, testcase: TestCase) -> &mut Self {
        self.tests += 1;
        self.time += testcase.time;
        match &testcase.status {
            TestCaseStatus::Success => {}
            TestCaseStatus::Skipped => self.skipped += 1,
            TestCaseStatus::Failure(failure) => match failure.kind {
                NonSuccessKind::Failure => self.failures += 1,
                NonSuccessKind::Error => self.errors += 1,
            },
        }
        self.testcases.push(testcase);
        self
    }

    /// Adds several testcases and updates the counts.
    pub fn add_testcases(&mut self, testcases: impl IntoIterator<Item = TestCase>) -> &mut Self {
        for testcase in testcases {
            self.add_testcase(testcase);
        }
        self
    }

    /// Recomputes the counts and total time from the testcases.
    ///
    /// Call this after editing `self.testcases` in place.
    pub fn recount(&mut self) -> &mut Self {
        let testcases = std::mem::take(&mut self.testcases);
        self.tests = 0;
        self.time = Duration::ZERO;
        self.failures = 0;
        self.errors = 0;
        self.skipped = 0;
        self.add_testcases(testcases)
    }

    /// Sets standard output.
    pub fn set_system_out(&mut self, system_out: impl Into<String>) -> &mut Self {
        self.system_out = Some(system_out.into());
        self
    }

    /// Sets standard error.
    pub fn set_system_err(&mut self, system_err: impl Into<String>) -> &mut Self {
        self.system_err = Some(system_err.into());
        self
    }

    /// Serialize this testsuite to the given writer.
    pub fn serialize(&self, writer: impl io::Write) -> Result<(), SerializeError> {
        serialize_test_suite(self, writer).map_err(SerializeError::from)
    }

    /// Serialize this testsuite to a string.
    pub fn to_string(&self) -> Result<String, SerializeError> {
        let mut buf: Vec<u8> = vec![];
        self.serialize(&mut buf)?;
        // All inputs are `str`s, so the output is valid UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Reads a testsuite from its XML form.
    pub fn from_xml(input: &str) -> Result<Self, DeserializeError> {
        deserialize_test_suite(input)
    }
}

/// Represents a single testcase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    /// The name of the testcase.
    pub name: String,

    /// The time it took to execute this testcase.
    pub time: Duration,

    /// The status of this test.
    pub status: TestCaseStatus,
}

impl TestCase {
    /// Creates a new testcase.
    pub fn new(name: impl Into<String>, time: Duration, status: TestCaseStatus) -> Self {
        Self {
            name: name.into(),
            time,
            status,
        }
    }
}

/// Represents the outcome of a testcase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestCaseStatus {
    /// This testcase passed.
    Success,

    /// This testcase was not run (pending).
    Skipped,

    /// This testcase did not pass.
    Failure(TestFailure),
}

impl TestCaseStatus {
    /// Returns the failure, if this testcase failed.
    pub fn failure(&self) -> Option<&TestFailure> {
        match self {
            TestCaseStatus::Failure(failure) => Some(failure),
            TestCaseStatus::Success | TestCaseStatus::Skipped => None,
        }
    }
}

/// A `failure` or `error` element along with the command to rerun the testcase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestFailure {
    /// Whether this is an unmet expectation or an error. Serialized as the element name.
    pub kind: NonSuccessKind,

    /// The "type" of failure that occurred.
    pub ty: String,

    /// The short failure message.
    pub message: String,

    /// The full failure body: message followed by stack trace.
    ///
    /// This is serialized and deserialized from the text node of the element.
    pub description: String,

    /// The command that reruns exactly this testcase.
    pub rerun_command: String,
}
