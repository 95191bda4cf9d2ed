// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building, patching and appending to a report set from the results of a run.

use super::ReportSet;
use crate::transcript::{CaseFailure, CaseResult, CaseStatus};
use camino::Utf8Path;
use regex::Regex;
use rparallel_report::{
    CaseError, NonSuccessKind, SummaryCase, SummarySuite, TestCase, TestCaseStatus, TestFailure,
    TestSuite,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet, btree_map::Entry},
    sync::LazyLock,
};

/// The failure type recorded for unmet expectations.
pub static EXPECTATION_NOT_MET_TYPE: &str = "RSpec::Expectations::ExpectationNotMetError";

/// The failure type recorded for runtime errors.
pub static RUNTIME_ERROR_TYPE: &str = "RuntimeError";

/// The failure type recorded for anything else.
pub static UNKNOWN_ERROR_TYPE: &str = "UnknownError";

static COLONS: LazyLock<Regex> = LazyLock::new(|| Regex::new(":+").expect("regex is valid"));

impl ReportSet {
    /// Builds a new report set from the results of a run.
    ///
    /// Results are grouped by group name, groups are sorted by name, and cases within a group are
    /// sorted by description. The order results were collected in doesn't matter.
    ///
    /// For longevity runs (`longevity_index > 0`), test names are prefixed with the index so that
    /// iterations can be told apart.
    pub fn build(results: &[CaseResult], report_folder: &Utf8Path, longevity_index: usize) -> Self {
        let mut by_group: BTreeMap<&str, Vec<&CaseResult>> = BTreeMap::new();
        for result in results {
            by_group
                .entry(result.group_name.as_str())
                .or_default()
                .push(result);
        }

        let mut set = Self::default();
        for (group_name, mut cases) in by_group {
            // This is a stable sort, so cases with the same description stay in run order.
            cases.sort_by(|a, b| a.description.cmp(&b.description));

            let file_name = group_file_name(group_name);
            let mut suite = SummarySuite::new(
                group_name.replace(':', "_"),
                report_folder.join(&file_name).into_string(),
            );
            suite.stdout = concat_unique(cases.iter().map(|case| case.stdout.as_str()));
            suite.stderr = concat_unique(cases.iter().map(|case| case.stderr.as_str()));

            let mut testsuite = TestSuite::new(group_name);
            for case in &cases {
                let test_name = report_test_name(case, longevity_index);
                suite.add_case(summary_case(case, &test_name));
                testsuite.add_testcase(TestCase::new(
                    test_name,
                    case.duration,
                    testcase_status(case),
                ));
            }
            testsuite
                .set_system_out(suite.stdout.clone())
                .set_system_err(suite.stderr.clone());

            set.summary.add_suite(suite);
            set.groups.insert(file_name, testsuite);
        }

        set
    }

    /// Refreshes previously failed entries with the results of a rerun.
    ///
    /// Each failed entry is looked up by test name among `results` (the last result wins). Entries
    /// that pass or are pending now lose their failure information, entries that still fail get
    /// the new failure information, and everything else is left untouched.
    pub fn patch(&mut self, results: &[CaseResult], longevity_index: usize) -> &mut Self {
        let latest: HashMap<String, &CaseResult> = results
            .iter()
            .map(|result| (lookup_name(result, longevity_index), result))
            .collect();

        for suite in &mut self.summary.suites {
            let mut changed = false;
            for case in &mut suite.cases {
                if case.error.is_none() {
                    continue;
                }
                let Some(result) = latest.get(&case.test_name) else {
                    continue;
                };
                match (result.status, &result.failure) {
                    (CaseStatus::Failed, Some(failure)) => {
                        case.error = Some(case_error(failure));
                    }
                    (CaseStatus::Passed, _) => case.error = None,
                    (CaseStatus::Pending, _) => {
                        case.error = None;
                        case.skipped = true;
                    }
                    (CaseStatus::Failed, None) | (CaseStatus::Unknown, _) => continue,
                }
                case.duration = result.duration;
                changed = true;
            }
            if changed {
                suite.recount();
            }
        }

        for testsuite in self.groups.values_mut() {
            let mut changed = false;
            for testcase in &mut testsuite.testcases {
                if testcase.status.failure().is_none() {
                    continue;
                }
                let Some(result) = latest.get(&testcase.name) else {
                    continue;
                };
                match (result.status, &result.failure) {
                    (CaseStatus::Failed, Some(failure)) => {
                        testcase.status = TestCaseStatus::Failure(test_failure(failure));
                    }
                    (CaseStatus::Passed, _) => testcase.status = TestCaseStatus::Success,
                    (CaseStatus::Pending, _) => testcase.status = TestCaseStatus::Skipped,
                    (CaseStatus::Failed, None) | (CaseStatus::Unknown, _) => continue,
                }
                testcase.time = result.duration;
                changed = true;
            }
            if changed {
                testsuite.recount();
            }
        }

        self
    }

    /// Adds the results of another longevity iteration.
    ///
    /// Earlier cases are kept. The latest output of each group replaces the previous one, and the
    /// previous run's duration and marker are removed until [`finish`](Self::finish) is called.
    pub fn append(
        &mut self,
        results: &[CaseResult],
        report_folder: &Utf8Path,
        longevity_index: usize,
    ) -> &mut Self {
        self.summary.clear_footer();
        let fresh = Self::build(results, report_folder, longevity_index);

        for suite in fresh.summary.suites {
            match self.summary.suite_mut(&suite.name) {
                Some(existing) => {
                    existing.stdout = suite.stdout;
                    existing.stderr = suite.stderr;
                    existing.cases.extend(suite.cases);
                    existing.recount();
                }
                None => {
                    self.summary.add_suite(suite);
                }
            }
        }
        self.summary.suites.sort_by(|a, b| a.name.cmp(&b.name));

        for (file_name, testsuite) in fresh.groups {
            match self.groups.entry(file_name) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.testcases.extend(testsuite.testcases);
                    existing.system_out = testsuite.system_out;
                    existing.system_err = testsuite.system_err;
                    existing.recount();
                }
                Entry::Vacant(entry) => {
                    entry.insert(testsuite);
                }
            }
        }

        self
    }
}

/// The file name of the group document for `group_name`.
pub fn group_file_name(group_name: &str) -> String {
    format!("{}.xml", COLONS.replace_all(group_name, "-"))
}

/// Returns the name a failure is recorded under in the failure body's type attribute.
pub fn failure_type(failure: &CaseFailure) -> &'static str {
    if failure.message.contains("expected") {
        EXPECTATION_NOT_MET_TYPE
    } else if failure.message.contains("RuntimeError") {
        RUNTIME_ERROR_TYPE
    } else {
        UNKNOWN_ERROR_TYPE
    }
}

/// The full failure body: the message without its "Failure/Error:" label, then the trace without
/// its `# ` markers.
pub fn failure_body(failure: &CaseFailure) -> String {
    let message = failure.message.replace("Failure/Error: ", "");
    let trace = failure.stack_trace.replace("# ", "");
    format!("{message}{}", trace.trim())
}

/// The name a result is matched against existing entries by.
fn lookup_name(result: &CaseResult, longevity_index: usize) -> String {
    if longevity_index == 0 {
        result.test_name()
    } else {
        format!("{longevity_index}-{}", result.test_name())
    }
}

fn report_test_name(result: &CaseResult, longevity_index: usize) -> String {
    let mut name = lookup_name(result, longevity_index);
    if result.status == CaseStatus::Pending {
        name.push_str(" (PENDING)");
    }
    name
}

fn summary_case(result: &CaseResult, test_name: &str) -> SummaryCase {
    let mut case = SummaryCase::new(&result.group_name, test_name, result.duration);
    case.skipped = result.status == CaseStatus::Pending;
    if result.status == CaseStatus::Failed {
        case.error = result.failure.as_ref().map(case_error);
    }
    case
}

fn case_error(failure: &CaseFailure) -> CaseError {
    CaseError {
        stack_trace: failure_body(failure),
        details: failure.details.clone(),
        rerun_command: failure.rerun_command.trim().to_owned(),
    }
}

fn testcase_status(result: &CaseResult) -> TestCaseStatus {
    match (result.status, &result.failure) {
        (CaseStatus::Pending, _) => TestCaseStatus::Skipped,
        (CaseStatus::Failed, Some(failure)) => TestCaseStatus::Failure(test_failure(failure)),
        (CaseStatus::Passed | CaseStatus::Failed | CaseStatus::Unknown, _) => {
            TestCaseStatus::Success
        }
    }
}

fn test_failure(failure: &CaseFailure) -> TestFailure {
    TestFailure {
        kind: NonSuccessKind::classify(&failure.message),
        ty: failure_type(failure).to_owned(),
        message: failure.details.clone(),
        description: failure_body(failure),
        rerun_command: failure.rerun_command.trim().to_owned(),
    }
}

/// Concatenates outputs, skipping repeats.
fn concat_unique<'a>(outputs: impl Iterator<Item = &'a str>) -> String {
    let mut seen = HashSet::new();
    let mut joined = String::new();
    for output in outputs {
        if seen.insert(output) {
            joined.push_str(output);
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rparallel_report::SummaryReport;
    use std::time::Duration;
    use test_case::test_case;

    fn result(group: &str, description: &str, status: CaseStatus) -> CaseResult {
        CaseResult {
            group_name: group.to_owned(),
            description: description.to_owned(),
            status,
            duration: Duration::from_millis(100),
            stdout: String::new(),
            stderr: String::new(),
            failure: None,
            pending_info: None,
        }
    }

    fn failed(group: &str, description: &str, message: &str) -> CaseResult {
        let mut result = result(group, description, CaseStatus::Failed);
        result.failure = Some(CaseFailure {
            message: format!("     Failure/Error: {message}\n"),
            stack_trace: "     # ./spec/calc_spec.rb:9\n".to_owned(),
            details: message.to_owned(),
            rerun_command: format!("rspec ./spec/calc_spec.rb:8 # {group} {description}"),
        });
        result
    }

    fn folder() -> &'static Utf8Path {
        Utf8Path::new("/tmp/report")
    }

    #[test]
    fn build_groups_and_sorts() {
        let results = vec![
            result("Zebra", "stripes", CaseStatus::Passed),
            failed("Calculator", "divides", "expected: 3"),
            result("Calculator", "adds", CaseStatus::Passed),
            result("Foo::Bar", "waits", CaseStatus::Pending),
        ];
        let set = ReportSet::build(&results, folder(), 0);

        let suite_names: Vec<_> = set.summary.suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(suite_names, vec!["Calculator", "Foo__Bar", "Zebra"]);
        let file_names: Vec<_> = set.groups.keys().map(String::as_str).collect();
        assert_eq!(file_names, vec!["Calculator.xml", "Foo-Bar.xml", "Zebra.xml"]);
        assert_eq!(set.summary.suites[1].file, "/tmp/report/Foo-Bar.xml");

        let calculator = &set.summary.suites[0];
        let test_names: Vec<_> = calculator.cases.iter().map(|c| c.test_name.as_str()).collect();
        assert_eq!(test_names, vec!["Calculator adds", "Calculator divides"]);
        assert_eq!(calculator.duration, Duration::from_millis(200));
        assert_eq!(calculator.cases[0].error, None);
        let error = calculator.cases[1].error.as_ref().expect("divides failed");
        assert_eq!(error.details, "expected: 3");
        assert_eq!(
            error.rerun_command,
            "rspec ./spec/calc_spec.rb:8 # Calculator divides"
        );
        assert_eq!(error.stack_trace, "     expected: 3\n./spec/calc_spec.rb:9");

        let pending = &set.summary.suites[1].cases[0];
        assert_eq!(pending.test_name, "Foo::Bar waits (PENDING)");
        assert_eq!(pending.class_name, "Foo::Bar");
        assert!(pending.skipped);

        let group = &set.groups["Calculator.xml"];
        assert_eq!(group.name, "Calculator");
        assert_eq!(group.tests, 2);
        assert_eq!(group.failures, 1);
        assert_eq!(group.errors, 0);
        let failure = group.testcases[1].status.failure().expect("divides failed");
        assert_eq!(failure.ty, EXPECTATION_NOT_MET_TYPE);
        assert_eq!(failure.kind, NonSuccessKind::Failure);
        assert_eq!(set.groups["Foo-Bar.xml"].skipped, 1);
    }

    #[test]
    fn build_prefixes_longevity_iterations() {
        let results = vec![
            result("Calculator", "adds", CaseStatus::Passed),
            result("Calculator", "waits", CaseStatus::Pending),
        ];
        let set = ReportSet::build(&results, folder(), 3);
        let names: Vec<_> = set.groups["Calculator.xml"]
            .testcases
            .iter()
            .map(|testcase| testcase.name.as_str())
            .collect();
        assert_eq!(names, vec!["3-Calculator adds", "3-Calculator waits (PENDING)"]);
    }

    #[test]
    fn build_collects_unique_output() {
        let mut first = result("Calculator", "adds", CaseStatus::Passed);
        first.stdout = "hello\n".to_owned();
        let mut second = result("Calculator", "subtracts", CaseStatus::Passed);
        second.stdout = "hello\n".to_owned();
        let mut third = result("Calculator", "divides", CaseStatus::Passed);
        third.stdout = "world\n".to_owned();
        third.stderr = "warning\n".to_owned();

        let set = ReportSet::build(&[first, second, third], folder(), 0);
        // Sorted by description: adds, divides, subtracts.
        assert_eq!(set.summary.suites[0].stdout, "hello\nworld\n");
        assert_eq!(set.summary.suites[0].stderr, "warning\n");
        let group = &set.groups["Calculator.xml"];
        assert_eq!(group.system_out.as_deref(), Some("hello\nworld\n"));
        assert_eq!(group.system_err.as_deref(), Some("warning\n"));
    }

    #[test_case("expected: 3\n     got: 2", EXPECTATION_NOT_MET_TYPE; "expectation")]
    #[test_case("RuntimeError:\n       boom", RUNTIME_ERROR_TYPE; "runtime error")]
    #[test_case("NoMethodError:\n       undefined method", UNKNOWN_ERROR_TYPE; "other")]
    fn failure_types(message: &str, expected: &str) {
        let result = failed("Calculator", "divides", message);
        let failure = result.failure.as_ref().expect("result failed");
        assert_eq!(failure_type(failure), expected);
    }

    #[test]
    fn errors_are_classified_by_message() {
        let mut raised = result("Expectations", "raises", CaseStatus::Failed);
        raised.failure = Some(CaseFailure {
            message: "     Failure/Error: raise 'boom'\n     RuntimeError:\n       boom\n".to_owned(),
            stack_trace: "     # ./spec/expectations_spec.rb:3\n".to_owned(),
            details: "boom".to_owned(),
            rerun_command: "rspec ./spec/expectations_spec.rb:2 # Expectations raises".to_owned(),
        });
        let results = vec![
            raised,
            failed("Expectations", "compares", "expected: 3"),
        ];
        let set = ReportSet::build(&results, folder(), 0);

        let group = &set.groups["Expectations.xml"];
        assert_eq!((group.failures, group.errors), (1, 1));
        let error = group.testcases[1].status.failure().expect("raises failed");
        assert_eq!(error.kind, NonSuccessKind::Error);
        assert_eq!(error.ty, RUNTIME_ERROR_TYPE);

        let xml = group.to_string().expect("group serialized");
        let mut read_back = TestSuite::from_xml(&xml).expect("group read back");
        read_back.recount();
        assert_eq!((read_back.failures, read_back.errors), (1, 1));
    }

    #[test]
    fn failed_case_survives_serialization() {
        let results = vec![failed("Foo::Bar", "breaks", "expected: true")];
        let set = ReportSet::build(&results, folder(), 0);

        let xml = set.summary.to_string().expect("summary serialized");
        let summary = SummaryReport::from_xml(&xml).expect("summary read back");
        let case = &summary.suites[0].cases[0];
        assert_eq!(case.class_name, "Foo::Bar");
        assert_eq!(case.test_name, results[0].test_name());
        assert_eq!(
            case.error.as_ref().map(|error| error.rerun_command.as_str()),
            Some("rspec ./spec/calc_spec.rb:8 # Foo::Bar breaks")
        );

        let xml = set.groups["Foo-Bar.xml"].to_string().expect("group serialized");
        let group = TestSuite::from_xml(&xml).expect("group read back");
        assert_eq!(group.name, "Foo::Bar");
        assert_eq!(group.testcases[0].name, "Foo::Bar breaks");
        assert_eq!(
            group.testcases[0]
                .status
                .failure()
                .map(|failure| failure.rerun_command.as_str()),
            Some("rspec ./spec/calc_spec.rb:8 # Foo::Bar breaks")
        );
    }

    fn prior() -> ReportSet {
        let results = vec![
            result("Calculator", "adds", CaseStatus::Passed),
            failed("Calculator", "divides", "expected: 3"),
            failed("Calculator", "multiplies", "expected: 6"),
            failed("Calculator", "subtracts", "expected: 1"),
        ];
        let mut set = ReportSet::build(&results, folder(), 0);
        set.finish(Duration::from_secs(1));
        set
    }

    #[test]
    fn patch_refreshes_failed_entries() {
        let mut set = prior();

        let mut now_failing = failed("Calculator", "multiplies", "expected: 7");
        now_failing.duration = Duration::from_millis(300);
        let rerun = vec![
            result("Calculator", "divides", CaseStatus::Passed),
            now_failing,
            result("Calculator", "subtracts", CaseStatus::Unknown),
        ];
        set.patch(&rerun, 0);

        let cases = &set.summary.suites[0].cases;
        assert_eq!(cases[0], prior().summary.suites[0].cases[0]);
        assert_eq!(cases[1].error, None);
        let error = cases[2].error.as_ref().expect("multiplies still fails");
        assert_eq!(error.details, "expected: 7");
        assert_eq!(cases[2].duration, Duration::from_millis(300));
        // Unknown results leave the entry as it was.
        assert_eq!(cases[3], prior().summary.suites[0].cases[3]);
        assert_eq!(set.summary.suites[0].duration, Duration::from_millis(600));
        assert_eq!(set.summary.duration, Some(Duration::from_secs(1)));

        let group = &set.groups["Calculator.xml"];
        assert_eq!(group.testcases[1].status, TestCaseStatus::Success);
        assert_eq!(
            group.testcases[2].status.failure().map(|f| f.message.as_str()),
            Some("expected: 7")
        );
        assert!(group.testcases[3].status.failure().is_some());
        assert_eq!(group.tests, 4);
        assert_eq!(group.failures, 2);
    }

    #[test]
    fn patch_pending_clears_failure() {
        let mut set = prior();
        set.patch(&[result("Calculator", "divides", CaseStatus::Pending)], 0);

        let case = &set.summary.suites[0].cases[1];
        assert_eq!(case.error, None);
        assert!(case.skipped);
        let group = &set.groups["Calculator.xml"];
        assert_eq!(group.testcases[1].status, TestCaseStatus::Skipped);
        assert_eq!(group.skipped, 1);
    }

    #[test]
    fn patch_with_no_results_changes_nothing() {
        let mut set = prior();
        set.patch(&[], 0);
        assert_eq!(set, prior());
    }

    #[test]
    fn append_accumulates_iterations() {
        let mut first = result("Calculator", "adds", CaseStatus::Passed);
        first.stdout = "iteration 1\n".to_owned();
        let mut set = ReportSet::build(&[first], folder(), 1);
        set.finish(Duration::from_secs(1));

        for index in 2..=3 {
            let mut next = result("Calculator", "adds", CaseStatus::Passed);
            next.stdout = format!("iteration {index}\n");
            set.append(&[next], folder(), index);
            assert_eq!(set.summary.duration, None);
            set.finish(Duration::from_secs(index as u64));
        }
        set.append(&[result("Abacus", "counts", CaseStatus::Passed)], folder(), 4);

        let names: Vec<_> = set.groups["Calculator.xml"]
            .testcases
            .iter()
            .map(|testcase| testcase.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["1-Calculator adds", "2-Calculator adds", "3-Calculator adds"]
        );
        assert_eq!(set.groups["Calculator.xml"].tests, 3);
        assert_eq!(
            set.groups["Calculator.xml"].system_out.as_deref(),
            Some("iteration 3\n")
        );

        let suite_names: Vec<_> = set.summary.suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(suite_names, vec!["Abacus", "Calculator"]);
        let calculator = &set.summary.suites[1];
        assert_eq!(calculator.cases.len(), 3);
        assert_eq!(calculator.stdout, "iteration 3\n");
        assert_eq!(calculator.duration, Duration::from_millis(300));
        assert_eq!(set.summary.duration, None);
    }
}
