// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use indoc::indoc;
use pretty_assertions::assert_eq;
use rparallel_report::{
    CaseError, DeserializeError, NonSuccessKind, SummaryCase, SummaryReport, SummarySuite,
    TestCase, TestCaseStatus, TestFailure, TestSuite,
};
use std::time::Duration;

fn sample_summary() -> SummaryReport {
    let mut report = SummaryReport::new();

    let mut suite = SummarySuite::new("Calculator", "report/Calculator.xml");
    suite.stdout = "  printed <from> a test\n".to_owned();
    suite.add_case(SummaryCase::new(
        "Calculator",
        "Calculator adds",
        Duration::from_millis(120),
    ));

    let mut failed = SummaryCase::new(
        "Calculator",
        "Calculator divides",
        Duration::from_millis(2_500),
    );
    failed.error = Some(CaseError {
        stack_trace: "     expected: 2\n          got: 1\n./spec/calculator_spec.rb:9\n".to_owned(),
        details: "expected: 2...".to_owned(),
        rerun_command: "rspec ./spec/calculator_spec.rb:8 # Calculator divides".to_owned(),
    });
    suite.add_case(failed);

    let mut pending = SummaryCase::new(
        "Calculator",
        "Calculator multiplies (PENDING)",
        Duration::from_millis(3),
    );
    pending.skipped = true;
    suite.add_case(pending);

    report.add_suite(suite);
    report.set_footer(Duration::from_secs(3), false);
    report
}

fn sample_test_suite() -> TestSuite {
    let mut testsuite = TestSuite::new("Calculator");
    testsuite
        .add_testcase(TestCase::new(
            "Calculator adds",
            Duration::from_millis(120),
            TestCaseStatus::Success,
        ))
        .add_testcase(TestCase::new(
            "Calculator divides",
            Duration::from_millis(2_500),
            TestCaseStatus::Failure(TestFailure {
                kind: NonSuccessKind::Failure,
                ty: "RSpec::Expectations::ExpectationNotMetError".to_owned(),
                message: "expected: 2...".to_owned(),
                description: "     expected: 2\n          got: 1\n".to_owned(),
                rerun_command: "rspec ./spec/calculator_spec.rb:8 # Calculator divides".to_owned(),
            }),
        ))
        .add_testcase(TestCase::new(
            "Calculator multiplies (PENDING)",
            Duration::from_millis(3),
            TestCaseStatus::Skipped,
        ))
        .set_system_out("  printed <from> a test\n")
        .set_system_err("");
    testsuite
}

#[test]
fn summary_roundtrips() {
    let report = sample_summary();
    let xml = report.to_string().expect("serializing summary succeeds");

    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(xml.contains("<keepLongStdio>false</keepLongStdio>"));
    assert!(xml.contains("<duration>3.000</duration>"));
    assert!(xml.contains("<stderr></stderr>"));
    assert!(xml.contains(
        "<rerunCommand>rspec ./spec/calculator_spec.rb:8 # Calculator divides</rerunCommand>"
    ));

    let read_back = SummaryReport::from_xml(&xml).expect("reading summary succeeds");
    assert_eq!(read_back, report);

    // Writing out what was read produces exactly the same document.
    let xml2 = read_back.to_string().expect("serializing summary succeeds");
    assert_eq!(xml2, xml);
}

#[test]
fn test_suite_roundtrips() {
    let testsuite = sample_test_suite();
    assert_eq!(testsuite.tests, 3);
    assert_eq!(testsuite.failures, 1);
    assert_eq!(testsuite.errors, 0);
    assert_eq!(testsuite.skipped, 1);

    let xml = testsuite.to_string().expect("serializing testsuite succeeds");
    assert!(xml.contains(
        r#"<testsuite name="Calculator" tests="3" time="2.623" failures="1" errors="0" skipped="1">"#
    ));
    assert!(xml.contains(r#"<testcase name="Calculator adds" time="0.120"/>"#));
    assert!(xml.contains(
        r#"<failure type="RSpec::Expectations::ExpectationNotMetError" message="expected: 2...">"#
    ));
    assert!(xml.contains("<skipped/>"));

    let read_back = TestSuite::from_xml(&xml).expect("reading testsuite succeeds");
    assert_eq!(read_back, testsuite);
    assert_eq!(read_back.to_string().expect("serializing succeeds"), xml);
}

#[test]
fn errors_keep_their_kind() {
    let mut testsuite = TestSuite::new("Expectations");
    testsuite.add_testcase(TestCase::new(
        "Expectations raises",
        Duration::from_millis(10),
        TestCaseStatus::Failure(TestFailure {
            kind: NonSuccessKind::Error,
            ty: "RuntimeError".to_owned(),
            message: "boom".to_owned(),
            description: "raise 'boom'\nRuntimeError:\nboom\n./spec/expectations_spec.rb:3".to_owned(),
            rerun_command: "rspec ./spec/expectations_spec.rb:2 # Expectations raises".to_owned(),
        }),
    ));
    assert_eq!((testsuite.failures, testsuite.errors), (0, 1));

    let xml = testsuite.to_string().expect("serializing testsuite succeeds");
    assert!(xml.contains(r#"<error type="RuntimeError" message="boom">"#));
    assert!(!xml.contains("<failure"));

    let mut read_back = TestSuite::from_xml(&xml).expect("reading testsuite succeeds");
    read_back.recount();
    assert_eq!((read_back.failures, read_back.errors), (0, 1));
    assert_eq!(read_back, testsuite);
}

#[test]
fn reads_loosely_formatted_summary() {
    // Documents written by other tools may be laid out differently and carry extra elements.
    let xml = indoc! {r#"
        <?xml version='1.0' encoding='UTF-8'?>
        <result>
        <suites>
        <suite>
        <file>/tmp/report/Foo-Bar.xml</file>
        <name>Foo__Bar</name>
        <stdout>
        </stdout>
        <stderr></stderr>
        <duration>0.5</duration>
        <cases>
        <case>
        <duration>0.5</duration>
        <className>Foo::Bar</className>
        <testName>Foo::Bar works</testName>
        <skipped>false</skipped>
        <errorStackTrace>boom</errorStackTrace>
        <errorDetails>boom</errorDetails>
        <rerunCommand>rspec ./spec/foo_spec.rb:3 # Foo::Bar works</rerunCommand>
        <failedSince>0</failedSince>
        <somethingElse>ignored</somethingElse>
        </case>
        </cases>
        </suite>
        </suites>
        <duration>0.5</duration>
        <keepLongStdio>false</keepLongStdio>
        </result>
    "#};

    let report = SummaryReport::from_xml(xml).expect("reading summary succeeds");
    assert_eq!(report.suites.len(), 1);
    let suite = &report.suites[0];
    assert_eq!(suite.name, "Foo__Bar");
    assert_eq!(suite.stdout, "\n");
    assert_eq!(suite.duration, Duration::from_millis(500));

    let failed: Vec<_> = report.failed_cases().collect();
    assert_eq!(failed.len(), 1);
    let error = failed[0].error.as_ref().expect("case has an error");
    assert_eq!(
        error.rerun_command,
        "rspec ./spec/foo_spec.rb:3 # Foo::Bar works"
    );
    assert_eq!(report.duration, Some(Duration::from_millis(500)));
    assert_eq!(report.keep_long_stdio, Some(false));
}

#[test]
fn rejects_failed_case_without_rerun_command() {
    let xml = indoc! {r#"
        <result><suites><suite><name>Foo</name><cases>
          <case>
            <testName>Foo works</testName>
            <errorDetails>boom</errorDetails>
          </case>
        </cases></suite></suites></result>
    "#};

    let error = SummaryReport::from_xml(xml).expect_err("missing rerun command is rejected");
    assert!(
        matches!(&error, DeserializeError::MissingRerunCommand { test_name } if test_name == "Foo works"),
        "unexpected error: {error:?}"
    );
}

#[test]
fn rejects_wrong_root_and_truncated_input() {
    let error = SummaryReport::from_xml("<testsuite name=\"Foo\"></testsuite>")
        .expect_err("wrong root is rejected");
    assert!(matches!(
        error,
        DeserializeError::UnexpectedRoot {
            expected: "result",
            ..
        }
    ));

    TestSuite::from_xml("<testsuite name=\"Foo\"><testcase name=\"a\">")
        .expect_err("truncated input is rejected");
    TestSuite::from_xml("").expect_err("empty input is rejected");
}

#[test]
fn rejects_invalid_durations() {
    let error = TestSuite::from_xml(r#"<testsuite name="Foo" time="-1"></testsuite>"#)
        .expect_err("negative duration is rejected");
    assert!(matches!(
        error,
        DeserializeError::InvalidValue { field: "time", .. }
    ));
}
