// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialize a `SummaryReport` or a `TestSuite`.

use crate::{
    CaseError, NonSuccessKind, SummaryCase, SummaryReport, SummarySuite, TestCase,
    TestCaseStatus, TestFailure, TestSuite,
};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::{io, time::Duration};

pub(crate) static RESULT_TAG: &str = "result";
pub(crate) static SUITES_TAG: &str = "suites";
pub(crate) static SUITE_TAG: &str = "suite";
pub(crate) static FILE_TAG: &str = "file";
pub(crate) static NAME_TAG: &str = "name";
pub(crate) static STDOUT_TAG: &str = "stdout";
pub(crate) static STDERR_TAG: &str = "stderr";
pub(crate) static DURATION_TAG: &str = "duration";
pub(crate) static CASES_TAG: &str = "cases";
pub(crate) static CASE_TAG: &str = "case";
pub(crate) static CLASS_NAME_TAG: &str = "className";
pub(crate) static TEST_NAME_TAG: &str = "testName";
pub(crate) static SKIPPED_TAG: &str = "skipped";
pub(crate) static ERROR_STACK_TRACE_TAG: &str = "errorStackTrace";
pub(crate) static ERROR_DETAILS_TAG: &str = "errorDetails";
pub(crate) static RERUN_COMMAND_TAG: &str = "rerunCommand";
pub(crate) static FAILED_SINCE_TAG: &str = "failedSince";
pub(crate) static KEEP_LONG_STDIO_TAG: &str = "keepLongStdio";

pub(crate) static TESTSUITE_TAG: &str = "testsuite";
pub(crate) static TESTCASE_TAG: &str = "testcase";
pub(crate) static FAILURE_TAG: &str = "failure";
pub(crate) static ERROR_TAG: &str = "error";
pub(crate) static SYSTEM_OUT_TAG: &str = "system-out";
pub(crate) static SYSTEM_ERR_TAG: &str = "system-err";

pub(crate) fn serialize_summary(
    report: &SummaryReport,
    writer: impl io::Write,
) -> quick_xml::Result<()> {
    let mut writer = Writer::new_with_indent(writer, b' ', 2);

    let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
    writer.write_event(Event::Decl(decl))?;

    // Use the destructuring syntax to ensure that all fields are handled.
    let SummaryReport {
        suites,
        duration,
        keep_long_stdio,
    } = report;

    serialize_empty_start_tag(RESULT_TAG, &mut writer)?;
    serialize_empty_start_tag(SUITES_TAG, &mut writer)?;
    for suite in suites {
        serialize_summary_suite(suite, &mut writer)?;
    }
    serialize_end_tag(SUITES_TAG, &mut writer)?;

    if let Some(duration) = duration {
        serialize_text_element(DURATION_TAG, &serialize_time(duration), &mut writer)?;
    }
    if let Some(keep_long_stdio) = keep_long_stdio {
        serialize_text_element(
            KEEP_LONG_STDIO_TAG,
            &keep_long_stdio.to_string(),
            &mut writer,
        )?;
    }
    serialize_end_tag(RESULT_TAG, &mut writer)?;

    // Add a trailing newline.
    writer.write_indent()
}

fn serialize_summary_suite(
    suite: &SummarySuite,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    let SummarySuite {
        file,
        name,
        stdout,
        stderr,
        duration,
        cases,
    } = suite;

    serialize_empty_start_tag(SUITE_TAG, writer)?;
    serialize_text_element(FILE_TAG, file, writer)?;
    serialize_text_element(NAME_TAG, name, writer)?;
    serialize_text_element(STDOUT_TAG, stdout, writer)?;
    serialize_text_element(STDERR_TAG, stderr, writer)?;
    serialize_text_element(DURATION_TAG, &serialize_time(duration), writer)?;

    serialize_empty_start_tag(CASES_TAG, writer)?;
    for case in cases {
        serialize_summary_case(case, writer)?;
    }
    serialize_end_tag(CASES_TAG, writer)?;

    serialize_end_tag(SUITE_TAG, writer)
}

fn serialize_summary_case(
    case: &SummaryCase,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    let SummaryCase {
        duration,
        class_name,
        test_name,
        skipped,
        error,
        failed_since,
    } = case;

    serialize_empty_start_tag(CASE_TAG, writer)?;
    serialize_text_element(DURATION_TAG, &serialize_time(duration), writer)?;
    serialize_text_element(CLASS_NAME_TAG, class_name, writer)?;
    serialize_text_element(TEST_NAME_TAG, test_name, writer)?;
    serialize_text_element(SKIPPED_TAG, &skipped.to_string(), writer)?;
    if let Some(CaseError {
        stack_trace,
        details,
        rerun_command,
    }) = error
    {
        serialize_text_element(ERROR_STACK_TRACE_TAG, stack_trace, writer)?;
        serialize_text_element(ERROR_DETAILS_TAG, details, writer)?;
        serialize_text_element(RERUN_COMMAND_TAG, rerun_command, writer)?;
    }
    serialize_text_element(FAILED_SINCE_TAG, &failed_since.to_string(), writer)?;
    serialize_end_tag(CASE_TAG, writer)
}

pub(crate) fn serialize_test_suite(
    testsuite: &TestSuite,
    writer: impl io::Write,
) -> quick_xml::Result<()> {
    let mut writer = Writer::new_with_indent(writer, b' ', 2);

    let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
    writer.write_event(Event::Decl(decl))?;

    let TestSuite {
        name,
        tests,
        time,
        failures,
        errors,
        skipped,
        testcases,
        system_out,
        system_err,
    } = testsuite;

    let mut testsuite_tag = BytesStart::new(TESTSUITE_TAG);
    testsuite_tag.extend_attributes([
        ("name", name.as_str()),
        ("tests", tests.to_string().as_str()),
        ("time", serialize_time(time).as_str()),
        ("failures", failures.to_string().as_str()),
        ("errors", errors.to_string().as_str()),
        ("skipped", skipped.to_string().as_str()),
    ]);
    writer.write_event(Event::Start(testsuite_tag))?;

    for testcase in testcases {
        serialize_testcase(testcase, &mut writer)?;
    }

    if let Some(system_out) = system_out {
        serialize_text_element(SYSTEM_OUT_TAG, system_out, &mut writer)?;
    }
    if let Some(system_err) = system_err {
        serialize_text_element(SYSTEM_ERR_TAG, system_err, &mut writer)?;
    }

    serialize_end_tag(TESTSUITE_TAG, &mut writer)?;
    writer.write_indent()
}

fn serialize_testcase(
    testcase: &TestCase,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    let TestCase { name, time, status } = testcase;

    let mut testcase_tag = BytesStart::new(TESTCASE_TAG);
    testcase_tag.extend_attributes([
        ("name", name.as_str()),
        ("time", serialize_time(time).as_str()),
    ]);

    match status {
        TestCaseStatus::Success => writer.write_event(Event::Empty(testcase_tag)),
        TestCaseStatus::Skipped => {
            writer.write_event(Event::Start(testcase_tag))?;
            writer.write_event(Event::Empty(BytesStart::new(SKIPPED_TAG)))?;
            serialize_end_tag(TESTCASE_TAG, writer)
        }
        TestCaseStatus::Failure(TestFailure {
            kind,
            ty,
            message,
            description,
            rerun_command,
        }) => {
            writer.write_event(Event::Start(testcase_tag))?;

            let tag_name = match kind {
                NonSuccessKind::Failure => FAILURE_TAG,
                NonSuccessKind::Error => ERROR_TAG,
            };
            let mut failure_tag = BytesStart::new(tag_name);
            failure_tag.extend_attributes([("type", ty.as_str()), ("message", message.as_str())]);
            writer.write_event(Event::Start(failure_tag))?;
            writer.write_event(Event::Text(BytesText::new(description)))?;
            serialize_end_tag(tag_name, writer)?;

            serialize_text_element(RERUN_COMMAND_TAG, rerun_command, writer)?;
            serialize_end_tag(TESTCASE_TAG, writer)
        }
    }
}

/// Writes `<tag>text</tag>`, keeping the text on the same line as the tags even when it is empty.
fn serialize_text_element(
    tag_name: &'static str,
    text: &str,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    serialize_empty_start_tag(tag_name, writer)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    serialize_end_tag(tag_name, writer)
}

fn serialize_empty_start_tag(
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag_name)))
}

fn serialize_end_tag(
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag_name)))
}

// Serialize time as seconds with 3 decimal points.
pub(crate) fn serialize_time(time: &Duration) -> String {
    format!("{:.3}", time.as_secs_f64())
}
