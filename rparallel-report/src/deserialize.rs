// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read a `SummaryReport` or a `TestSuite` back from XML.
//!
//! The input is first read into a small element tree, then mapped onto the typed model. Text is
//! kept exactly as written (no trimming), so that entries survive a load and store unchanged.
//! Whitespace between container elements is ignored, as are unknown elements.

use crate::{
    CaseError, DeserializeError, NonSuccessKind, SummaryCase, SummaryReport, SummarySuite,
    TestCase, TestCaseStatus, TestFailure, TestSuite,
    serialize::{
        CASE_TAG, CASES_TAG, CLASS_NAME_TAG, DURATION_TAG, ERROR_DETAILS_TAG,
        ERROR_STACK_TRACE_TAG, ERROR_TAG, FAILED_SINCE_TAG, FAILURE_TAG, FILE_TAG, KEEP_LONG_STDIO_TAG,
        NAME_TAG, RERUN_COMMAND_TAG, RESULT_TAG, SKIPPED_TAG, STDERR_TAG, STDOUT_TAG, SUITE_TAG,
        SUITES_TAG, SYSTEM_ERR_TAG, SYSTEM_OUT_TAG, TEST_NAME_TAG, TESTCASE_TAG, TESTSUITE_TAG,
    },
};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::time::Duration;

pub(crate) fn deserialize_summary(input: &str) -> Result<SummaryReport, DeserializeError> {
    let root = read_root(input, RESULT_TAG)?;

    let mut report = SummaryReport::new();
    if let Some(suites) = root.child(SUITES_TAG) {
        for suite in suites.children_named(SUITE_TAG) {
            report.add_suite(summary_suite(suite)?);
        }
    }
    report.duration = root
        .child(DURATION_TAG)
        .map(|duration| parse_duration(DURATION_TAG, &duration.text()))
        .transpose()?;
    report.keep_long_stdio = root
        .child(KEEP_LONG_STDIO_TAG)
        .map(|keep| parse_bool(KEEP_LONG_STDIO_TAG, &keep.text()))
        .transpose()?;

    Ok(report)
}

fn summary_suite(element: &Element) -> Result<SummarySuite, DeserializeError> {
    let name = element.required_text(SUITE_TAG, NAME_TAG)?;
    let file = element.optional_text(FILE_TAG).unwrap_or_default();

    let mut suite = SummarySuite::new(name, file);
    suite.stdout = element.optional_text(STDOUT_TAG).unwrap_or_default();
    suite.stderr = element.optional_text(STDERR_TAG).unwrap_or_default();

    if let Some(cases) = element.child(CASES_TAG) {
        for case in cases.children_named(CASE_TAG) {
            suite.cases.push(summary_case(case)?);
        }
    }
    suite.duration = match element.optional_text(DURATION_TAG) {
        Some(duration) => parse_duration(DURATION_TAG, &duration)?,
        None => suite.cases.iter().map(|case| case.duration).sum(),
    };

    Ok(suite)
}

fn summary_case(element: &Element) -> Result<SummaryCase, DeserializeError> {
    let test_name = element.required_text(CASE_TAG, TEST_NAME_TAG)?;
    let class_name = element.optional_text(CLASS_NAME_TAG).unwrap_or_default();
    let duration = match element.optional_text(DURATION_TAG) {
        Some(duration) => parse_duration(DURATION_TAG, &duration)?,
        None => Duration::ZERO,
    };

    let mut case = SummaryCase::new(class_name, test_name, duration);
    case.skipped = element
        .optional_text(SKIPPED_TAG)
        .map(|skipped| parse_bool(SKIPPED_TAG, &skipped))
        .transpose()?
        .unwrap_or(false);
    case.failed_since = element
        .optional_text(FAILED_SINCE_TAG)
        .map(|failed_since| {
            failed_since
                .trim()
                .parse::<u64>()
                .map_err(|error| invalid_value(FAILED_SINCE_TAG, &failed_since, error))
        })
        .transpose()?
        .unwrap_or(0);

    if let Some(details) = element.optional_text(ERROR_DETAILS_TAG) {
        let rerun_command = element
            .optional_text(RERUN_COMMAND_TAG)
            .filter(|command| !command.trim().is_empty())
            .ok_or_else(|| DeserializeError::MissingRerunCommand {
                test_name: case.test_name.clone(),
            })?;
        case.error = Some(CaseError {
            stack_trace: element
                .optional_text(ERROR_STACK_TRACE_TAG)
                .unwrap_or_default(),
            details,
            rerun_command,
        });
    }

    Ok(case)
}

pub(crate) fn deserialize_test_suite(input: &str) -> Result<TestSuite, DeserializeError> {
    let root = read_root(input, TESTSUITE_TAG)?;

    let name = root.required_attribute(TESTSUITE_TAG, "name")?;
    let mut testsuite = TestSuite::new(name);
    for testcase in root.children_named(TESTCASE_TAG) {
        testsuite.add_testcase(testcase_from(testcase)?);
    }
    testsuite.system_out = root.optional_text(SYSTEM_OUT_TAG);
    testsuite.system_err = root.optional_text(SYSTEM_ERR_TAG);

    // Prefer the recorded time if there is one: it's what was last written out.
    if let Some(time) = root.attribute("time") {
        testsuite.time = parse_duration("time", time)?;
    }

    Ok(testsuite)
}

fn testcase_from(element: &Element) -> Result<TestCase, DeserializeError> {
    let name = element.required_attribute(TESTCASE_TAG, "name")?;
    let time = match element.attribute("time") {
        Some(time) => parse_duration("time", time)?,
        None => Duration::ZERO,
    };

    let failure = element
        .child(FAILURE_TAG)
        .map(|failure| (NonSuccessKind::Failure, failure))
        .or_else(|| {
            element
                .child(ERROR_TAG)
                .map(|error| (NonSuccessKind::Error, error))
        });

    let status = if let Some((kind, failure)) = failure {
        let rerun_command = element
            .optional_text(RERUN_COMMAND_TAG)
            .filter(|command| !command.trim().is_empty())
            .ok_or_else(|| DeserializeError::MissingRerunCommand {
                test_name: name.to_owned(),
            })?;
        TestCaseStatus::Failure(TestFailure {
            kind,
            ty: failure.attribute("type").unwrap_or_default().to_owned(),
            message: failure.attribute("message").unwrap_or_default().to_owned(),
            description: failure.text(),
            rerun_command,
        })
    } else if element.child(SKIPPED_TAG).is_some() {
        TestCaseStatus::Skipped
    } else {
        TestCaseStatus::Success
    };

    Ok(TestCase::new(name, time, status))
}

// ---
// Element tree
// ---

#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, DeserializeError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required_attribute(
        &self,
        element: &'static str,
        attribute: &'static str,
    ) -> Result<&str, DeserializeError> {
        self.attribute(attribute)
            .ok_or(DeserializeError::MissingAttribute { element, attribute })
    }

    fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter_map(move |node| match node {
            Node::Element(element) if element.name == name => Some(element),
            _ => None,
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    /// The concatenated text content of this element, excluding nested elements.
    fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    fn optional_text(&self, child: &str) -> Option<String> {
        self.child(child).map(Element::text)
    }

    fn required_text(
        &self,
        parent: &'static str,
        child: &'static str,
    ) -> Result<String, DeserializeError> {
        self.optional_text(child)
            .ok_or(DeserializeError::MissingElement { parent, child })
    }
}

fn read_root(input: &str, expected: &'static str) -> Result<Element, DeserializeError> {
    let root = read_tree(input)?;
    if root.name != expected {
        return Err(DeserializeError::UnexpectedRoot {
            expected,
            found: root.name,
        });
    }
    Ok(root)
}

fn read_tree(input: &str) -> Result<Element, DeserializeError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let completed = match reader.read_event()? {
            Event::Start(start) => {
                stack.push(Element::from_start(&start)?);
                None
            }
            Event::Empty(start) => Some(Element::from_start(&start)?),
            Event::End(_) => Some(stack.pop().ok_or(DeserializeError::UnexpectedEof)?),
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::Text(text.unescape()?.into_owned()));
                }
                None
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    parent.children.push(Node::Text(text));
                }
                None
            }
            Event::Eof => return Err(DeserializeError::UnexpectedEof),
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => None,
        };

        if let Some(element) = completed {
            match stack.last_mut() {
                Some(parent) => parent.children.push(Node::Element(element)),
                // The root element is complete.
                None => return Ok(element),
            }
        }
    }
}

// ---
// Value parsing
// ---

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, DeserializeError> {
    let seconds = value
        .trim()
        .parse::<f64>()
        .map_err(|error| invalid_value(field, value, error))?;
    let duration =
        Duration::try_from_secs_f64(seconds).map_err(|error| invalid_value(field, value, error))?;
    // Times are written with millisecond precision: snap to whole microseconds so that float
    // rounding doesn't leak into the model.
    let micros = (duration.as_secs_f64() * 1_000_000.0).round() as u64;
    Ok(Duration::from_micros(micros))
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, DeserializeError> {
    value
        .trim()
        .parse::<bool>()
        .map_err(|error| invalid_value(field, value, error))
}

fn invalid_value(
    field: &'static str,
    value: &str,
    reason: impl std::fmt::Display,
) -> DeserializeError {
    DeserializeError::InvalidValue {
        field,
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}
