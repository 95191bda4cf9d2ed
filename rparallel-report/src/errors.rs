// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// An error that occurs while serializing a report.
///
/// Returned by [`SummaryReport::serialize`](crate::SummaryReport::serialize) and
/// [`TestSuite::serialize`](crate::TestSuite::serialize).
#[derive(Debug, Error)]
#[error("error serializing report")]
pub struct SerializeError {
    #[from]
    inner: quick_xml::Error,
}

/// An error that occurs while reading a report back from XML.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeserializeError {
    /// The input is not well-formed XML.
    #[error("invalid XML")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be decoded.
    #[error("invalid XML attribute")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// The document ended before the root element was closed.
    #[error("unexpected end of document")]
    UnexpectedEof,

    /// The root element has an unexpected name.
    #[error("expected root element `{expected}`, found `{found}`")]
    UnexpectedRoot {
        /// The root element name that was expected.
        expected: &'static str,
        /// The root element name that was found.
        found: String,
    },

    /// A required child element is missing.
    #[error("element `{parent}` is missing required child `{child}`")]
    MissingElement {
        /// The parent element name.
        parent: &'static str,
        /// The name of the missing child.
        child: &'static str,
    },

    /// A required attribute is missing.
    #[error("element `{element}` is missing required attribute `{attribute}`")]
    MissingAttribute {
        /// The element name.
        element: &'static str,
        /// The name of the missing attribute.
        attribute: &'static str,
    },

    /// A value could not be parsed.
    #[error("invalid value `{value}` for `{field}`: {reason}")]
    InvalidValue {
        /// The element or attribute the value was read from.
        field: &'static str,
        /// The raw value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A failed case carries error details but no command to rerun it with.
    #[error("failed case `{test_name}` has no rerun command")]
    MissingRerunCommand {
        /// The name of the failed case.
        test_name: String,
    },
}
