// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Generate and read the XML reports written by rparallel.
//!
//! Two document kinds are supported:
//!
//! * the **summary** document ([`SummaryReport`]), a `result/suites/suite/cases/case` tree with
//!   one suite per group, plus a top-level duration and `keepLongStdio` flag;
//! * the **group** document ([`TestSuite`]), a standard `testsuite/testcase` JUnit file with one
//!   testcase per executed example.
//!
//! Both can be serialized and read back. Reading is lossless for everything that the serializer
//! writes, so a document can be loaded, patched and written out again without disturbing the
//! entries that were not touched.

mod deserialize;
mod errors;
mod report;
mod serialize;

pub use errors::*;
pub use report::*;
