// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for rparallel, a parallel runner for RSpec examples.
//!
//! A run goes through these stages:
//!
//! 1. A [`TaskCatalog`](catalog::TaskCatalog) lists the examples, which are filtered and ordered
//!    by [`test_filter`].
//! 2. The [`runner`] hands them out to a pool of workers, each invoking the external runner once
//!    per example and parsing its output with the [`transcript`] parser.
//! 3. The results are merged into the report folder by [`report`].
//!
//! [`engine::run_tests`] drives all of this.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod signal;
mod stopwatch;
pub mod test_filter;
pub mod transcript;
