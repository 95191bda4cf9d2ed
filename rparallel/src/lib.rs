// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs RSpec examples in parallel, one runner process per example, and keeps a JUnit-style report
//! across reruns and longevity iterations.
//!
//! The core lives in the `rparallel-runner` crate; this crate is the command-line front end.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
