// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use rparallel_runner::errors::{ConfigReadError, RunError};
use std::error::Error;
use thiserror::Error;

/// Documented exit codes for `rparallel`.
///
/// Unknown and unexpected failures result in exit code 1.
pub enum RparallelExitCode {}

impl RparallelExitCode {
    /// No errors occurred, or no examples were selected.
    pub const OK: i32 = 0;

    /// A fatal error stopped the run.
    pub const RUN_ERROR: i32 = 1;

    /// The configuration was invalid or couldn't be read.
    pub const INVALID_CONFIG: i32 = 2;

    /// One or more examples failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The run was interrupted before every example ran.
    pub const INCOMPLETE_RUN: i32 = 106;
}

/// An error that stops `rparallel` with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config read error")]
    ConfigRead {
        #[from]
        err: ConfigReadError,
    },
    #[error("run error")]
    Run {
        #[from]
        err: RunError,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigRead { .. } => RparallelExitCode::INVALID_CONFIG,
            Self::Run { .. } => RparallelExitCode::RUN_ERROR,
        }
    }

    /// Displays this error to stderr, followed by its chain of causes.
    pub fn display_to_stderr(&self) {
        let mut next_error = match self {
            Self::ConfigRead { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::Run { err } => {
                tracing::error!("{err}");
                err.source()
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: "rparallel::caused_by", "caused by: {err}");
            next_error = err.source();
        }
    }
}
