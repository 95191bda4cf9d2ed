// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by rparallel.

use camino::Utf8PathBuf;
use config::ConfigError;
use rparallel_report::{DeserializeError, SerializeError};
use std::io;
use thiserror::Error;

/// An error that occurred while reading the profile configuration.
#[derive(Debug, Error)]
#[error("failed to parse rparallel config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigReadError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigReadError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// A run configuration was rejected before any work was started.
///
/// This is an expected outcome rather than a failure: the `Display` output is the status message
/// returned to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// The thread count is outside `1..=max`.
    #[error("thread count must be between 1 and {max} (got {requested})")]
    InvalidThreadCount {
        /// The thread count that was asked for.
        requested: usize,

        /// The maximum thread count allowed.
        max: usize,
    },

    /// The pattern filter is not a valid regular expression.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// The pattern as provided.
        pattern: String,

        /// Why the pattern couldn't be compiled.
        message: String,
    },

    /// A per-worker environment entry isn't of the form `KEY=VALUE`.
    #[error("invalid environment entry `{entry}` for worker {worker} (expected KEY=VALUE)")]
    InvalidWorkerEnv {
        /// The index of the worker the entry belongs to.
        worker: usize,

        /// The entry as provided.
        entry: String,
    },

    /// The runner command is empty or can't be split into words.
    #[error("invalid runner command `{command}`")]
    InvalidRunnerCommand {
        /// The command as provided.
        command: String,
    },
}

/// An error that occurred while scanning the case folder for examples.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// The case folder couldn't be walked.
    #[error("error walking case folder `{folder}`")]
    Walk {
        /// The folder being walked.
        folder: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// A path in the case folder isn't valid UTF-8.
    #[error("path in case folder is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// The lossy form of the path.
        path: String,
    },

    /// A spec file couldn't be read.
    #[error("error reading spec file `{path}`")]
    Read {
        /// The RSpec file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

/// An error that occurred while reading a prior report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportReadError {
    /// The report file doesn't exist or couldn't be read.
    #[error("can't read prior report at `{path}`")]
    Read {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The report file isn't in the expected format.
    #[error("invalid format of prior report at `{path}`")]
    Parse {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: DeserializeError,
    },

    /// The report folder couldn't be listed while looking for earlier reruns.
    #[error("error listing report folder `{folder}`")]
    ListFolder {
        /// The report folder.
        folder: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

/// An error that occurred while writing a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportWriteError {
    /// The report folder couldn't be created.
    #[error("error creating report folder `{folder}`")]
    CreateFolder {
        /// The report folder.
        folder: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A report couldn't be serialized.
    #[error("error serializing report for `{path}`")]
    Serialize {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: SerializeError,
    },

    /// A report file couldn't be written out.
    #[error("error writing report to `{path}`")]
    Write {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: atomicwrites::Error<io::Error>,
    },
}

/// An error that occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] ctrlc::Error);

/// A fatal error that stopped a run.
///
/// Expected negative outcomes, like an invalid configuration or an empty selection, are reported
/// through [`RunOutcome`](crate::engine::RunOutcome) instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The case folder couldn't be scanned.
    #[error("error listing examples")]
    Catalog(#[from] CatalogError),

    /// A prior report needed for this run is missing or corrupt.
    #[error("error reading the result of the last run")]
    ReportRead(#[from] ReportReadError),

    /// A report couldn't be written.
    #[error("error writing reports")]
    ReportWrite(#[from] ReportWriteError),

    /// The signal handler couldn't be installed.
    #[error(transparent)]
    SignalHandler(#[from] SignalHandlerSetupError),

    /// A worker thread couldn't be spawned.
    #[error("error spawning worker thread {index}")]
    SpawnWorker {
        /// The index of the worker.
        index: usize,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The rerun script couldn't be written.
    #[error("error writing rerun script to `{path}`")]
    WriteRerunScript {
        /// The script path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}
