// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locating report folders on disk and reading back the failures of the last run.

use super::SUMMARY_FILE_NAME;
use crate::{catalog::Task, errors::ReportReadError};
use camino::{Utf8Path, Utf8PathBuf};
use rparallel_report::SummaryReport;
use std::{collections::HashSet, fs, io};

/// The prefix of the numbered folders that hold the reports of earlier reruns.
pub static RERUN_FOLDER_PREFIX: &str = "rerun";

/// Returns the highest rerun number found in `base`, or 0 if there are none.
///
/// Only folders named `rerun` followed by a number count. A missing `base` has no reruns.
pub fn latest_rerun(base: &Utf8Path) -> Result<usize, ReportReadError> {
    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(ReportReadError::ListFolder {
                folder: base.to_owned(),
                err,
            });
        }
    };

    let mut latest = 0;
    for entry in entries {
        let entry = entry.map_err(|err| ReportReadError::ListFolder {
            folder: base.to_owned(),
            err,
        })?;
        let name = entry.file_name();
        let Some(number) = name
            .to_str()
            .and_then(|name| name.strip_prefix(RERUN_FOLDER_PREFIX))
            .and_then(|suffix| suffix.parse::<usize>().ok())
        else {
            continue;
        };
        if entry.path().is_dir() {
            latest = latest.max(number);
        }
    }
    Ok(latest)
}

/// Returns the folder the next rerun writes its report into: `base/rerun{N+1}`.
pub fn next_report_folder(base: &Utf8Path) -> Result<Utf8PathBuf, ReportReadError> {
    let next = latest_rerun(base)? + 1;
    Ok(base.join(format!("{RERUN_FOLDER_PREFIX}{next}")))
}

/// Returns the folder holding the most recent report.
///
/// With a single report that's always `base`. Otherwise it's the latest rerun folder, or `base`
/// if nothing was rerun yet.
pub fn last_report_folder(
    base: &Utf8Path,
    single_report: bool,
) -> Result<Utf8PathBuf, ReportReadError> {
    if single_report {
        return Ok(base.to_owned());
    }
    match latest_rerun(base)? {
        0 => Ok(base.to_owned()),
        latest => Ok(base.join(format!("{RERUN_FOLDER_PREFIX}{latest}"))),
    }
}

/// Returns the summary document of the most recent report.
pub fn last_report_file(
    base: &Utf8Path,
    single_report: bool,
) -> Result<Utf8PathBuf, ReportReadError> {
    Ok(last_report_folder(base, single_report)?.join(SUMMARY_FILE_NAME))
}

/// Turns every failed case of `summary` into a task that reruns it.
///
/// The identifier is the rerun command without its trailing `# comment` and without
/// `rerun_prefix`. Repeated identifiers are only listed once.
pub fn failed_tasks(summary: &SummaryReport, rerun_prefix: &str) -> Vec<Task> {
    let mut seen = HashSet::new();
    summary
        .failed_cases()
        .filter_map(|case| case.error.as_ref())
        .filter_map(|error| {
            let command = error.rerun_command.split('#').next().unwrap_or_default().trim();
            let prefix = rerun_prefix.trim();
            let identifier = command.strip_prefix(prefix).unwrap_or(command).trim();
            (!identifier.is_empty() && seen.insert(identifier.to_owned()))
                .then(|| Task::new(identifier))
        })
        .collect()
}
