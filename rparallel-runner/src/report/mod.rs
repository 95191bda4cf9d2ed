// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building, merging and persisting run reports.
//!
//! A report folder holds a summary document (`junitResult.xml`) and one JUnit document per group.
//! The two are always written together through a [`ReportSet`]:
//!
//! * [`ReportSet::build`] creates a fresh set from the results of a run.
//! * [`ReportSet::patch`] refreshes the failed entries of a loaded set in place.
//! * [`ReportSet::append`] adds the cases of another longevity iteration to a loaded set.

mod folder;
mod merge;

pub use folder::*;
pub use merge::*;

use crate::errors::{ReportReadError, ReportWriteError};
use atomicwrites::{AllowOverwrite, AtomicFile};
use camino::Utf8Path;
use rparallel_report::{DeserializeError, SerializeError, SummaryReport, TestSuite};
use std::{collections::BTreeMap, fs, io::Write, time::Duration};
use tracing::debug;

/// The file name of the summary document.
pub static SUMMARY_FILE_NAME: &str = "junitResult.xml";

/// How a run's results are combined with earlier reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReportMode {
    /// Write a new report, ignoring anything already there.
    Create,

    /// Refresh the failed entries of the existing report with the results of a rerun.
    Update,

    /// Add the results of another longevity iteration to the existing report.
    Append,
}

impl ReportMode {
    /// Chooses the mode for a run.
    pub fn select(rerun: bool, single_report: bool, longevity_index: usize) -> Self {
        if rerun && single_report {
            ReportMode::Update
        } else if longevity_index > 1 && single_report {
            ReportMode::Append
        } else {
            ReportMode::Create
        }
    }
}

/// A summary document along with the group documents it refers to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportSet {
    /// The summary document.
    pub summary: SummaryReport,

    /// Group documents, keyed by file name within the report folder.
    pub groups: BTreeMap<String, TestSuite>,
}

impl ReportSet {
    /// Reads the summary document in `folder`, and every group document it refers to.
    ///
    /// A group document that's missing is an error: the set would be inconsistent without it.
    pub fn load(folder: &Utf8Path) -> Result<Self, ReportReadError> {
        let summary = read_summary(folder)?;

        let mut groups = BTreeMap::new();
        for suite in &summary.suites {
            let file_name = group_file_name_of(&suite.file);
            if groups.contains_key(&file_name) {
                continue;
            }
            let path = folder.join(&file_name);
            let group = read_report(&path, TestSuite::from_xml)?;
            groups.insert(file_name, group);
        }

        debug!("loaded report from {folder} with {} groups", groups.len());
        Ok(Self { summary, groups })
    }

    /// Writes the run duration and the `keepLongStdio` marker.
    pub fn finish(&mut self, elapsed: Duration) -> &mut Self {
        self.summary.set_footer(elapsed, false);
        self
    }

    /// Writes the summary and group documents into `folder`, creating it if necessary.
    pub fn persist(&self, folder: &Utf8Path) -> Result<(), ReportWriteError> {
        fs::create_dir_all(folder).map_err(|err| ReportWriteError::CreateFolder {
            folder: folder.to_owned(),
            err,
        })?;

        write_report(&folder.join(SUMMARY_FILE_NAME), self.summary.to_string())?;
        for (file_name, group) in &self.groups {
            write_report(&folder.join(file_name), group.to_string())?;
        }

        debug!("wrote report to {folder} with {} groups", self.groups.len());
        Ok(())
    }
}

/// Reads the summary document in `folder`.
pub fn read_summary(folder: &Utf8Path) -> Result<SummaryReport, ReportReadError> {
    read_report(&folder.join(SUMMARY_FILE_NAME), SummaryReport::from_xml)
}

/// The file name component of a suite's `file` entry.
///
/// Older reports record an absolute path; only the name within the report folder matters.
fn group_file_name_of(file: &str) -> String {
    Utf8Path::new(file)
        .file_name()
        .unwrap_or(file)
        .to_owned()
}

fn read_report<T>(
    path: &Utf8Path,
    parse: impl FnOnce(&str) -> Result<T, DeserializeError>,
) -> Result<T, ReportReadError> {
    let contents = fs::read_to_string(path).map_err(|err| ReportReadError::Read {
        path: path.to_owned(),
        err,
    })?;
    parse(&contents).map_err(|err| ReportReadError::Parse {
        path: path.to_owned(),
        err,
    })
}

fn write_report(
    path: &Utf8Path,
    xml: Result<String, SerializeError>,
) -> Result<(), ReportWriteError> {
    let xml = xml.map_err(|err| ReportWriteError::Serialize {
        path: path.to_owned(),
        err,
    })?;
    AtomicFile::new(path, AllowOverwrite)
        .write(|file| file.write_all(xml.as_bytes()))
        .map_err(|err| ReportWriteError::Write {
            path: path.to_owned(),
            err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(false, false, 0, ReportMode::Create; "fresh")]
    #[test_case(true, false, 0, ReportMode::Create; "rerun into new folder")]
    #[test_case(true, true, 0, ReportMode::Update; "rerun single report")]
    #[test_case(true, true, 3, ReportMode::Update; "rerun wins over longevity")]
    #[test_case(false, true, 1, ReportMode::Create; "first longevity iteration")]
    #[test_case(false, true, 2, ReportMode::Append; "later longevity iteration")]
    #[test_case(false, false, 2, ReportMode::Create; "longevity without single report")]
    fn select_mode(rerun: bool, single_report: bool, longevity_index: usize, expected: ReportMode) {
        assert_eq!(
            ReportMode::select(rerun, single_report, longevity_index),
            expected
        );
    }

    #[test_case("/tmp/report/Foo-Bar.xml", "Foo-Bar.xml"; "absolute")]
    #[test_case("Foo.xml", "Foo.xml"; "bare")]
    fn group_file_name(file: &str, expected: &str) {
        assert_eq!(group_file_name_of(file), expected);
    }
}
