// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery of the examples to run.
//!
//! A [`TaskCatalog`] produces an ordered list of [`Task`]s. The main implementation,
//! [`SpecFileCatalog`], scans a folder of RSpec files and emits one task per example, identified by
//! `path:line` so that each one can be run in isolation.

use crate::errors::CatalogError;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    sync::LazyLock,
};
use tracing::debug;
use walkdir::WalkDir;

/// The suffix shared by all RSpec files.
pub static SPEC_FILE_SUFFIX: &str = "_spec.rb";

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,\s]:(\w+)").expect("regex is valid"));
static EXAMPLE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*it\s*(["'])"#).expect("regex is valid"));
static ONE_LINER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*it\s*\{").expect("regex is valid"));
static DESCRIBE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(RSpec\.)?describe\s").expect("regex is valid"));

/// A single dispatchable unit of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// The location of the example, runnable in isolation (typically `path:line`).
    pub identifier: String,

    /// The tags attached to the example.
    pub tags: BTreeSet<String>,

    /// Extra environment variables for this task, applied over the worker's environment.
    pub env_overrides: BTreeMap<String, String>,
}

impl Task {
    /// Creates a new task with no tags and no environment overrides.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            tags: BTreeSet::new(),
            env_overrides: BTreeMap::new(),
        }
    }

    /// Adds tags to this task.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// A source of tasks.
pub trait TaskCatalog {
    /// Returns all known tasks, in a stable order.
    fn tasks(&self) -> Result<Vec<Task>, CatalogError>;
}

impl TaskCatalog for Vec<Task> {
    fn tasks(&self) -> Result<Vec<Task>, CatalogError> {
        Ok(self.clone())
    }
}

/// Scans a folder for RSpec files and lists their examples.
#[derive(Clone, Debug)]
pub struct SpecFileCatalog {
    case_folder: Utf8PathBuf,
}

impl SpecFileCatalog {
    /// Creates a new catalog over the given folder.
    pub fn new(case_folder: impl Into<Utf8PathBuf>) -> Self {
        Self {
            case_folder: case_folder.into(),
        }
    }

    /// Returns the folder being scanned.
    pub fn case_folder(&self) -> &Utf8Path {
        &self.case_folder
    }
}

impl TaskCatalog for SpecFileCatalog {
    fn tasks(&self) -> Result<Vec<Task>, CatalogError> {
        let mut tasks = Vec::new();

        let walker = WalkDir::new(&self.case_folder).sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|err| CatalogError::Walk {
                folder: self.case_folder.clone(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                CatalogError::NonUtf8Path {
                    path: entry.path().to_string_lossy().into_owned(),
                }
            })?;
            if !path.as_str().ends_with(SPEC_FILE_SUFFIX) {
                continue;
            }

            let contents = fs::read(path).map_err(|err| CatalogError::Read {
                path: path.to_owned(),
                err,
            })?;
            let contents = String::from_utf8_lossy(&contents);
            let before = tasks.len();
            tasks.extend(scan_spec_file(path, &contents));
            debug!("found {} examples in {path}", tasks.len() - before);
        }

        Ok(tasks)
    }
}

/// Lists the examples in a single spec file.
///
/// Examples are `it "..." do` blocks, whose header may span several lines (the task points at the
/// line ending in ` do`), and single-line `it { ... }` blocks. Each example carries its own
/// `:symbol` tags plus those of the first `describe` in the file.
pub fn scan_spec_file(path: &Utf8Path, contents: &str) -> Vec<Task> {
    let lines: Vec<&str> = contents.lines().collect();

    let describe_tags = lines
        .iter()
        .find(|line| DESCRIBE.is_match(line))
        .map(|line| tags_in(line))
        .unwrap_or_default();

    let mut tasks = Vec::new();
    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        if ONE_LINER.is_match(line) {
            tasks.push(make_task(path, index, describe_tags.clone()));
        } else if EXAMPLE_START.is_match(line) {
            // Find the line that opens the block.
            let Some(offset) = lines[index..]
                .iter()
                .position(|line| line.trim_end().ends_with(" do"))
            else {
                break;
            };
            let end = index + offset;
            let mut tags = describe_tags.clone();
            for header_line in &lines[index..=end] {
                tags.extend(tags_in(header_line));
            }
            tasks.push(make_task(path, end, tags));
            index = end;
        }
        index += 1;
    }

    tasks
}

fn tags_in(line: &str) -> BTreeSet<String> {
    TAG.captures_iter(line)
        .map(|captures| captures[1].to_owned())
        .collect()
}

fn make_task(path: &Utf8Path, index: usize, tags: BTreeSet<String>) -> Task {
    Task {
        identifier: format!("{path}:{}", index + 1),
        tags,
        env_overrides: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    const CALCULATOR_SPEC: &str = indoc! {r#"
        require 'spec_helper'

        describe Calculator, :unit do
          it "adds", :fast do
            expect(1 + 1).to eq(2)
          end

          it 'divides a very long description that ' \
             'spans lines', :slow do
            expect(4 / 2).to eq(2)
          end

          it { is_expected.to respond_to(:add) }

          context "with big numbers" do
            it "multiplies" do
              expect(10**10 * 2).to eq(2 * 10**10)
            end
          end
        end
    "#};

    #[test]
    fn scans_examples() {
        let path = Utf8Path::new("spec/calculator_spec.rb");
        let tasks = scan_spec_file(path, CALCULATOR_SPEC);

        let identifiers: Vec<_> = tasks.iter().map(|task| task.identifier.as_str()).collect();
        assert_eq!(
            identifiers,
            vec![
                "spec/calculator_spec.rb:4",
                "spec/calculator_spec.rb:9",
                "spec/calculator_spec.rb:13",
                "spec/calculator_spec.rb:16",
            ]
        );
        assert_eq!(tasks[0].tags, btreeset! {"unit".to_owned(), "fast".to_owned()});
        assert_eq!(tasks[1].tags, btreeset! {"unit".to_owned(), "slow".to_owned()});
        assert_eq!(tasks[2].tags, btreeset! {"unit".to_owned()});
        assert_eq!(tasks[3].tags, btreeset! {"unit".to_owned()});
    }

    #[test]
    fn walks_case_folder() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        let nested = dir.path().join("models");
        fs::create_dir_all(&nested).expect("nested dir created");
        fs::write(nested.join("calculator_spec.rb"), CALCULATOR_SPEC).expect("spec written");
        fs::write(dir.path().join("a_spec.rb"), "describe A do\n  it \"works\" do\n  end\nend\n")
            .expect("spec written");
        fs::write(dir.path().join("spec_helper.rb"), "it \"ignored\" do\nend\n")
            .expect("helper written");

        let catalog = SpecFileCatalog::new(dir.path());
        let tasks = catalog.tasks().expect("catalog scanned");
        let identifiers: Vec<_> = tasks.iter().map(|task| task.identifier.clone()).collect();
        assert_eq!(
            identifiers,
            vec![
                format!("{}:2", dir.path().join("a_spec.rb")),
                format!("{}:4", nested.join("calculator_spec.rb")),
                format!("{}:9", nested.join("calculator_spec.rb")),
                format!("{}:13", nested.join("calculator_spec.rb")),
                format!("{}:16", nested.join("calculator_spec.rb")),
            ]
        );
    }
}
