// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for rparallel.
//!
//! There are two layers:
//!
//! * [`ProfileConfig`], read from `.config/rparallel.toml` (or a file passed in explicitly) and
//!   layered over the defaults in `default-config.toml`.
//! * [`RunConfiguration`], the settings for one run. It is built with a
//!   [`RunConfigurationBuilder`] seeded from the profile, and validated exactly once before the
//!   run starts.

use crate::{
    errors::{ConfigReadError, ConfigValidationError},
    test_filter::{TaskFilter, TaskOrder},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    time::{SystemTime, UNIX_EPOCH},
};

/// Settings read from the configuration file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileConfig {
    /// The largest thread count a run may ask for.
    pub max_threads: usize,

    /// The runner command line. The task identifier is appended to it.
    pub runner: String,

    /// How the runner's rerun commands begin.
    pub rerun_prefix: String,

    /// Whether to list pending cases at the end of a run.
    pub show_pending: bool,

    /// Per-worker environment, as `KEY=VALUE` strings.
    #[serde(default)]
    pub worker_env: Vec<Vec<String>>,
}

impl ProfileConfig {
    /// The default location of the config within the working directory.
    pub const CONFIG_PATH: &'static str = ".config/rparallel.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the given file, or if not specified from `.config/rparallel.toml`
    /// in `root`. Falls back to the defaults if neither exists.
    pub fn from_sources(
        root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigReadError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        Self::make_default_config()
            .add_source(source)
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigReadError::new(config_file, err))
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        Self::make_default_config()
            .build()
            .and_then(|config| config.try_deserialize())
            .expect("default config is always valid")
    }

    fn make_default_config() -> config::ConfigBuilder<config::builder::DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }
}

/// Pattern and tag filters, as provided by the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// A regular expression matched against task identifiers.
    pub pattern: Option<String>,

    /// Comma-separated tags; `~tag` excludes.
    pub tags: Option<String>,
}

/// The settings for one run, before validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfiguration {
    /// The number of workers.
    pub thread_count: usize,

    /// The upper bound for `thread_count`.
    pub max_thread_count: usize,

    /// The folder scanned for spec files.
    pub case_folder: Utf8PathBuf,

    /// The base report folder.
    pub report_root: Utf8PathBuf,

    /// Pattern and tag filters.
    pub filter: FilterOptions,

    /// Per-worker environment, as `KEY=VALUE` strings.
    pub env_list: Vec<Vec<String>>,

    /// Whether to shuffle the selected tasks.
    pub random_order: bool,

    /// The seed to shuffle with. If unset, a seed is derived from the clock.
    pub random_seed: Option<u64>,

    /// Whether to rerun the failures of the last run instead of scanning `case_folder`.
    pub rerun: bool,

    /// Whether reruns and longevity iterations update one report rather than creating new ones.
    pub single_report: bool,

    /// The longevity iteration, starting at 1. 0 means this isn't a longevity run.
    pub longevity_index: usize,

    /// The runner command line.
    pub runner_command: String,

    /// How the runner's rerun commands begin.
    pub rerun_prefix: String,

    /// Whether to list pending cases at the end of a run.
    pub show_pending: bool,
}

impl RunConfiguration {
    /// Checks this configuration, resolving the filter, order, environment and runner command.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigValidationError> {
        if self.thread_count < 1 || self.thread_count > self.max_thread_count {
            return Err(ConfigValidationError::InvalidThreadCount {
                requested: self.thread_count,
                max: self.max_thread_count,
            });
        }

        let filter = TaskFilter::new(self.filter.pattern.as_deref(), self.filter.tags.as_deref())?;

        let worker_env = self
            .env_list
            .iter()
            .enumerate()
            .map(|(worker, entries)| parse_worker_env(worker, entries))
            .collect::<Result<Vec<_>, _>>()?;

        let runner = match shell_words::split(&self.runner_command) {
            Ok(words) if !words.is_empty() => words,
            _ => {
                return Err(ConfigValidationError::InvalidRunnerCommand {
                    command: self.runner_command.clone(),
                });
            }
        };

        let order = if self.random_order {
            TaskOrder::Random {
                seed: self.random_seed.unwrap_or_else(wall_clock_seed),
            }
        } else {
            TaskOrder::Listed
        };

        Ok(ValidatedConfig {
            config: self,
            filter,
            order,
            worker_env,
            runner,
        })
    }
}

/// A [`RunConfiguration`] that has passed validation.
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    config: RunConfiguration,
    filter: TaskFilter,
    order: TaskOrder,
    worker_env: Vec<BTreeMap<String, String>>,
    runner: Vec<String>,
}

impl ValidatedConfig {
    /// Returns the configuration that was validated.
    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// Returns the compiled task filter.
    pub fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    /// Returns the dispatch order, including the seed in effect for random runs.
    pub fn order(&self) -> TaskOrder {
        self.order
    }

    /// Returns the environment of each worker.
    pub fn worker_env(&self) -> &[BTreeMap<String, String>] {
        &self.worker_env
    }

    /// Returns the runner command, split into program and arguments.
    pub fn runner(&self) -> &[String] {
        &self.runner
    }
}

/// Builds a [`RunConfiguration`].
#[derive(Clone, Debug)]
pub struct RunConfigurationBuilder {
    config: RunConfiguration,
}

impl RunConfigurationBuilder {
    /// Creates a new builder with the profile's settings.
    pub fn new(
        profile: &ProfileConfig,
        case_folder: impl Into<Utf8PathBuf>,
        report_root: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            config: RunConfiguration {
                thread_count: std::thread::available_parallelism()
                    .map_or(1, NonZeroUsize::get)
                    .min(profile.max_threads)
                    .max(1),
                max_thread_count: profile.max_threads,
                case_folder: case_folder.into(),
                report_root: report_root.into(),
                filter: FilterOptions::default(),
                env_list: profile.worker_env.clone(),
                random_order: false,
                random_seed: None,
                rerun: false,
                single_report: false,
                longevity_index: 0,
                runner_command: profile.runner.clone(),
                rerun_prefix: profile.rerun_prefix.clone(),
                show_pending: profile.show_pending,
            },
        }
    }

    /// Sets the number of workers.
    pub fn set_thread_count(&mut self, thread_count: usize) -> &mut Self {
        self.config.thread_count = thread_count;
        self
    }

    /// Sets the pattern filter.
    pub fn set_pattern(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.config.filter.pattern = Some(pattern.into());
        self
    }

    /// Sets the tag filter.
    pub fn set_tags(&mut self, tags: impl Into<String>) -> &mut Self {
        self.config.filter.tags = Some(tags.into());
        self
    }

    /// Replaces the per-worker environment.
    pub fn set_env_list(&mut self, env_list: Vec<Vec<String>>) -> &mut Self {
        self.config.env_list = env_list;
        self
    }

    /// Enables random ordering, optionally with a fixed seed.
    pub fn set_random_order(&mut self, seed: Option<u64>) -> &mut Self {
        self.config.random_order = true;
        self.config.random_seed = seed;
        self
    }

    /// Sets whether this run reruns the failures of the last run.
    pub fn set_rerun(&mut self, rerun: bool) -> &mut Self {
        self.config.rerun = rerun;
        self
    }

    /// Sets whether to keep a single report.
    pub fn set_single_report(&mut self, single_report: bool) -> &mut Self {
        self.config.single_report = single_report;
        self
    }

    /// Sets the longevity iteration.
    pub fn set_longevity_index(&mut self, longevity_index: usize) -> &mut Self {
        self.config.longevity_index = longevity_index;
        self
    }

    /// Overrides the runner command line.
    pub fn set_runner_command(&mut self, runner_command: impl Into<String>) -> &mut Self {
        self.config.runner_command = runner_command.into();
        self
    }

    /// Sets whether to list pending cases at the end of a run.
    pub fn set_show_pending(&mut self, show_pending: bool) -> &mut Self {
        self.config.show_pending = show_pending;
        self
    }

    /// Returns the configuration.
    pub fn build(&self) -> RunConfiguration {
        self.config.clone()
    }
}

fn parse_worker_env(
    worker: usize,
    entries: &[String],
) -> Result<BTreeMap<String, String>, ConfigValidationError> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => Err(ConfigValidationError::InvalidWorkerEnv {
                worker,
                entry: entry.clone(),
            }),
        })
        .collect()
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
