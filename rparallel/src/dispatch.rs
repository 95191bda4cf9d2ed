// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, RparallelExitCode},
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use rparallel_runner::{
    catalog::SpecFileCatalog,
    config::{ProfileConfig, RunConfiguration, RunConfigurationBuilder},
    engine::{RunOptions, RunOutcome, RunSummary, run_tests, select_run_tasks},
    reporter::{ConsoleReporterBuilder, ReporterOutput},
};
use tracing::{error, info, warn};

/// Runs RSpec examples in parallel, one runner process per example.
#[derive(Debug, Parser)]
#[command(
    version,
    bin_name = "rparallel",
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct RparallelApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl RparallelApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        match self.command {
            Command::Run(opts) => opts.exec(output),
            Command::List(opts) => opts.exec(output),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the selected examples and write the report
    Run(RunOpts),

    /// List the examples a run would execute, in dispatch order
    List(ListOpts),
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Selection options")]
struct SelectionOpts {
    /// Folder scanned for `*_spec.rb` files
    #[arg(long, value_name = "PATH", default_value = "spec")]
    case_folder: Utf8PathBuf,

    /// Base folder for reports
    #[arg(long, value_name = "PATH", default_value = "report")]
    report_folder: Utf8PathBuf,

    /// Only run examples whose identifier matches this regex
    #[arg(short, long, value_name = "REGEX")]
    pattern: Option<String>,

    /// Comma-separated tags to include; prefix a tag with `~` to exclude it
    #[arg(short, long, value_name = "TAGS")]
    tags: Option<String>,

    /// Shuffle the examples before running them
    #[arg(long)]
    random: bool,

    /// Seed for shuffling (implies --random)
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Rerun the failures recorded in the last report
    #[arg(long)]
    rerun: bool,

    /// Update a single report across reruns and longevity iterations
    #[arg(long)]
    single_report: bool,

    /// Config file [default: .config/rparallel.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl SelectionOpts {
    fn builder(&self) -> Result<RunConfigurationBuilder, ExpectedError> {
        let profile = ProfileConfig::from_sources(Utf8Path::new(""), self.config_file.as_deref())?;

        let mut builder = RunConfigurationBuilder::new(
            &profile,
            self.case_folder.clone(),
            self.report_folder.clone(),
        );
        if let Some(pattern) = &self.pattern {
            builder.set_pattern(pattern.clone());
        }
        if let Some(tags) = &self.tags {
            builder.set_tags(tags.clone());
        }
        if self.random || self.seed.is_some() {
            builder.set_random_order(self.seed);
        }
        builder
            .set_rerun(self.rerun)
            .set_single_report(self.single_report);
        Ok(builder)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    #[clap(flatten)]
    selection: SelectionOpts,

    /// Number of workers [default: available parallelism]
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<usize>,

    /// Environment of one worker as comma-separated KEY=VALUE pairs, repeated once per worker
    #[arg(long, value_name = "KEY=VALUE,...")]
    worker_env: Vec<String>,

    /// Longevity iteration, starting at 1
    #[arg(long, value_name = "N", default_value_t = 0)]
    longevity: usize,

    /// Runner command line; the example identifier is appended to it
    #[arg(long, value_name = "COMMAND")]
    runner: Option<String>,

    /// List pending examples at the end of the run
    #[arg(long)]
    show_pending: bool,
}

impl RunOpts {
    fn to_config(&self) -> Result<RunConfiguration, ExpectedError> {
        let mut builder = self.selection.builder()?;
        if let Some(threads) = self.threads {
            builder.set_thread_count(threads);
        }
        if !self.worker_env.is_empty() {
            builder.set_env_list(parse_worker_env_args(&self.worker_env));
        }
        if let Some(runner) = &self.runner {
            builder.set_runner_command(runner.clone());
        }
        if self.show_pending {
            builder.set_show_pending(true);
        }
        builder.set_longevity_index(self.longevity);
        Ok(builder.build())
    }

    fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        let config = self.to_config()?;
        let catalog = SpecFileCatalog::new(config.case_folder.clone());
        let options = RunOptions {
            colorize: output.colorize_stdout(),
            ..RunOptions::default()
        };

        let outcome = run_tests(config, &catalog, &options)?;
        Ok(outcome_exit_code(&outcome))
    }
}

#[derive(Debug, Args)]
struct ListOpts {
    #[clap(flatten)]
    selection: SelectionOpts,
}

impl ListOpts {
    fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        let config = self.selection.builder()?.build();
        let catalog = SpecFileCatalog::new(config.case_folder.clone());
        let validated = match config.validate() {
            Ok(validated) => validated,
            Err(err) => {
                error!("{err}");
                return Ok(RparallelExitCode::INVALID_CONFIG);
            }
        };

        let tasks = select_run_tasks(&validated, &catalog)?;
        let reporter = ConsoleReporterBuilder::default()
            .set_colorize(output.colorize_stdout())
            .build(ReporterOutput::Terminal);
        if let Err(err) = reporter.report_list(&tasks) {
            warn!("error writing to the console: {err}");
        }
        Ok(RparallelExitCode::OK)
    }
}

/// Splits each `--worker-env` value into the entries of one worker.
fn parse_worker_env_args(values: &[String]) -> Vec<Vec<String>> {
    values
        .iter()
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .collect()
}

fn outcome_exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed(summary) => {
            log_summary(summary);
            if summary.failure_count > 0 || summary.exec_failure_count > 0 {
                RparallelExitCode::TEST_RUN_FAILED
            } else if summary.interrupted {
                RparallelExitCode::INCOMPLETE_RUN
            } else {
                RparallelExitCode::OK
            }
        }
        RunOutcome::NoCases => {
            info!("{outcome}");
            RparallelExitCode::OK
        }
        RunOutcome::InvalidConfig(_) => {
            error!("{outcome}");
            RparallelExitCode::INVALID_CONFIG
        }
    }
}

fn log_summary(summary: &RunSummary) {
    if summary.interrupted {
        warn!(
            "run interrupted: {} examples finished, report written to {}",
            summary.case_count, summary.report_folder
        );
    }
    if summary.exec_failure_count > 0 {
        warn!("{} examples could not be run", summary.exec_failure_count);
    }
    if let Some(seed) = summary.seed {
        info!("rerun in this order with --seed {seed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use pretty_assertions::assert_eq;
    use rparallel_runner::{errors::ConfigValidationError, report::ReportMode};
    use std::time::Duration;
    use test_case::test_case;

    fn parse(args: &[&str]) -> RparallelApp {
        RparallelApp::try_parse_from(args).expect("arguments are valid")
    }

    fn run_opts(args: &[&str]) -> RunOpts {
        match parse(args).command {
            Command::Run(opts) => opts,
            Command::List(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        RparallelApp::command().debug_assert();
    }

    #[test]
    fn run_args_override_profile() {
        let opts = run_opts(&[
            "rparallel",
            "run",
            "-j",
            "4",
            "--case-folder",
            "spec/models",
            "-p",
            "calculator",
            "-t",
            "~slow",
            "--seed",
            "7",
            "--worker-env",
            "DISPLAY=:1, LANG=C",
            "--worker-env",
            "DISPLAY=:2",
            "--longevity",
            "2",
            "--single-report",
            "--runner",
            "rspec --format d",
        ]);
        let config = opts.to_config().expect("default profile is valid");

        assert_eq!(config.thread_count, 4);
        assert_eq!(config.case_folder, "spec/models");
        assert_eq!(config.report_root, "report");
        assert_eq!(config.filter.pattern.as_deref(), Some("calculator"));
        assert_eq!(config.filter.tags.as_deref(), Some("~slow"));
        assert!(config.random_order);
        assert_eq!(config.random_seed, Some(7));
        assert_eq!(
            config.env_list,
            vec![
                vec!["DISPLAY=:1".to_owned(), "LANG=C".to_owned()],
                vec!["DISPLAY=:2".to_owned()],
            ]
        );
        assert_eq!(config.longevity_index, 2);
        assert!(config.single_report);
        assert!(!config.rerun);
        assert_eq!(config.runner_command, "rspec --format d");
        assert_eq!(config.max_thread_count, 64);
    }

    #[test]
    fn run_defaults() {
        let config = run_opts(&["rparallel", "run"])
            .to_config()
            .expect("default profile is valid");
        assert_eq!(config.case_folder, "spec");
        assert!(!config.random_order);
        assert_eq!(config.longevity_index, 0);
        assert_eq!(config.runner_command, "bundle exec rspec -f d --color");
    }

    #[test_case(&["rparallel", "list", "--rerun"]; "list rerun")]
    #[test_case(&["rparallel", "list", "-t", "fast,~slow", "--random"]; "list filters")]
    #[test_case(&["rparallel", "--color", "never", "run", "--show-pending"]; "color before")]
    #[test_case(&["rparallel", "run", "--color", "always"]; "color after")]
    fn valid_args(args: &[&str]) {
        RparallelApp::try_parse_from(args).expect("arguments are valid");
    }

    #[test_case(&["rparallel"]; "no command")]
    #[test_case(&["rparallel", "run", "-j", "many"]; "non-numeric threads")]
    #[test_case(&["rparallel", "list", "-j", "2"]; "threads on list")]
    #[test_case(&["rparallel", "run", "--longevity", "-1"]; "negative longevity")]
    fn invalid_args(args: &[&str]) {
        RparallelApp::try_parse_from(args).expect_err("arguments are invalid");
    }

    #[test]
    fn worker_env_entries() {
        assert_eq!(
            parse_worker_env_args(&["A=1,B=2,".to_owned(), String::new()]),
            vec![vec!["A=1".to_owned(), "B=2".to_owned()], vec![]]
        );
    }

    fn summary(failure_count: usize, interrupted: bool) -> RunSummary {
        RunSummary {
            case_count: 3,
            failure_count,
            pending_count: 0,
            exec_failure_count: 0,
            interrupted,
            seed: None,
            mode: ReportMode::Create,
            report_folder: Utf8PathBuf::from("report"),
            start_time: Local::now(),
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(
            outcome_exit_code(&RunOutcome::Completed(summary(0, false))),
            RparallelExitCode::OK
        );
        assert_eq!(
            outcome_exit_code(&RunOutcome::Completed(summary(1, true))),
            RparallelExitCode::TEST_RUN_FAILED
        );
        assert_eq!(
            outcome_exit_code(&RunOutcome::Completed(summary(0, true))),
            RparallelExitCode::INCOMPLETE_RUN
        );
        let not_run = RunSummary {
            case_count: 0,
            exec_failure_count: 3,
            ..summary(0, false)
        };
        assert!(!not_run.is_success());
        assert_eq!(
            outcome_exit_code(&RunOutcome::Completed(not_run)),
            RparallelExitCode::TEST_RUN_FAILED
        );
        assert_eq!(outcome_exit_code(&RunOutcome::NoCases), RparallelExitCode::OK);
        assert_eq!(
            outcome_exit_code(&RunOutcome::InvalidConfig(
                ConfigValidationError::InvalidThreadCount {
                    requested: 0,
                    max: 64
                }
            )),
            RparallelExitCode::INVALID_CONFIG
        );
    }
}
