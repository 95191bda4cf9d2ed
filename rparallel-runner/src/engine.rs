// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a whole test run: selection, dispatch, console summary and reports.

use crate::{
    catalog::{Task, TaskCatalog},
    config::{RunConfiguration, ValidatedConfig},
    errors::{ConfigValidationError, RunError},
    report::{
        ReportMode, ReportSet, failed_tasks, last_report_folder, next_report_folder, read_summary,
    },
    reporter::{ConsoleReporterBuilder, ReporterOutput},
    runner::{DEFAULT_STAGGER, RunState, TaskRunnerBuilder},
    signal::SignalHandlerKind,
    stopwatch::StopwatchStart,
    test_filter::select_tasks,
    transcript::TranscriptParser,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::{fmt, fs, io, time::Duration};
use tracing::{debug, info, warn};

/// The name of the script that reruns the failures of a run.
pub static RERUN_SCRIPT_NAME: &str = "rerun.sh";

/// Settings for a run that don't come from the configuration.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Where console output goes.
    pub output: ReporterOutput,

    /// Whether console output is colorized.
    pub colorize: bool,

    /// How interrupts are handled.
    pub signal: SignalHandlerKind,

    /// The delay between starting two workers.
    pub stagger: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output: ReporterOutput::Terminal,
            colorize: false,
            signal: SignalHandlerKind::Standard,
            stagger: DEFAULT_STAGGER,
        }
    }
}

/// How a run ended, short of a fatal error.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run went through and its report was written.
    Completed(RunSummary),

    /// No task was selected. Nothing was run or written.
    NoCases,

    /// The configuration was rejected. Nothing was run or written.
    InvalidConfig(ConfigValidationError),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(_) => write!(f, "ok"),
            RunOutcome::NoCases => write!(f, "no cases to run, exit."),
            RunOutcome::InvalidConfig(err) => write!(f, "{err}"),
        }
    }
}

/// Statistics about a completed run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// The number of examples that produced a result.
    pub case_count: usize,

    /// The number of failed examples.
    pub failure_count: usize,

    /// The number of pending examples.
    pub pending_count: usize,

    /// The number of tasks whose runner couldn't be started.
    pub exec_failure_count: usize,

    /// Whether the run was interrupted.
    pub interrupted: bool,

    /// The seed tasks were shuffled with, for random runs.
    pub seed: Option<u64>,

    /// How the report was written.
    pub mode: ReportMode,

    /// The folder the report was written to.
    pub report_folder: Utf8PathBuf,

    /// When the run started.
    pub start_time: DateTime<Local>,

    /// How long the run took.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Returns true if every task ran, every example passed and the run wasn't interrupted.
    pub fn is_success(&self) -> bool {
        self.failure_count == 0 && self.exec_failure_count == 0 && !self.interrupted
    }
}

/// Returns the tasks a run with this configuration would execute, in dispatch order.
///
/// A rerun takes the failures recorded in the last report; the filters don't apply to them.
pub fn select_run_tasks(
    validated: &ValidatedConfig,
    catalog: &dyn TaskCatalog,
) -> Result<Vec<Task>, RunError> {
    let config = validated.config();
    if config.rerun {
        let folder = last_report_folder(&config.report_root, config.single_report)?;
        let summary = read_summary(&folder)?;
        let mut tasks = failed_tasks(&summary, &config.rerun_prefix);
        debug!("{} failed examples to rerun from {folder}", tasks.len());
        validated.order().apply(&mut tasks);
        Ok(tasks)
    } else {
        Ok(select_tasks(
            catalog.tasks()?,
            validated.filter(),
            validated.order(),
        ))
    }
}

/// Runs the tasks selected by `config` and writes the report.
pub fn run_tests(
    config: RunConfiguration,
    catalog: &dyn TaskCatalog,
    options: &RunOptions,
) -> Result<RunOutcome, RunError> {
    let stopwatch = StopwatchStart::now();
    let validated = match config.validate() {
        Ok(validated) => validated,
        Err(err) => return Ok(RunOutcome::InvalidConfig(err)),
    };
    let config = validated.config();
    let mode = ReportMode::select(config.rerun, config.single_report, config.longevity_index);
    let base = config.report_root.as_path();

    // The prior report is needed for merging, so fail before running anything if it's unusable.
    let prior = match mode {
        ReportMode::Create => None,
        ReportMode::Update | ReportMode::Append => Some(ReportSet::load(base)?),
    };

    let tasks = select_run_tasks(&validated, catalog)?;
    if tasks.is_empty() {
        info!("no cases to run");
        return Ok(RunOutcome::NoCases);
    }
    let seed = validated.order().seed();
    if let Some(seed) = seed {
        info!("shuffling examples with seed {seed}");
    }

    let reporter = ConsoleReporterBuilder::default()
        .set_colorize(options.colorize)
        .set_show_pending(config.show_pending)
        .build(options.output.clone());
    if let Err(err) = reporter.report_started(config.thread_count, tasks.len(), seed) {
        warn!("error writing to the console: {err}");
    }

    let runner = TaskRunnerBuilder::new(config.thread_count)
        .set_stagger(options.stagger)
        .set_worker_env(validated.worker_env().to_vec())
        .build(
            validated.runner().to_vec(),
            TranscriptParser::new(config.rerun_prefix.as_str()),
            reporter.clone(),
            options.signal.clone(),
        )?;
    let state = runner.execute(tasks)?;
    let end = stopwatch.end();

    if let Err(err) = reporter.report_finished(&state, end.duration) {
        warn!("error writing to the console: {err}");
    }

    let report_folder = if config.rerun && !config.single_report {
        next_report_folder(base)?
    } else {
        base.to_owned()
    };
    let mut set = match prior {
        Some(mut prior) if mode == ReportMode::Update => {
            prior.patch(&state.case_results, config.longevity_index);
            prior
        }
        Some(mut prior) => {
            prior.append(&state.case_results, &report_folder, config.longevity_index);
            prior
        }
        None => ReportSet::build(&state.case_results, &report_folder, config.longevity_index),
    };
    set.finish(end.duration).persist(&report_folder)?;
    info!("report written to {report_folder}");

    if state.failure_count > 0 {
        let path = report_folder.join(RERUN_SCRIPT_NAME);
        write_rerun_script(&path, &state)
            .map_err(|err| RunError::WriteRerunScript { path, err })?;
    }

    Ok(RunOutcome::Completed(RunSummary {
        case_count: state.case_count,
        failure_count: state.failure_count,
        pending_count: state.pending_count,
        exec_failure_count: state.exec_failures.len(),
        interrupted: state.interrupted,
        seed,
        mode,
        report_folder,
        start_time: end.start_time,
        elapsed: end.duration,
    }))
}

/// Writes a script that reruns each failure, announcing it by name first.
fn write_rerun_script(path: &Utf8Path, state: &RunState) -> io::Result<()> {
    let mut script = String::new();
    for result in state.failed_results() {
        let command = result
            .failure
            .as_ref()
            .map(|failure| failure.rerun_command.trim())
            .unwrap_or_default();
        script.push_str("echo ----");
        script.push_str(&result.test_name());
        script.push('\n');
        script.push_str(command);
        script.push('\n');
    }
    fs::write(path, script)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
