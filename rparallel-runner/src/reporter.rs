// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console output for a run.
//!
//! Failures are announced as soon as they're aggregated, so long runs show them early. Once the
//! run is over the reporter prints a summary along with the command that reruns each failure.

use crate::{catalog::Task, runner::RunState, transcript::CaseResult};
use chrono::{DateTime, Local};
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// Where the reporter writes to.
#[derive(Clone, Debug)]
pub enum ReporterOutput {
    /// Standard output.
    Terminal,

    /// An in-memory buffer, for tests.
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl ReporterOutput {
    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        match self {
            ReporterOutput::Terminal => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(bytes)?;
                stdout.flush()
            }
            ReporterOutput::Buffer(buffer) => {
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(bytes);
                Ok(())
            }
        }
    }
}

/// Builds a [`ConsoleReporter`].
#[derive(Clone, Debug, Default)]
pub struct ConsoleReporterBuilder {
    colorize: bool,
    show_pending: bool,
}

impl ConsoleReporterBuilder {
    /// Sets whether output is styled with ANSI colors.
    pub fn set_colorize(&mut self, colorize: bool) -> &mut Self {
        self.colorize = colorize;
        self
    }

    /// Sets whether pending cases are listed at the end of the run.
    pub fn set_show_pending(&mut self, show_pending: bool) -> &mut Self {
        self.show_pending = show_pending;
        self
    }

    /// Creates the reporter.
    pub fn build(&self, output: ReporterOutput) -> ConsoleReporter {
        let mut styles = Box::<Styles>::default();
        if self.colorize {
            styles.colorize();
        }
        ConsoleReporter {
            output,
            styles,
            show_pending: self.show_pending,
        }
    }
}

/// Writes run progress and results to the console.
#[derive(Clone, Debug)]
pub struct ConsoleReporter {
    output: ReporterOutput,
    styles: Box<Styles>,
    show_pending: bool,
}

impl ConsoleReporter {
    /// Prints the tasks that would run, one per line.
    pub fn report_list(&self, tasks: &[Task]) -> io::Result<()> {
        let mut buf = Vec::new();
        for task in tasks {
            write!(buf, "{}", task.identifier)?;
            if !task.tags.is_empty() {
                let tags: Vec<_> = task.tags.iter().map(String::as_str).collect();
                write!(buf, " {}", format!("[{}]", tags.join(", ")).style(self.styles.trace))?;
            }
            writeln!(buf)?;
        }
        writeln!(
            buf,
            "{} {}",
            tasks.len().style(self.styles.count),
            if tasks.len() == 1 { "example" } else { "examples" }
        )?;
        self.output.write_all(&buf)
    }

    pub(crate) fn report_started(
        &self,
        thread_count: usize,
        task_count: usize,
        seed: Option<u64>,
    ) -> io::Result<()> {
        let mut buf = Vec::new();
        writeln!(
            buf,
            "{}",
            format!("threads number: {thread_count}").style(self.styles.pending)
        )?;
        if let Some(seed) = seed {
            writeln!(buf, "Randomized with seed {}", seed.style(self.styles.count))?;
        }
        writeln!(buf, "Running {} examples", task_count.style(self.styles.count))?;
        self.output.write_all(&buf)
    }

    /// Announces a failure right after it was aggregated. `index` counts failures from 1.
    pub(crate) fn report_failure(
        &self,
        index: usize,
        result: &CaseResult,
        at: DateTime<Local>,
    ) -> io::Result<()> {
        let mut buf = Vec::new();
        if index == 1 {
            write!(buf, "Failures:\n\n")?;
        }
        writeln!(buf, "  {index}) {}", result.test_name())?;
        if let Some(failure) = &result.failure {
            write!(buf, "{}", failure.message.style(self.styles.fail))?;
            write!(buf, "{}", failure.stack_trace.style(self.styles.trace))?;
        }
        let stamp = format!("     (Failure time: {})", at.format("%Y-%m-%d %H:%M:%S %z"));
        write!(buf, "{}\n\n", stamp.style(self.styles.fail))?;
        self.output.write_all(&buf)
    }

    /// Shows the output of a runner invocation that didn't describe any example.
    pub(crate) fn report_unparsed(&self, identifier: &str, output: &str) -> io::Result<()> {
        let mut buf = Vec::new();
        writeln!(
            buf,
            "{}",
            format!("no result for {identifier}, runner output:").style(self.styles.pending)
        )?;
        write!(buf, "{output}")?;
        if !output.ends_with('\n') {
            writeln!(buf)?;
        }
        self.output.write_all(&buf)
    }

    /// Reports a task whose runner couldn't be started.
    pub(crate) fn report_exec_failure(&self, identifier: &str, err: &io::Error) -> io::Result<()> {
        let mut buf = Vec::new();
        writeln!(
            buf,
            "{}",
            format!("error running {identifier}: {err}").style(self.styles.fail)
        )?;
        self.output.write_all(&buf)
    }

    pub(crate) fn report_interrupted(&self, collected: usize) -> io::Result<()> {
        let mut buf = Vec::new();
        writeln!(
            buf,
            "\n{} reporting the {} results collected so far",
            "Interrupted:".style(self.styles.fail),
            collected.style(self.styles.count)
        )?;
        self.output.write_all(&buf)
    }

    /// Prints the end-of-run summary.
    pub(crate) fn report_finished(&self, state: &RunState, elapsed: Duration) -> io::Result<()> {
        let mut buf = Vec::new();

        if self.show_pending && state.pending_count > 0 {
            write!(buf, "\nPending:\n")?;
            for result in state.pending_results() {
                writeln!(buf, "  {}", result.test_name().style(self.styles.pending))?;
                if let Some(info) = &result.pending_info {
                    write!(buf, "{}", info.style(self.styles.trace))?;
                }
            }
            writeln!(buf)?;
        }

        writeln!(buf, "Finished in {}", format_time(elapsed))?;
        let counts = if state.pending_count > 0 {
            format!(
                "{} examples, {} failures, {} pending",
                state.case_count, state.failure_count, state.pending_count
            )
        } else {
            format!(
                "{} examples, {} failures",
                state.case_count, state.failure_count
            )
        };
        let style = if state.failure_count > 0 {
            self.styles.fail
        } else if state.pending_count > 0 {
            self.styles.pending
        } else {
            self.styles.pass
        };
        writeln!(buf, "{}", counts.style(style))?;
        if !state.exec_failures.is_empty() {
            let not_run = format!(
                "{} {} could not be run",
                state.exec_failures.len(),
                if state.exec_failures.len() == 1 { "example" } else { "examples" }
            );
            writeln!(buf, "{}", not_run.style(self.styles.fail))?;
        }

        if state.failure_count > 0 {
            write!(buf, "\nFailed examples:\n\n")?;
            for result in state.failed_results() {
                let command = result
                    .failure
                    .as_ref()
                    .map(|failure| failure.rerun_command.as_str())
                    .unwrap_or_default();
                let command = command.split(" # ").next().unwrap_or_default();
                writeln!(
                    buf,
                    "{}{}",
                    command.style(self.styles.fail),
                    format!(" # {}", result.test_name()).style(self.styles.trace)
                )?;
            }
        }

        self.output.write_all(&buf)
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    pending: Style,
    trace: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green();
        self.fail = Style::new().red();
        self.pending = Style::new().yellow();
        self.trace = Style::new().cyan();
    }
}

/// Formats a run duration as hours, minutes and seconds, leaving out leading zero units.
pub fn format_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let mut parts = Vec::with_capacity(3);
    if secs > 3600.0 {
        parts.push(format!("{} hours", elapsed.as_secs() / 3600));
    }
    if secs > 60.0 {
        parts.push(format!("{} minutes", elapsed.as_secs() % 3600 / 60));
    }
    parts.push(format!("{:.2} seconds", secs % 60.0));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{CaseFailure, CaseStatus};
    use chrono::TimeZone;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn buffered(show_pending: bool) -> (ConsoleReporter, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reporter = ConsoleReporterBuilder::default()
            .set_show_pending(show_pending)
            .build(ReporterOutput::Buffer(buffer.clone()));
        (reporter, buffer)
    }

    fn contents(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().expect("not poisoned").clone()).expect("valid UTF-8")
    }

    fn result(description: &str, status: CaseStatus) -> CaseResult {
        CaseResult {
            group_name: "Calculator".to_owned(),
            description: description.to_owned(),
            status,
            duration: Duration::from_millis(100),
            stdout: String::new(),
            stderr: String::new(),
            failure: (status == CaseStatus::Failed).then(|| CaseFailure {
                message: "     Failure/Error: expect(1 + 1).to eq(3)\n".to_owned(),
                stack_trace: "     # ./spec/calc_spec.rb:9\n".to_owned(),
                details: "expected: 3".to_owned(),
                rerun_command: format!("rspec ./spec/calc_spec.rb:8 # Calculator {description}"),
            }),
            pending_info: (status == CaseStatus::Pending)
                .then(|| "     # Not yet implemented\n".to_owned()),
        }
    }

    #[test_case(Duration::from_millis(500), "0.50 seconds"; "subsecond")]
    #[test_case(Duration::from_millis(61_250), "1 minutes 1.25 seconds"; "minutes")]
    #[test_case(Duration::from_secs(3725), "1 hours 2 minutes 5.00 seconds"; "hours")]
    #[test_case(Duration::from_secs(60), "0.00 seconds"; "exactly one minute")]
    fn formats_time(elapsed: Duration, expected: &str) {
        assert_eq!(format_time(elapsed), expected);
    }

    #[test]
    fn failure_notices() {
        let (reporter, buffer) = buffered(false);
        let at = Local
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
            .single()
            .expect("unambiguous time");
        reporter
            .report_failure(1, &result("divides", CaseStatus::Failed), at)
            .expect("written");
        reporter
            .report_failure(2, &result("multiplies", CaseStatus::Failed), at)
            .expect("written");

        let output = contents(&buffer);
        assert!(output.starts_with("Failures:\n\n  1) Calculator divides\n"));
        assert_eq!(output.matches("Failures:").count(), 1);
        assert!(output.contains("  2) Calculator multiplies\n     Failure/Error:"));
        assert!(output.contains("     # ./spec/calc_spec.rb:9\n     (Failure time: 2024-05-01 12:30:00"));
    }

    #[test]
    fn summary() {
        let (reporter, buffer) = buffered(true);
        let mut state = RunState::default();
        state.record(result("adds", CaseStatus::Passed));
        state.record(result("divides", CaseStatus::Failed));
        state.record(result("waits", CaseStatus::Pending));

        reporter
            .report_finished(&state, Duration::from_millis(1500))
            .expect("written");
        assert_eq!(
            contents(&buffer),
            indoc! {"

                Pending:
                  Calculator waits
                     # Not yet implemented

                Finished in 1.50 seconds
                3 examples, 1 failures, 1 pending

                Failed examples:

                rspec ./spec/calc_spec.rb:8 # Calculator divides
            "}
        );
    }

    #[test]
    fn summary_without_pending_list() {
        let (reporter, buffer) = buffered(false);
        let mut state = RunState::default();
        state.record(result("adds", CaseStatus::Passed));
        state.record(result("waits", CaseStatus::Pending));

        reporter
            .report_finished(&state, Duration::from_secs(2))
            .expect("written");
        assert_eq!(
            contents(&buffer),
            "Finished in 2.00 seconds\n2 examples, 0 failures, 1 pending\n"
        );
    }

    #[test]
    fn exec_failures() {
        let (reporter, buffer) = buffered(false);
        let mut state = RunState::default();
        state.record(result("adds", CaseStatus::Passed));
        state.exec_failures.push("./spec/calc_spec.rb:9".to_owned());

        let err = io::Error::new(io::ErrorKind::NotFound, "program not found");
        reporter
            .report_exec_failure("./spec/calc_spec.rb:9", &err)
            .expect("written");
        reporter
            .report_finished(&state, Duration::from_secs(1))
            .expect("written");
        assert_eq!(
            contents(&buffer),
            indoc! {"
                error running ./spec/calc_spec.rb:9: program not found
                Finished in 1.00 seconds
                1 examples, 0 failures
                1 example could not be run
            "}
        );
    }

    #[test]
    fn lists_tasks() {
        let (reporter, buffer) = buffered(false);
        let tasks = vec![
            Task::new("./spec/calc_spec.rb:4").with_tags(["fast", "math"]),
            Task::new("./spec/calc_spec.rb:9"),
        ];
        reporter.report_list(&tasks).expect("written");
        assert_eq!(
            contents(&buffer),
            "./spec/calc_spec.rb:4 [fast, math]\n./spec/calc_spec.rb:9\n2 examples\n"
        );
    }
}
