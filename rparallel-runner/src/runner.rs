// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker pool.
//!
//! The queue is filled once before any worker starts, so an empty queue means the run is drained.
//! Each worker takes one task at a time, invokes the external runner for it and parses what the
//! runner printed. Results are aggregated into a [`RunState`] behind a single lock, which also
//! serializes console output.

use crate::{
    catalog::Task,
    errors::{RunError, SignalHandlerSetupError},
    reporter::ConsoleReporter,
    signal::{SignalEvent, SignalHandler, SignalHandlerKind},
    stopwatch::StopwatchStart,
    transcript::{CaseResult, CaseStatus, TranscriptParser},
};
use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use duct::cmd;
use std::{
    collections::BTreeMap,
    io,
    iter,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};

/// The default delay between starting two workers.
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(100);

/// Aggregated results of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunState {
    /// The number of examples that produced a result.
    pub case_count: usize,

    /// The number of failed examples.
    pub failure_count: usize,

    /// The number of pending examples.
    pub pending_count: usize,

    /// Every result, in the order it was aggregated.
    pub case_results: Vec<CaseResult>,

    /// Indexes into `case_results` of the failed examples.
    pub failures: Vec<usize>,

    /// Indexes into `case_results` of the pending examples.
    pub pending: Vec<usize>,

    /// Identifiers of the tasks whose runner couldn't be started.
    pub exec_failures: Vec<String>,

    /// Whether the run was interrupted before the queue was drained.
    pub interrupted: bool,
}

impl RunState {
    /// Adds a result. Returns the 1-based failure number if the result is a failure.
    pub(crate) fn record(&mut self, result: CaseResult) -> Option<usize> {
        let index = self.case_results.len();
        self.case_count += 1;
        let failure_number = match result.status {
            CaseStatus::Failed => {
                self.failure_count += 1;
                self.failures.push(index);
                Some(self.failure_count)
            }
            CaseStatus::Pending => {
                self.pending_count += 1;
                self.pending.push(index);
                None
            }
            CaseStatus::Passed | CaseStatus::Unknown => None,
        };
        self.case_results.push(result);
        failure_number
    }

    /// Iterates over the failed results.
    pub fn failed_results(&self) -> impl Iterator<Item = &CaseResult> + '_ {
        self.failures.iter().map(|&index| &self.case_results[index])
    }

    /// Iterates over the pending results.
    pub fn pending_results(&self) -> impl Iterator<Item = &CaseResult> + '_ {
        self.pending.iter().map(|&index| &self.case_results[index])
    }
}

/// Builds a [`TaskRunner`].
#[derive(Clone, Debug)]
pub struct TaskRunnerBuilder {
    thread_count: usize,
    stagger: Duration,
    worker_env: Vec<BTreeMap<String, String>>,
}

impl TaskRunnerBuilder {
    /// Creates a builder for a pool of `thread_count` workers.
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count,
            stagger: DEFAULT_STAGGER,
            worker_env: Vec::new(),
        }
    }

    /// Sets the delay between starting two workers.
    pub fn set_stagger(&mut self, stagger: Duration) -> &mut Self {
        self.stagger = stagger;
        self
    }

    /// Sets the extra environment of each worker. Worker `i` uses entry `i`, if there is one.
    pub fn set_worker_env(&mut self, worker_env: Vec<BTreeMap<String, String>>) -> &mut Self {
        self.worker_env = worker_env;
        self
    }

    /// Creates the runner.
    ///
    /// `runner` is the command line of the external runner; each task's identifier is appended to
    /// it.
    pub fn build(
        &self,
        runner: Vec<String>,
        parser: TranscriptParser,
        reporter: ConsoleReporter,
        signal: SignalHandlerKind,
    ) -> Result<TaskRunner, SignalHandlerSetupError> {
        Ok(TaskRunner {
            thread_count: self.thread_count.max(1),
            stagger: self.stagger,
            signal_handler: signal.build()?,
            worker: Arc::new(Worker {
                runner,
                worker_env: self.worker_env.clone(),
                parser,
                reporter,
            }),
        })
    }
}

/// Runs tasks on a fixed pool of worker threads.
#[derive(Debug)]
pub struct TaskRunner {
    thread_count: usize,
    stagger: Duration,
    signal_handler: SignalHandler,
    worker: Arc<Worker>,
}

impl TaskRunner {
    /// Runs `tasks` and returns the aggregated results.
    ///
    /// If the run is interrupted, workers stop taking new tasks, and the results aggregated so far
    /// are returned right away. Tasks still in flight are not waited for.
    pub fn execute(&self, tasks: Vec<Task>) -> Result<RunState, RunError> {
        let (queue_sender, queue) = crossbeam_channel::unbounded();
        for task in tasks {
            // The receiver is alive, so this can't fail.
            let _ = queue_sender.send(task);
        }
        drop(queue_sender);

        let pool = Arc::new(Pool {
            queue,
            canceled: AtomicBool::new(false),
            state: Mutex::new(RunState::default()),
        });

        let (done_sender, done_receiver) = crossbeam_channel::unbounded();
        let mut handles = Vec::with_capacity(self.thread_count);
        let mut interrupted = false;
        for index in 0..self.thread_count {
            if index > 0 && !self.stagger.is_zero() && self.interrupted_within(self.stagger) {
                debug!("interrupted while starting worker {index}");
                interrupted = true;
                break;
            }
            match self.spawn_worker(index, &pool, done_sender.clone()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    pool.canceled.store(true, Ordering::Release);
                    return Err(RunError::SpawnWorker { index, err });
                }
            }
        }
        drop(done_sender);

        let interrupted = interrupted || self.wait(&done_receiver);
        if interrupted {
            pool.canceled.store(true, Ordering::Release);
        } else {
            for handle in handles {
                if handle.join().is_err() {
                    warn!("a worker thread panicked");
                }
            }
        }

        let mut state = pool.lock_state().clone();
        state.interrupted = interrupted;
        if interrupted
            && let Err(err) = self
                .worker
                .reporter
                .report_interrupted(state.case_results.len())
        {
            warn!("error writing to the console: {err}");
        }
        Ok(state)
    }

    fn spawn_worker(
        &self,
        index: usize,
        pool: &Arc<Pool>,
        done_sender: Sender<usize>,
    ) -> io::Result<JoinHandle<()>> {
        let pool = pool.clone();
        let worker = self.worker.clone();
        thread::Builder::new()
            .name(format!("rparallel-worker-{index}"))
            .spawn(move || {
                let _done = DoneGuard {
                    index,
                    sender: done_sender,
                };
                worker.drain(index, &pool);
            })
    }

    /// Sleeps for `delay`, returning early with true if the run is interrupted meanwhile.
    fn interrupted_within(&self, delay: Duration) -> bool {
        match self.signal_handler.receiver.recv_timeout(delay) {
            Ok(SignalEvent::Interrupted) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(delay);
                false
            }
        }
    }

    /// Waits for all workers to finish. Returns true if the run was interrupted instead.
    fn wait(&self, done_receiver: &Receiver<usize>) -> bool {
        loop {
            crossbeam_channel::select! {
                recv(done_receiver) -> done => match done {
                    Ok(index) => debug!("worker {index} is done"),
                    Err(_) => return false,
                },
                recv(self.signal_handler.receiver) -> event => match event {
                    Ok(SignalEvent::Interrupted) => {
                        debug!("interrupted, no longer handing out tasks");
                        return true;
                    }
                    // The handler went away; only the workers are left to wait for.
                    Err(_) => break,
                },
            }
        }
        for index in done_receiver {
            debug!("worker {index} is done");
        }
        false
    }
}

/// State shared between the workers of one run.
#[derive(Debug)]
struct Pool {
    queue: Receiver<Task>,
    canceled: AtomicBool,
    state: Mutex<RunState>,
}

impl Pool {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sends the worker's index once it's done, including when it panics.
struct DoneGuard {
    index: usize,
    sender: Sender<usize>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        // Failure to send means the run was interrupted and nobody is waiting.
        let _ = self.sender.send(self.index);
    }
}

/// What each worker needs to run tasks. Shared across runs of the same runner.
#[derive(Debug)]
struct Worker {
    runner: Vec<String>,
    worker_env: Vec<BTreeMap<String, String>>,
    parser: TranscriptParser,
    reporter: ConsoleReporter,
}

impl Worker {
    fn drain(&self, index: usize, pool: &Pool) {
        let env = self.worker_env.get(index);
        while !pool.canceled.load(Ordering::Acquire) {
            let Ok(task) = pool.queue.try_recv() else {
                break;
            };
            self.run_task(index, env, &task, pool);
        }
    }

    fn run_task(
        &self,
        index: usize,
        env: Option<&BTreeMap<String, String>>,
        task: &Task,
        pool: &Pool,
    ) {
        let stopwatch = StopwatchStart::now();
        let output = match self.invoke(task, env) {
            Ok(output) => output,
            Err(err) => {
                debug!("worker {index}: error running `{}`: {err}", task.identifier);
                let mut state = pool.lock_state();
                state.exec_failures.push(task.identifier.clone());
                let written = self.reporter.report_exec_failure(&task.identifier, &err);
                drop(state);
                if let Err(err) = written {
                    warn!("error writing to the console: {err}");
                }
                return;
            }
        };
        let duration = stopwatch.elapsed();
        debug!(
            "worker {index}: `{}` finished in {duration:?}",
            task.identifier
        );

        // Parsing happens outside the lock.
        let result = self.parser.parse(&output, duration);

        let mut state = pool.lock_state();
        let written = match result {
            Some(result) => match state.record(result) {
                Some(number) => match state.case_results.last() {
                    Some(result) => self.reporter.report_failure(number, result, Local::now()),
                    None => Ok(()),
                },
                None => Ok(()),
            },
            None => self.reporter.report_unparsed(&task.identifier, &output),
        };
        drop(state);

        if let Err(err) = written {
            warn!("error writing to the console: {err}");
        }
    }

    /// Runs the external runner for one task, returning its combined stdout and stderr.
    fn invoke(&self, task: &Task, env: Option<&BTreeMap<String, String>>) -> io::Result<String> {
        let (program, args) = self.runner.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "runner command is empty")
        })?;

        let mut expression = cmd(program, args.iter().chain(iter::once(&task.identifier)));
        for (key, value) in env.into_iter().flatten().chain(&task.env_overrides) {
            expression = expression.env(key, value);
        }
        let output = expression
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
