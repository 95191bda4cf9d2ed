// Copyright (c) The rparallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling signals in rparallel.

use crate::errors::SignalHandlerSetupError;
use crossbeam_channel::Receiver;

/// The kind of signal handling to set up for a run.
#[derive(Clone, Debug)]
pub enum SignalHandlerKind {
    /// The standard signal handler. Captures Ctrl-C, as well as SIGTERM and SIGHUP on Unix.
    ///
    /// This can only be set up once per process.
    Standard,

    /// A no-op signal handler. Useful for tests.
    Noop,

    /// Delivers whatever is sent on the other end of the channel.
    #[cfg(test)]
    Channel(Receiver<SignalEvent>),
}

impl SignalHandlerKind {
    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => SignalHandler::new(),
            Self::Noop => Ok(SignalHandler::noop()),
            #[cfg(test)]
            Self::Channel(receiver) => Ok(SignalHandler { receiver }),
        }
    }
}

/// The signal handler implementation.
#[derive(Debug)]
pub(crate) struct SignalHandler {
    pub(crate) receiver: Receiver<SignalEvent>,
}

impl SignalHandler {
    /// Creates a new `SignalHandler` that handles Ctrl-C and other termination signals.
    fn new() -> Result<Self, SignalHandlerSetupError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        ctrlc::set_handler(move || {
            // Failure to send means the run is over and the receiver was dropped.
            let _ = sender.send(SignalEvent::Interrupted);
        })?;

        Ok(Self { receiver })
    }

    /// Creates a new `SignalHandler` that never fires.
    fn noop() -> Self {
        Self {
            receiver: crossbeam_channel::never(),
        }
    }
}

/// A signal event that should be handled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignalEvent {
    /// The run was interrupted: Ctrl-C, SIGTERM or SIGHUP.
    Interrupted,
}
