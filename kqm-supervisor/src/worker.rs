//! Managed worker abstraction
//!
//! A worker is an independently running process reachable only through a
//! duplex message channel. The supervisor sees every worker through the same
//! interface regardless of how it was launched:
//! - outbound: [`WorkerHandle::send`]
//! - inbound and exit notification: [`WorkerEvent`]s on a shared channel
//!
//! Each launch gets a generation number so events from a previous instance
//! of a worker can be told apart from the current one.

use crate::error::{Result, SupervisorError};
use chrono::{DateTime, Utc};
use kqm_common::Envelope;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Server,
    Scanner,
}

impl WorkerKind {
    pub fn name(self) -> &'static str {
        match self {
            WorkerKind::Server => "server",
            WorkerKind::Scanner => "scanner",
        }
    }

    /// Human-readable name used in log lines
    pub fn label(self) -> &'static str {
        match self {
            WorkerKind::Server => "Web server",
            WorkerKind::Scanner => "Media scanner",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    NotStarted,
    Running,
}

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Code(i32),
    Signal(i32),
    /// Exit status could not be determined
    Unknown,
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitOutcome::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitOutcome::Signal(signal);
            }
        }

        ExitOutcome::Unknown
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => write!(f, "exited with code: {}", code),
            ExitOutcome::Signal(signal) => write!(f, "killed by signal {}", signal),
            ExitOutcome::Unknown => f.write_str("exited with unknown status"),
        }
    }
}

/// Everything the supervisor hears from its workers
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Message {
        kind: WorkerKind,
        generation: u64,
        envelope: Envelope,
    },
    Exited {
        kind: WorkerKind,
        generation: u64,
        outcome: ExitOutcome,
    },
}

/// The supervisor's handle on one running worker.
///
/// Dropping the handle counts as a kill request.
#[derive(Debug)]
pub struct WorkerHandle {
    kind: WorkerKind,
    generation: u64,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    outbox: mpsc::UnboundedSender<Envelope>,
    kill: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(
        kind: WorkerKind,
        generation: u64,
        pid: Option<u32>,
        outbox: mpsc::UnboundedSender<Envelope>,
        kill: oneshot::Sender<()>,
    ) -> Self {
        Self {
            kind,
            generation,
            pid,
            started_at: Utc::now(),
            outbox,
            kill: Some(kill),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Queue an envelope for delivery. Never blocks.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.outbox
            .send(envelope)
            .map_err(|_| SupervisorError::ChannelClosed(self.kind))
    }

    /// Ask the worker to be forcibly terminated. Idempotent.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// Starts workers. The supervisor owns exactly one launcher.
pub trait WorkerLauncher {
    /// Start a worker whose messages and exit are reported on `events`,
    /// tagged with `kind` and `generation`.
    fn launch(
        &self,
        kind: WorkerKind,
        generation: u64,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<WorkerHandle>;
}
