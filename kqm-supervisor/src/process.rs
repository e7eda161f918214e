//! OS process launcher
//!
//! Each worker is a child process. Its stdin and stdout are piped and carry
//! newline-delimited JSON envelopes; stderr is inherited so worker logs land
//! next to the supervisor's. Three tasks serve each child:
//! - writer: drains the handle's outbox into stdin
//! - reader: parses stdout lines into `WorkerEvent::Message`
//! - waiter: waits for exit (or a kill request), lets the reader drain, then
//!   reports `WorkerEvent::Exited`, so a worker's last messages always
//!   arrive before its exit

use crate::error::{Result, SupervisorError};
use crate::worker::{ExitOutcome, WorkerEvent, WorkerHandle, WorkerKind, WorkerLauncher};
use kqm_common::config::{WorkerCommand, WorkersConfig};
use kqm_common::ipc::{EnvelopeReader, EnvelopeWriter};
use kqm_common::{Envelope, Error};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Environment variable telling a worker which role it was started for
pub const WORKER_ENV: &str = "KQM_WORKER";

/// How long to wait for a dead worker's stdout to drain. A grandchild that
/// inherited the pipe can keep it open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    server: WorkerCommand,
    scanner: WorkerCommand,
    env: Vec<(String, String)>,
}

impl ProcessLauncher {
    pub fn new(workers: &WorkersConfig) -> Self {
        Self {
            server: workers.server.clone(),
            scanner: workers.scanner.clone(),
            env: Vec::new(),
        }
    }

    /// Extra environment for every worker launched from now on
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command_for(&self, kind: WorkerKind) -> &WorkerCommand {
        match kind {
            WorkerKind::Server => &self.server,
            WorkerKind::Scanner => &self.scanner,
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        kind: WorkerKind,
        generation: u64,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<WorkerHandle> {
        let command = self.command_for(kind);
        let program = resolve_program(&command.program);

        let mut child = Command::new(&program)
            .args(&command.args)
            .env(WORKER_ENV, kind.name())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn { kind, source })?;

        let pid = child.id();
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe(kind, "stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe(kind, "stdout"))?;

        debug!("Launched {} ({}) pid {:?}", kind, program.display(), pid);

        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(write_loop(kind, stdin, outbox_rx));
        let reader = tokio::spawn(read_loop(kind, generation, stdout, events.clone()));
        tokio::spawn(wait_loop(kind, generation, child, kill_rx, reader, events));

        Ok(WorkerHandle::new(kind, generation, pid, outbox_tx, kill_tx))
    }
}

fn missing_pipe(kind: WorkerKind, pipe: &str) -> SupervisorError {
    SupervisorError::Spawn {
        kind,
        source: std::io::Error::new(std::io::ErrorKind::Other, format!("{} not captured", pipe)),
    }
}

/// A bare program name resolves to a sibling of the running executable when
/// one exists; anything else is handed to the OS as-is (PATH lookup).
fn resolve_program(program: &Path) -> PathBuf {
    if program.components().count() != 1 || program.is_absolute() {
        return program.to_path_buf();
    }

    let sibling = std::env::current_exe().ok().and_then(|exe| {
        let dir = exe.parent()?;
        let mut name = program.as_os_str().to_os_string();
        name.push(std::env::consts::EXE_SUFFIX);
        let candidate = dir.join(name);
        candidate.is_file().then_some(candidate)
    });

    sibling.unwrap_or_else(|| program.to_path_buf())
}

async fn write_loop(kind: WorkerKind, stdin: ChildStdin, mut outbox: mpsc::UnboundedReceiver<Envelope>) {
    let mut writer = EnvelopeWriter::new(stdin);
    while let Some(envelope) = outbox.recv().await {
        if let Err(e) = writer.send(&envelope).await {
            // Dropping the outbox makes further sends fail, which the
            // supervisor treats as the worker no longer running.
            warn!("Write to {} failed: {}", kind, e);
            break;
        }
    }
}

async fn read_loop(
    kind: WorkerKind,
    generation: u64,
    stdout: ChildStdout,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut reader = EnvelopeReader::new(BufReader::new(stdout));
    loop {
        match reader.next().await {
            Ok(Some(envelope)) => {
                let event = WorkerEvent::Message {
                    kind,
                    generation,
                    envelope,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(Error::Ipc(msg)) => warn!("Ignoring output from {}: {}", kind, msg),
            Err(e) => {
                warn!("Read from {} failed: {}", kind, e);
                break;
            }
        }
    }
}

async fn wait_loop(
    kind: WorkerKind,
    generation: u64,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    reader: JoinHandle<()>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    // A dropped handle resolves `kill` too; either way the worker goes.
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            info!("Killing {} (pid {:?})", kind, child.id());
            if let Err(e) = child.start_kill() {
                warn!("Kill {} failed: {}", kind, e);
            }
            child.wait().await
        }
    };

    let outcome = match status {
        Ok(status) => ExitOutcome::from(status),
        Err(e) => {
            warn!("Waiting on {} failed: {}", kind, e);
            ExitOutcome::Unknown
        }
    };

    if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
        warn!("{} stdout still open after exit; dropping remaining output", kind);
    }

    let _ = events.send(WorkerEvent::Exited {
        kind,
        generation,
        outcome,
    });
}
