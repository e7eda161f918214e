//! Worker supervision and message relay
//!
//! The supervisor owns one registry of running workers and is driven by a
//! single event loop: every worker message and every worker exit arrives on
//! one channel and is handled to completion before the next.
//!
//! Relay rules:
//! - server → scanner when the scanner is running; a scan-start while the
//!   scanner is not running launches it instead (the triggering message is
//!   not replayed)
//! - scanner → server, dropped if the server is gone
//! - a status report from the server also updates the host presenter

use crate::host::HostPresenter;
use crate::worker::{WorkerEvent, WorkerHandle, WorkerKind, WorkerLauncher, WorkerStatus};
use kqm_common::ipc::{SCANNER_WORKER_SCAN, SERVER_WORKER_STATUS};
use kqm_common::Envelope;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct Supervisor<L> {
    launcher: L,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    workers: HashMap<WorkerKind, WorkerHandle>,
    presenter: Option<Box<dyn HostPresenter>>,
    next_generation: u64,
}

impl<L: WorkerLauncher> Supervisor<L> {
    /// Create a supervisor and the receiving end of its event channel, to be
    /// handed back to [`Supervisor::run`].
    pub fn new(launcher: L) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            launcher,
            events_tx,
            workers: HashMap::new(),
            presenter: None,
            next_generation: 1,
        };
        (supervisor, events_rx)
    }

    pub fn with_presenter(mut self, presenter: Box<dyn HostPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn status(&self, kind: WorkerKind) -> WorkerStatus {
        if self.workers.contains_key(&kind) {
            WorkerStatus::Running
        } else {
            WorkerStatus::NotStarted
        }
    }

    pub fn start_server(&mut self) {
        self.start(WorkerKind::Server);
    }

    pub fn start_scanner(&mut self) {
        self.start(WorkerKind::Scanner);
    }

    /// Launch `kind` unless it is already running. A launch failure is
    /// logged and leaves the worker not started.
    fn start(&mut self, kind: WorkerKind) {
        if self.workers.contains_key(&kind) {
            debug!("{} already running", kind.label());
            return;
        }

        info!("Starting {}", kind.label().to_lowercase());

        let generation = self.next_generation;
        self.next_generation += 1;

        match self.launcher.launch(kind, generation, self.events_tx.clone()) {
            Ok(handle) => {
                debug!("{} pid {:?} (generation {})", kind, handle.pid(), generation);
                self.workers.insert(kind, handle);
            }
            Err(e) => error!("{}", e),
        }
    }

    pub fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Message {
                kind,
                generation,
                envelope,
            } => {
                if !self.is_current(kind, generation) {
                    debug!("Ignoring {} message from stale {} worker", envelope.kind, kind);
                    return;
                }
                self.on_message(kind, envelope);
            }
            WorkerEvent::Exited {
                kind,
                generation,
                outcome,
            } => {
                if !self.is_current(kind, generation) {
                    debug!("Ignoring exit of stale {} worker ({})", kind, outcome);
                    return;
                }
                if let Some(handle) = self.workers.remove(&kind) {
                    info!(
                        "{} {} after {}s",
                        kind.label(),
                        outcome,
                        handle.uptime().num_seconds()
                    );
                }
            }
        }
    }

    fn is_current(&self, kind: WorkerKind, generation: u64) -> bool {
        self.workers
            .get(&kind)
            .is_some_and(|handle| handle.generation() == generation)
    }

    fn on_message(&mut self, from: WorkerKind, envelope: Envelope) {
        if from == WorkerKind::Server && envelope.is(SERVER_WORKER_STATUS) {
            self.present_status(&envelope);
        }

        match from {
            WorkerKind::Server => {
                if self.workers.contains_key(&WorkerKind::Scanner) {
                    self.relay(WorkerKind::Scanner, envelope);
                } else if envelope.is(SCANNER_WORKER_SCAN) {
                    self.start_scanner();
                } else {
                    debug!("Dropping {}: scanner not running", envelope.kind);
                }
            }
            WorkerKind::Scanner => self.relay(WorkerKind::Server, envelope),
        }
    }

    fn present_status(&mut self, envelope: &Envelope) {
        if let Some(presenter) = self.presenter.as_mut() {
            let url = envelope.payload.get("url").unwrap_or(&Value::Null);
            presenter.set_status("url", url);
        }
    }

    /// Forward an envelope unchanged. A worker that can no longer accept
    /// messages is killed and treated as not running.
    fn relay(&mut self, to: WorkerKind, envelope: Envelope) {
        let Some(handle) = self.workers.get(&to) else {
            debug!("Dropping {}: {} not running", envelope.kind, to);
            return;
        };

        if let Err(e) = handle.send(envelope) {
            warn!("Relay to {} failed: {}", to, e);
            if let Some(mut handle) = self.workers.remove(&to) {
                handle.kill();
            }
        }
    }

    /// Forcibly terminate every running worker
    pub fn shutdown(&mut self) {
        for (kind, mut handle) in self.workers.drain() {
            info!("Stopping {} (pid {:?})", kind.label().to_lowercase(), handle.pid());
            handle.kill();
        }
    }

    /// Process worker events until `shutdown` resolves or the last running
    /// worker exits, then terminate whatever is still running.
    pub async fn run<F>(&mut self, mut events: mpsc::UnboundedReceiver<WorkerEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let exited = matches!(event, WorkerEvent::Exited { .. });
                    self.handle_event(event);
                    if exited && self.workers.is_empty() {
                        info!("No workers running");
                        break;
                    }
                }
            }
        }

        self.shutdown();
    }
}

impl<L> Drop for Supervisor<L> {
    fn drop(&mut self) {
        for handle in self.workers.values_mut() {
            handle.kill();
        }
    }
}
