//! Error types for kqm-supervisor

use crate::worker::WorkerKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The OS refused to start the worker process
    #[error("Failed to spawn {kind} worker: {source}")]
    Spawn {
        kind: WorkerKind,
        #[source]
        source: std::io::Error,
    },

    /// The worker's inbound channel is gone (process exiting or pipe broken)
    #[error("{0} worker channel closed")]
    ChannelClosed(WorkerKind),
}
