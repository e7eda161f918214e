//! kqm-supervisor library
//!
//! Owns the two worker processes ("server" and "scanner"), relays IPC
//! envelopes between them, and forwards status reports to an optional host
//! presenter (e.g. a tray icon showing the connection URL).

pub mod error;
pub mod host;
pub mod process;
pub mod supervisor;
pub mod worker;

pub use error::{Result, SupervisorError};
pub use host::{HostPresenter, LogPresenter};
pub use process::ProcessLauncher;
pub use supervisor::Supervisor;
pub use worker::{ExitOutcome, WorkerEvent, WorkerHandle, WorkerKind, WorkerLauncher, WorkerStatus};
