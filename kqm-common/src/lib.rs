//! # KQM Common Library
//!
//! Shared code for the KQM supervisor and its worker processes:
//! - Error taxonomy
//! - Configuration loading and root folder resolution
//! - Database initialization, provider and favorite tables
//! - The media library engine (listing, filtering, ingestion, removal)
//! - IPC envelope and its line codec

pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod library;

pub use error::{Error, Result};
pub use ipc::Envelope;
pub use library::MediaLibrary;
