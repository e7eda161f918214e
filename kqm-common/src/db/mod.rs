//! Database initialization and the externally managed tables

pub mod init;
pub mod providers;
pub mod stars;

pub use init::*;
pub use providers::{list_providers, set_provider_enabled, upsert_provider, Provider};
pub use stars::{add_star, remove_star};
