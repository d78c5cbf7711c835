//! satchel-core - Core library for Satchel
//!
//! This crate contains the shared models, store boundaries, and the
//! offline-first synchronization logic used by all Satchel interfaces:
//! conflict detection and resolution, the realtime sync coordinator, the
//! display merge, and course import.

pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod store;
pub mod sync;

pub use config::SyncOptions;
pub use error::{Error, Result};
pub use models::{OwnerId, Task, TaskId};
pub use sync::{ConflictResolver, SyncCoordinator, SyncState, SyncStatus};
