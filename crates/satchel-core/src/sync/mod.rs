//! Synchronization engine
//!
//! Reconciles the local cache with the remote store under intermittent
//! connectivity. Three parts: the [`ConflictResolver`] detects field-level
//! divergence and collapses it into one surviving record, the
//! [`SyncCoordinator`] owns the live subscription and the sync-state
//! machine, and [`merge_task_lists`] produces the single ordered view the
//! application displays.

mod coordinator;
mod merge;
mod resolver;

pub use coordinator::{ConflictResolutionResult, SyncCoordinator, SyncState, SyncStatus};
pub use merge::merge_task_lists;
pub use resolver::{merge_tasks, ConflictResolver, ResolutionOutcome};
