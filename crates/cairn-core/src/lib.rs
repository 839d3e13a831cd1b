//! cairn-core library.
//!
//! Leaderless coordination for memory-less workers over a shared issue
//! tracker. The tracker is the only channel: claims, scope declarations,
//! phase threads, locks, checkpoints, and decisions are all appended to
//! per-item comment logs and rebuilt by replaying them. Ordering is log
//! position; wall-clock timestamps are display-only.

pub mod broadcast;
pub mod checkpoint;
pub mod claim;
pub mod config;
pub mod error;
pub mod event;
pub mod lock;
pub mod model;
pub mod phase;
pub mod quota;
pub mod recovery;
pub mod scope;
pub mod session;
pub mod store;

pub use claim::{ClaimManager, ClaimOutcome, ReleaseAuthority};
pub use config::EngineConfig;
pub use error::{CoordError, ErrorCode};
pub use event::{Event, LogEvent, parse_comment, parse_log};
pub use model::item::{Comment, ItemId, Label, WorkItem, WorkerId};
pub use model::snapshot::{Decision, ScopeDeclaration, StateSnapshot};
pub use model::wave::{Epic, Wave, WaveGate};
pub use phase::{Phase, PhaseEvent, PhaseState, ThreadLedger};
pub use recovery::{RecoveredState, ResumePlan, WorkspaceProbe};
pub use session::{Acquisition, WorkerSession};
pub use store::{MemStore, WorkItemStore};

/// # Conventions
///
/// - **Errors**: protocol errors are [`CoordError`] with stable
///   [`ErrorCode`]s; configuration loading uses `anyhow::Result`.
/// - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`) at the
///   point where protocol state changes.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
