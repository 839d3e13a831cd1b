//! Data model for the coordination protocol.
//!
//! Work items, labels, comments, snapshots, scope declarations, and the
//! epic/wave structure. Everything here is plain data; behavior lives in the
//! component modules (`claim`, `scope`, `phase`, `lock`, `recovery`, …).

pub mod item;
pub mod snapshot;
pub mod wave;

pub use item::{Comment, InvalidItemId, ItemId, Label, WorkItem, WorkerId};
pub use snapshot::{Decision, ScopeDeclaration, StateSnapshot};
pub use wave::{Epic, Wave, WaveGate};
