//! The offset-estimation engine.
//!
//! `SyncEngine` drives one estimate through its states: probe both inputs,
//! check the duration difference, place sample windows, extract and correlate
//! each window, then aggregate the per-window offsets into a `SyncResult`.

mod errors;
mod state;
mod sync_engine;

pub use errors::{Side, SyncError};
pub use state::{EngineState, StateCallback};
pub use sync_engine::{EngineConfig, SyncEngine};
