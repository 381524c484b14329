//! # Mucklan Chores
//!
//! Weekly cleaning rotation.
//!
//! ```text
//! counter (StateStore) ──► assign(residents, tasks) ──► assignments
//!        ▲                                         │
//!        └──────────── save(next) ◄────────────────┘  (before delivery)
//! ```

pub mod persistence;
pub mod rotation;
pub mod store;

pub use persistence::{JobRun, SqliteStateStore};
pub use rotation::{Assignment, Rotation, RotationState, assign};
pub use store::{JsonStateStore, StateStore, open_store};
