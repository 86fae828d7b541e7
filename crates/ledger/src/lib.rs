pub mod error;
mod failure;
mod models;
mod state;

pub use crate::failure::FailureLog;
pub use crate::models::{FileState, PendingDelete, PendingUpload, Snapshot};
pub use crate::state::StateStore;
