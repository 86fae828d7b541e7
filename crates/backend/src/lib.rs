pub mod backend;
pub mod error;
mod models;

pub use crate::backend::IngestBackend;
pub use crate::models::{DocumentInfo, group_by_status, status};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn IngestBackend + Send + Sync>;
