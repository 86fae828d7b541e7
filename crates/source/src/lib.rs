pub mod error;
mod models;
mod name;
pub mod source;

pub use crate::models::RemoteFileInfo;
pub use crate::name::validate as validate_name;
pub use crate::source::FileSource;
use std::sync::Arc;

pub type SourceHandle = Arc<dyn FileSource + Send + Sync>;
