//! Shared fixtures for engine tests.

use crate::{EngineOptions, SyncEngine};
use docsink_backend::backend::MockIngestBackend;
use docsink_ledger::{FailureLog, StateStore};
use docsink_preprocess::{IdentityPreprocessor, PreprocessorHandle};
use docsink_source::source::MockSource;
use std::sync::Arc;

/// An engine wired to scriptable mocks, with its ledger in a temp dir.
pub(crate) struct Rig {
    pub dir: tempfile::TempDir,
    pub source: Arc<MockSource>,
    pub backend: Arc<MockIngestBackend>,
    pub engine: SyncEngine,
}

impl Rig {
    pub fn new(options: EngineOptions) -> Self {
        Self::with_preprocessor(options, Arc::new(IdentityPreprocessor))
    }

    pub fn with_preprocessor(options: EngineOptions, preprocessor: PreprocessorHandle) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = Arc::new(MockSource::default());
        let backend = Arc::new(MockIngestBackend::new());
        let engine = SyncEngine::new(
            source.clone(),
            backend.clone(),
            preprocessor,
            StateStore::new(dir.path().join("state.json")),
            FailureLog::new(dir.path().join("failures.log"), 1024),
            options,
        );
        Self {
            dir,
            source,
            backend,
            engine,
        }
    }
}

pub(crate) fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}
