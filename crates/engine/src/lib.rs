//! The docsink synchronization engine.
//!
//! Reconciles three authorities — the live source listing, the persisted
//! local state, and the backend's document set — while tolerating a busy
//! backend, asynchronous upload results, crash-restart, and files mutated
//! during downtime.
//!
//! One engine instance is one process-wide task: startup reconciliation
//! runs to completion before the first poll tick, and ticks never overlap
//! (the next tick is scheduled a fixed delay after the previous one
//! returns).

pub mod error;

mod hash;
mod options;
mod pending;
mod startup;
mod stats;
mod temp;
#[cfg(test)]
mod testing;
mod tick;
mod upload;

pub use crate::options::{EngineOptions, StartupSync};
pub use crate::stats::SyncStats;

use crate::error::{ErrorKind, Result};
use docsink_backend::BackendHandle;
use docsink_ledger::{FailureLog, StateStore};
use docsink_preprocess::PreprocessorHandle;
use docsink_source::SourceHandle;
use exn::ResultExt;
use std::time::Duration;
use tokio::sync::watch;

/// The one-way synchronization engine.
///
/// All collaborators are injected at construction; the engine owns the
/// durable ledger and drives everything else through its capability
/// handles.
pub struct SyncEngine {
    source: SourceHandle,
    backend: BackendHandle,
    preprocessor: PreprocessorHandle,
    store: StateStore,
    failures: FailureLog,
    options: EngineOptions,
}

impl SyncEngine {
    pub fn new(
        source: SourceHandle,
        backend: BackendHandle,
        preprocessor: PreprocessorHandle,
        store: StateStore,
        failures: FailureLog,
        options: EngineOptions,
    ) -> Self {
        Self {
            source,
            backend,
            preprocessor,
            store,
            failures,
            options,
        }
    }

    /// Access to the durable state (the daemon saves through the engine;
    /// this is for inspection).
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run until `shutdown` flips to `true`: startup reconciliation once,
    /// then fixed-delay poll ticks. A graceful shutdown finishes the
    /// current tick, saves, and returns.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let stats = self.startup_sync().await?;
        tracing::info!(
            uploaded = stats.uploaded,
            deleted = stats.deleted,
            stale = stats.stale,
            failed = stats.failed,
            "Startup reconciliation finished",
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {},
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown request.
                    match changed {
                        Ok(()) if !*shutdown.borrow() => continue,
                        _ => break,
                    }
                },
            }
            match self.poll_tick().await {
                Ok(stats) if stats.is_noop() => tracing::debug!("Poll tick: nothing to do"),
                Ok(stats) => tracing::info!(
                    uploaded = stats.uploaded,
                    deleted = stats.deleted,
                    failed = stats.failed,
                    "Poll tick finished",
                ),
                // A tick never aborts the daemon; whatever failed is
                // retried on the next interval.
                Err(e) => tracing::error!(error = ?e, "Poll tick failed"),
            }
        }
        self.store.save().await.or_raise(|| ErrorKind::Ledger)?;
        tracing::info!("Engine shut down");
        Ok(())
    }
}
