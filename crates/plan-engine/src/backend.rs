//! Backend adapter boundary and execution reports.
//!
//! Each entity type talks to one [`IndexBackend`]. The engine stages fully
//! routed document operations on it in emission order; the backend builds
//! and writes the actual documents. Execution is the only asynchronous
//! boundary in the engine and is crossed with boxed futures.

use futures::future::{join_all, BoxFuture};
use plan_types::{DocumentReference, EntityHandle, EntityReference};
use tracing::warn;

/// Future returned by a backend's execute call.
pub type ReportFuture = BoxFuture<'static, ExecutionReport>;

/// Staged-write boundary to one index.
pub trait IndexBackend: Send {
    /// Stage an add for a document known to be absent.
    fn add(&mut self, doc: DocumentReference, entity: EntityHandle);

    /// Stage an add-or-update for a document that may already exist.
    fn add_or_update(&mut self, doc: DocumentReference, entity: EntityHandle);

    /// Stage a delete.
    fn delete(&mut self, doc: DocumentReference);

    /// Prepare staged operations for execution, e.g. build documents.
    fn process(&mut self);

    /// Drop staged operations without executing them.
    fn discard(&mut self);

    /// Execute staged operations, reporting per-entity outcomes.
    ///
    /// The future must be self-contained: the backend instance may be
    /// dropped before the future completes.
    fn execute_and_report(&mut self) -> ReportFuture;
}

/// Outcome of executing one or more backends' staged operations.
///
/// A failure on one work item never hides the outcome of independent
/// items: the first error becomes the primary cause and every failing
/// entity stays listed.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    error: Option<anyhow::Error>,
    failing_entities: Vec<EntityReference>,
}

impl ExecutionReport {
    /// Report for a fully successful execution.
    pub fn success() -> Self {
        Self::default()
    }

    /// Report for a failed execution.
    pub fn failure(error: anyhow::Error, failing_entities: Vec<EntityReference>) -> Self {
        Self {
            error: Some(error),
            failing_entities,
        }
    }

    /// Whether every operation succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failing_entities.is_empty()
    }

    /// The primary failure cause, if any.
    ///
    /// The original backend error is preserved as-is and can be downcast.
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    /// Entities whose operations failed.
    pub fn failing_entities(&self) -> &[EntityReference] {
        &self.failing_entities
    }

    /// Fold another report into this one.
    ///
    /// The first error wins as primary cause; entities from later failures
    /// are still recorded.
    pub fn merge(&mut self, other: ExecutionReport) {
        let ExecutionReport {
            error,
            failing_entities,
        } = other;
        if let Some(error) = error {
            if self.error.is_none() {
                self.error = Some(error);
            } else {
                warn!(error = %error, "secondary backend failure folded into report");
            }
        }
        self.failing_entities.extend(failing_entities);
    }

    /// Await every report and merge them in completion-list order.
    pub async fn all_of(futures: Vec<ReportFuture>) -> ExecutionReport {
        let mut merged = ExecutionReport::success();
        for report in join_all(futures).await {
            merged.merge(report);
        }
        merged
    }

    /// Convert into a `Result`, surfacing the original failure cause.
    pub fn into_result(self) -> Result<(), anyhow::Error> {
        match self.error {
            Some(error) => Err(error),
            None if self.failing_entities.is_empty() => Ok(()),
            None => Err(anyhow::anyhow!(
                "indexing failed for entities: {}",
                self.failing_entities
                    .iter()
                    .map(|entity| entity.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}
