//! Indexing plan engine: buffered entity-to-index synchronization.
//!
//! This crate buffers add / add-or-update / delete operations issued
//! against entities during a unit of work, coalesces them per identity,
//! resolves which related entities must be reindexed, and emits a minimal,
//! correctly routed set of document operations to per-type index backends.
//!
//! ## Key Components
//!
//! - [`IndexingPlan`]: one unit of work's buffered operations
//! - [`TypeBindings`] / [`TypeBinding`]: per-type capability registration
//! - [`EntityMapping`]: identifier extraction and document id mapping
//! - [`RouteProvider`]: current and previous shard routing
//! - [`ReindexResolver`]: dependency graph between entity types
//! - [`EntityLoader`]: batched loading of identifier-only operations
//! - [`IndexBackend`]: staged-write boundary to one index
//! - [`ExecutionReport`]: merged per-entity execution outcomes
//! - [`PlanError`]: engine error taxonomy
//!
//! ## Flow
//!
//! 1. Callers buffer operations on an [`IndexingPlan`]; repeated operations
//!    on one identity coalesce into a single net operation.
//! 2. `process()` batch-loads missing entities, runs reindexing resolution,
//!    and stages document operations on each type's backend.
//! 3. `execute_and_report()` flushes every backend and merges the returned
//!    futures into one [`ExecutionReport`].
//!
//! ## Example
//!
//! ```ignore
//! use plan_engine::{IndexingPlan, TypeBinding, TypeBindings};
//!
//! let mut bindings = TypeBindings::new();
//! bindings.register(
//!     TypeBinding::builder(BOOK, BookMapping, || Box::new(BookBackend::new()))
//!         .with_loader(BookLoader::new(pool))
//!         .build(),
//! );
//!
//! let mut plan = IndexingPlan::new(Arc::new(bindings));
//! plan.add(BOOK, None, None, Some(EntityHandle::new(book)))?;
//! plan.delete(BOOK, Some(42.into()), None, None)?;
//! let report = plan.execute_and_report().await?;
//! ```

pub mod backend;
pub mod binding;
pub mod error;
pub mod loading;
pub mod plan;
pub mod resolve;
pub mod routing;
mod state;
mod type_plan;

pub use backend::{ExecutionReport, IndexBackend, ReportFuture};
pub use binding::{EntityMapping, TypeBinding, TypeBindingBuilder, TypeBindings};
pub use error::PlanError;
pub use loading::EntityLoader;
pub use plan::IndexingPlan;
pub use resolve::{DirtySignal, NoOpReindexResolver, ReindexCollector, ReindexResolver};
pub use routing::{DefaultRouteProvider, RouteProvider};
