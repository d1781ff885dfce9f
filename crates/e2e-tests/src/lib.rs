//! End-to-end test infrastructure for the indexing plan engine.
//!
//! Provides a shared TestHarness wiring a two-type book/author domain
//! to recording stub backends, plus helper functions for building
//! fixture entities and expected document references.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;

use plan_engine::{
    DirtySignal, EntityLoader, EntityMapping, ExecutionReport, IndexBackend, IndexingPlan,
    PlanError, ReindexCollector, ReindexResolver, ReportFuture, RouteProvider, TypeBinding,
    TypeBindings,
};
use plan_types::{
    DocumentReference, DocumentRoute, EntityHandle, EntityId, EntityReference, EntityTypeId,
    PathSet,
};

/// Entity type for book fixtures; integer identifiers, shard-routed.
pub const BOOK: EntityTypeId = EntityTypeId::new("book");
/// Entity type for author fixtures; string identifiers, default routing.
pub const AUTHOR: EntityTypeId = EntityTypeId::new("author");

/// Dirty-path ordinal for the book title field.
pub const BOOK_TITLE: usize = 0;
/// Dirty-path ordinal for the book shard field.
pub const BOOK_SHARD: usize = 1;
/// Dirty-path ordinal for the book stock count, which is not indexed.
pub const BOOK_STOCK: usize = 2;

/// Dirty-path ordinal for the author name field.
pub const AUTHOR_NAME: usize = 0;
/// Dirty-path ordinal for the author's private notes, which are not indexed.
pub const AUTHOR_NOTES: usize = 1;

/// Book fixture entity.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: i64,
    pub title: String,
    /// Shard the book is currently routed to; `None` means the default shard.
    pub shard: Option<String>,
    /// Shards the book may have been routed to before.
    pub previous_shards: Vec<String>,
    /// When false the book is excluded from the index entirely.
    pub indexed: bool,
    /// Author embedded in the book, visible to the book's reindex resolver.
    pub author: Option<Author>,
}

/// Author fixture entity.
#[derive(Debug, Clone)]
pub struct Author {
    pub id: String,
    pub name: String,
    /// Books embedded in the author, visible to the author's reindex resolver.
    pub books: Vec<Book>,
}

/// Create an indexed book with no shard assignment.
pub fn book(id: i64, title: &str) -> Book {
    Book {
        id,
        title: title.to_string(),
        shard: None,
        previous_shards: Vec::new(),
        indexed: true,
        author: None,
    }
}

impl Book {
    pub fn with_shard(mut self, shard: &str) -> Self {
        self.shard = Some(shard.to_string());
        self
    }

    pub fn with_previous_shards(mut self, shards: &[&str]) -> Self {
        self.previous_shards = shards.iter().map(|shard| shard.to_string()).collect();
        self
    }

    pub fn not_indexed(mut self) -> Self {
        self.indexed = false;
        self
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    /// Wrap a clone of this book as an opaque entity handle.
    pub fn handle(&self) -> EntityHandle {
        EntityHandle::new(self.clone())
    }
}

/// Create an author with no books.
pub fn author(id: &str, name: &str) -> Author {
    Author {
        id: id.to_string(),
        name: name.to_string(),
        books: Vec::new(),
    }
}

impl Author {
    pub fn with_books(mut self, books: Vec<Book>) -> Self {
        self.books = books;
        self
    }

    /// Wrap a clone of this author as an opaque entity handle.
    pub fn handle(&self) -> EntityHandle {
        EntityHandle::new(self.clone())
    }
}

/// One document operation recorded by a stub backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    Add(DocumentReference),
    AddOrUpdate(DocumentReference),
    Delete(DocumentReference),
}

/// Shared, thread-safe log of the operations a type's backends received.
#[derive(Clone, Default)]
pub struct OpLog {
    ops: Arc<Mutex<Vec<BackendOp>>>,
}

impl OpLog {
    pub fn record(&self, op: BackendOp) {
        self.ops.lock().expect("op log lock poisoned").push(op);
    }

    /// Copy of every operation recorded so far, in arrival order.
    pub fn snapshot(&self) -> Vec<BackendOp> {
        self.ops.lock().expect("op log lock poisoned").clone()
    }

    pub fn clear(&self) {
        self.ops.lock().expect("op log lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.ops.lock().expect("op log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lifecycle counters shared by every stub backend of one type.
#[derive(Debug, Default)]
pub struct BackendCounters {
    /// Number of `process` calls.
    pub processed: AtomicUsize,
    /// Number of `discard` calls.
    pub discarded: AtomicUsize,
    /// Number of `execute_and_report` calls.
    pub executed: AtomicUsize,
}

impl BackendCounters {
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

/// Error injected into failing backend executions; tests downcast to it
/// to check that the original cause survives report merging.
#[derive(Debug)]
pub struct BackendFailure(pub String);

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendFailure {}

/// Stub backend that records staged operations into an [`OpLog`] and
/// reports the entities it would have written.
pub struct RecordingBackend {
    log: OpLog,
    counters: Arc<BackendCounters>,
    fail_with: Arc<Mutex<Option<String>>>,
    staged: Vec<EntityReference>,
}

impl RecordingBackend {
    pub fn new(
        log: OpLog,
        counters: Arc<BackendCounters>,
        fail_with: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            log,
            counters,
            fail_with,
            staged: Vec::new(),
        }
    }
}

impl IndexBackend for RecordingBackend {
    fn add(&mut self, document: DocumentReference, _entity: EntityHandle) {
        self.staged.push(document.entity.clone());
        self.log.record(BackendOp::Add(document));
    }

    fn add_or_update(&mut self, document: DocumentReference, _entity: EntityHandle) {
        self.staged.push(document.entity.clone());
        self.log.record(BackendOp::AddOrUpdate(document));
    }

    fn delete(&mut self, document: DocumentReference) {
        self.staged.push(document.entity.clone());
        self.log.record(BackendOp::Delete(document));
    }

    fn process(&mut self) {
        self.counters.processed.fetch_add(1, Ordering::SeqCst);
    }

    fn discard(&mut self) {
        self.counters.discarded.fetch_add(1, Ordering::SeqCst);
    }

    fn execute_and_report(&mut self) -> ReportFuture {
        self.counters.executed.fetch_add(1, Ordering::SeqCst);
        let staged = std::mem::take(&mut self.staged);
        let failure = self.fail_with.lock().expect("failure lock poisoned").clone();
        async move {
            match failure {
                Some(message) => {
                    ExecutionReport::failure(anyhow::Error::new(BackendFailure(message)), staged)
                }
                None => ExecutionReport::success(),
            }
        }
        .boxed()
    }
}

struct BookMapping;

impl EntityMapping for BookMapping {
    fn entity_id(&self, entity: &EntityHandle) -> Result<EntityId, PlanError> {
        entity
            .downcast_ref::<Book>()
            .map(|book| EntityId::from(book.id))
            .ok_or(PlanError::WrongEntityType { type_id: BOOK })
    }

    fn affects_own_document(&self, dirty_paths: &PathSet) -> bool {
        dirty_paths.contains(BOOK_TITLE) || dirty_paths.contains(BOOK_SHARD)
    }
}

struct AuthorMapping;

impl EntityMapping for AuthorMapping {
    fn entity_id(&self, entity: &EntityHandle) -> Result<EntityId, PlanError> {
        entity
            .downcast_ref::<Author>()
            .map(|author| EntityId::from(author.id.clone()))
            .ok_or(PlanError::WrongEntityType { type_id: AUTHOR })
    }

    fn affects_own_document(&self, dirty_paths: &PathSet) -> bool {
        dirty_paths.contains(AUTHOR_NAME)
    }
}

/// Routes books to their shard; unindexed books get no current route.
struct BookRoutes;

impl RouteProvider for BookRoutes {
    fn current_route(&self, _id: &EntityId, entity: &EntityHandle) -> Option<DocumentRoute> {
        let book = entity.downcast_ref::<Book>()?;
        if !book.indexed {
            return None;
        }
        match &book.shard {
            Some(shard) => Some(DocumentRoute::new(shard.clone())),
            None => Some(DocumentRoute::unrouted()),
        }
    }

    fn previous_routes(
        &self,
        current: Option<&DocumentRoute>,
        _id: &EntityId,
        entity: &EntityHandle,
    ) -> Vec<DocumentRoute> {
        let _ = current;
        match entity.downcast_ref::<Book>() {
            Some(book) => book
                .previous_shards
                .iter()
                .map(|shard| DocumentRoute::new(shard.clone()))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Marks the embedded author for reindexing when the book title changes.
struct BookResolver;

impl ReindexResolver for BookResolver {
    fn resolve(
        &self,
        _id: &EntityId,
        entity: &EntityHandle,
        dirtiness: DirtySignal<'_>,
        collector: &mut dyn ReindexCollector,
    ) -> anyhow::Result<()> {
        let book = entity
            .downcast_ref::<Book>()
            .ok_or_else(|| anyhow::anyhow!("expected a book instance"))?;
        if !dirtiness.is_dirty(&PathSet::from_paths([BOOK_TITLE])) {
            return Ok(());
        }
        if let Some(author) = &book.author {
            collector.mark_for_reindexing(AUTHOR, EntityHandle::new(author.clone()));
        }
        Ok(())
    }
}

/// Marks the embedded books for reindexing when the author name changes.
struct AuthorResolver;

impl ReindexResolver for AuthorResolver {
    fn resolve(
        &self,
        _id: &EntityId,
        entity: &EntityHandle,
        dirtiness: DirtySignal<'_>,
        collector: &mut dyn ReindexCollector,
    ) -> anyhow::Result<()> {
        let author = entity
            .downcast_ref::<Author>()
            .ok_or_else(|| anyhow::anyhow!("expected an author instance"))?;
        if !dirtiness.is_dirty(&PathSet::from_paths([AUTHOR_NAME])) {
            return Ok(());
        }
        for book in &author.books {
            collector.mark_for_reindexing(BOOK, EntityHandle::new(book.clone()));
        }
        Ok(())
    }
}

/// One batch of identifiers the book loader was asked for.
#[derive(Debug, Clone)]
pub struct LoadCall {
    pub ids: Vec<EntityId>,
    pub deadline: Option<Instant>,
}

/// Loads books from an in-memory store, recording every batch it serves.
struct BookLoader {
    store: Arc<Mutex<HashMap<i64, Book>>>,
    calls: Arc<Mutex<Vec<LoadCall>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl EntityLoader for BookLoader {
    fn load_blocking(
        &self,
        ids: &[EntityId],
        deadline: Option<Instant>,
    ) -> anyhow::Result<Vec<Option<EntityHandle>>> {
        if let Some(message) = self.fail_with.lock().expect("loader lock poisoned").clone() {
            anyhow::bail!("{message}");
        }
        self.calls
            .lock()
            .expect("loader lock poisoned")
            .push(LoadCall {
                ids: ids.to_vec(),
                deadline,
            });
        let store = self.store.lock().expect("store lock poisoned");
        Ok(ids
            .iter()
            .map(|id| match id {
                EntityId::Int(value) => store.get(value).map(|book| EntityHandle::new(book.clone())),
                EntityId::Str(_) => None,
            })
            .collect())
    }
}

/// Shared test harness wiring the book/author domain to stub backends.
///
/// Books are shard-routed, loadable from an in-memory store, and marked
/// for reindexing when their author's name changes. Authors use default
/// routing and have no loader.
pub struct TestHarness {
    /// Registered bindings for [`BOOK`] and [`AUTHOR`]
    pub bindings: Arc<TypeBindings>,
    /// Operations recorded by book backends
    pub book_ops: OpLog,
    /// Operations recorded by author backends
    pub author_ops: OpLog,
    /// Lifecycle counters for book backends
    pub book_counters: Arc<BackendCounters>,
    /// Lifecycle counters for author backends
    pub author_counters: Arc<BackendCounters>,
    /// Books the loader can serve, keyed by identifier
    pub book_store: Arc<Mutex<HashMap<i64, Book>>>,
    book_loads: Arc<Mutex<Vec<LoadCall>>>,
    book_failure: Arc<Mutex<Option<String>>>,
    book_load_failure: Arc<Mutex<Option<String>>>,
}

impl TestHarness {
    /// Create a harness with both entity types registered.
    pub fn new() -> Self {
        let book_ops = OpLog::default();
        let author_ops = OpLog::default();
        let book_counters = Arc::new(BackendCounters::default());
        let author_counters = Arc::new(BackendCounters::default());
        let book_store = Arc::new(Mutex::new(HashMap::new()));
        let book_loads = Arc::new(Mutex::new(Vec::new()));
        let book_failure = Arc::new(Mutex::new(None));
        let book_load_failure = Arc::new(Mutex::new(None));

        let mut bindings = TypeBindings::new();

        let log = book_ops.clone();
        let counters = Arc::clone(&book_counters);
        let failure = Arc::clone(&book_failure);
        bindings.register(
            TypeBinding::builder(BOOK, BookMapping, move || {
                Box::new(RecordingBackend::new(
                    log.clone(),
                    Arc::clone(&counters),
                    Arc::clone(&failure),
                ))
            })
            .with_routes(BookRoutes)
            .with_resolver(BookResolver)
            .with_loader(BookLoader {
                store: Arc::clone(&book_store),
                calls: Arc::clone(&book_loads),
                fail_with: Arc::clone(&book_load_failure),
            })
            .build(),
        );

        let log = author_ops.clone();
        let counters = Arc::clone(&author_counters);
        bindings.register(
            TypeBinding::builder(AUTHOR, AuthorMapping, move || {
                Box::new(RecordingBackend::new(
                    log.clone(),
                    Arc::clone(&counters),
                    Arc::new(Mutex::new(None)),
                ))
            })
            .with_resolver(AuthorResolver)
            .build(),
        );

        Self {
            bindings: Arc::new(bindings),
            book_ops,
            author_ops,
            book_counters,
            author_counters,
            book_store,
            book_loads,
            book_failure,
            book_load_failure,
        }
    }

    /// Fresh indexing plan over this harness's bindings.
    pub fn plan(&self) -> IndexingPlan {
        IndexingPlan::new(Arc::clone(&self.bindings))
    }

    /// Make a book loadable by identifier.
    pub fn insert_book(&self, book: Book) {
        self.book_store
            .lock()
            .expect("store lock poisoned")
            .insert(book.id, book);
    }

    /// Make every book backend execution fail with the given message.
    pub fn fail_book_backend(&self, message: &str) {
        *self.book_failure.lock().expect("failure lock poisoned") = Some(message.to_string());
    }

    /// Make every book load fail with the given message.
    pub fn fail_book_loads(&self, message: &str) {
        *self.book_load_failure.lock().expect("loader lock poisoned") = Some(message.to_string());
    }

    /// Identifier batches the book loader has served so far.
    pub fn book_load_calls(&self) -> Vec<LoadCall> {
        self.book_loads.lock().expect("loader lock poisoned").clone()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Expected document reference for a book operation.
pub fn book_doc(id: i64, routing_key: Option<&str>) -> DocumentReference {
    DocumentReference::new(
        id.to_string(),
        routing_key.map(str::to_string),
        EntityReference::new(BOOK, EntityId::from(id)),
    )
}

/// Expected document reference for an author operation.
pub fn author_doc(id: &str) -> DocumentReference {
    DocumentReference::new(
        id.to_string(),
        None,
        EntityReference::new(AUTHOR, EntityId::from(id)),
    )
}
