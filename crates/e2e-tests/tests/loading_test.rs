//! Deferred batch loading for identifier-only operations.

use std::time::{Duration, Instant};

use e2e_tests::{book, book_doc, BackendOp, TestHarness, AUTHOR, BOOK};
use plan_engine::PlanError;
use plan_types::EntityId;
use pretty_assertions::assert_eq;

#[test]
fn test_identifier_only_updates_load_in_one_batch() {
    let harness = TestHarness::new();
    harness.insert_book(book(1, "Dune"));
    harness.insert_book(book(2, "Foundation"));
    let mut plan = harness.plan();

    plan.add_or_update(BOOK, Some(EntityId::from(2)), None, None, None)
        .expect("update");
    plan.add_or_update(BOOK, Some(EntityId::from(1)), None, None, None)
        .expect("update");
    plan.process().expect("process");

    let calls = harness.book_load_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].ids, vec![EntityId::from(2), EntityId::from(1)]);
    assert_eq!(
        harness.book_ops.snapshot(),
        vec![
            BackendOp::AddOrUpdate(book_doc(2, None)),
            BackendOp::AddOrUpdate(book_doc(1, None)),
        ]
    );
}

#[test]
fn test_entity_ful_operations_do_not_load() {
    let harness = TestHarness::new();
    harness.insert_book(book(1, "Dune"));
    let mut plan = harness.plan();

    plan.add_or_update(BOOK, None, None, Some(book(2, "Foundation").handle()), None)
        .expect("update");
    plan.add_or_update(BOOK, Some(EntityId::from(1)), None, None, None)
        .expect("update");
    plan.process().expect("process");

    let calls = harness.book_load_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].ids, vec![EntityId::from(1)]);
    assert_eq!(
        harness.book_ops.snapshot(),
        vec![
            BackendOp::AddOrUpdate(book_doc(2, None)),
            BackendOp::AddOrUpdate(book_doc(1, None)),
        ]
    );
}

#[test]
fn test_loaded_instances_feed_routing() {
    let harness = TestHarness::new();
    harness.insert_book(book(3, "Hyperion").with_shard("us"));
    let mut plan = harness.plan();

    plan.add(BOOK, Some(EntityId::from(3)), None, None)
        .expect("add");
    plan.process().expect("process");

    assert_eq!(harness.book_load_calls().len(), 1);
    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::Add(book_doc(3, Some("us")))]
    );
}

#[test]
fn test_missing_entity_is_assumed_deleted() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();

    plan.add_or_update(BOOK, Some(EntityId::from(99)), None, None, None)
        .expect("update");
    plan.process().expect("process");

    assert_eq!(harness.book_load_calls().len(), 1);
    assert!(harness.book_ops.is_empty());
}

#[test]
fn test_delete_by_identifier_needs_no_load() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();

    plan.delete(BOOK, Some(EntityId::from(5)), Some("eu".to_string()), None)
        .expect("delete");
    plan.process().expect("process");

    assert!(harness.book_load_calls().is_empty());
    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::Delete(book_doc(5, Some("eu")))]
    );
}

#[test]
fn test_load_failure_aborts_processing() {
    let harness = TestHarness::new();
    harness.fail_book_loads("replica down");
    let mut plan = harness.plan();

    plan.add_or_update(BOOK, Some(EntityId::from(1)), None, None, None)
        .expect("update");
    let err = plan.process().expect_err("load failure must abort processing");

    match err {
        PlanError::Load { type_id, source } => {
            assert_eq!(type_id, BOOK);
            assert!(source.to_string().contains("replica down"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.book_ops.is_empty());
}

#[test]
fn test_missing_loader_rejects_identifier_only_update() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();

    plan.add_or_update(AUTHOR, Some(EntityId::from("a-1")), None, None, None)
        .expect("update");
    let err = plan.process().expect_err("authors have no loader");

    assert!(matches!(err, PlanError::MissingLoader { type_id } if type_id == AUTHOR));
    assert!(harness.author_ops.is_empty());
}

#[test]
fn test_deadline_reaches_the_loader() {
    let harness = TestHarness::new();
    harness.insert_book(book(7, "Dust"));
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut plan = harness.plan().with_deadline(deadline);

    plan.add_or_update(BOOK, Some(EntityId::from(7)), None, None, None)
        .expect("update");
    plan.process().expect("process");

    let calls = harness.book_load_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].deadline, Some(deadline));
}
