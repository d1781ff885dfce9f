//! Shard routing: computed routes, caller overrides, and purging stale
//! shards before writing to the current one.

use e2e_tests::{book, book_doc, BackendOp, TestHarness, BOOK};
use plan_types::EntityId;
use pretty_assertions::assert_eq;

#[test]
fn test_computed_shard_routes_the_document() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();

    plan.add(BOOK, None, None, Some(book(1, "Dune").with_shard("eu").handle()))
        .expect("add");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::Add(book_doc(1, Some("eu")))]
    );
}

#[test]
fn test_provided_key_overrides_computed_route() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();

    plan.add(
        BOOK,
        None,
        Some("us".to_string()),
        Some(book(1, "Dune").with_shard("eu").handle()),
    )
    .expect("add");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::Add(book_doc(1, Some("us")))]
    );
}

#[test]
fn test_shard_change_purges_old_shard_first() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();
    let moved = book(1, "Dune").with_shard("us").with_previous_shards(&["eu"]);

    plan.add_or_update(BOOK, None, None, Some(moved.handle()), None)
        .expect("update");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![
            BackendOp::Delete(book_doc(1, Some("eu"))),
            BackendOp::AddOrUpdate(book_doc(1, Some("us"))),
        ]
    );
}

#[test]
fn test_provided_key_update_still_purges_previous_shards() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();
    let moved = book(1, "Dune").with_shard("us").with_previous_shards(&["eu"]);

    plan.add_or_update(BOOK, None, Some("ap".to_string()), Some(moved.handle()), None)
        .expect("update");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![
            BackendOp::Delete(book_doc(1, Some("eu"))),
            BackendOp::AddOrUpdate(book_doc(1, Some("ap"))),
        ]
    );
}

#[test]
fn test_previous_route_equal_to_current_is_skipped() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();
    let stable = book(1, "Dune").with_shard("eu").with_previous_shards(&["eu"]);

    plan.add_or_update(BOOK, None, None, Some(stable.handle()), None)
        .expect("update");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::AddOrUpdate(book_doc(1, Some("eu")))]
    );
}

#[test]
fn test_duplicate_previous_routes_purge_once() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();
    let moved = book(1, "Dune")
        .with_shard("us")
        .with_previous_shards(&["eu", "eu", "ap"]);

    plan.add_or_update(BOOK, None, None, Some(moved.handle()), None)
        .expect("update");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![
            BackendOp::Delete(book_doc(1, Some("eu"))),
            BackendOp::Delete(book_doc(1, Some("ap"))),
            BackendOp::AddOrUpdate(book_doc(1, Some("us"))),
        ]
    );
}

#[test]
fn test_add_ignores_previous_shards() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();
    let fresh = book(1, "Dune").with_shard("us").with_previous_shards(&["eu"]);

    plan.add(BOOK, None, None, Some(fresh.handle())).expect("add");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::Add(book_doc(1, Some("us")))]
    );
}

#[test]
fn test_unindexed_book_purges_previous_shards_only() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();
    let retired = book(1, "Dune")
        .not_indexed()
        .with_shard("us")
        .with_previous_shards(&["eu"]);

    plan.add_or_update(BOOK, None, None, Some(retired.handle()), None)
        .expect("update");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::Delete(book_doc(1, Some("eu")))]
    );
}

#[test]
fn test_delete_purges_previous_and_current_shards() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();
    let moved = book(1, "Dune").with_shard("us").with_previous_shards(&["eu"]);

    plan.delete(BOOK, None, None, Some(moved.handle()))
        .expect("delete");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![
            BackendOp::Delete(book_doc(1, Some("eu"))),
            BackendOp::Delete(book_doc(1, Some("us"))),
        ]
    );
}

#[test]
fn test_identifier_only_delete_purges_with_provided_key() {
    let harness = TestHarness::new();
    let mut plan = harness.plan();

    plan.delete(BOOK, Some(EntityId::from(9)), Some("eu".to_string()), None)
        .expect("delete");
    plan.process().expect("process");

    assert_eq!(
        harness.book_ops.snapshot(),
        vec![BackendOp::Delete(book_doc(9, Some("eu")))]
    );
}
