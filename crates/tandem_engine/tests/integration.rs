//! End-to-end passes against in-memory and scripted stores.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tandem_engine::{HealthStatus, HealthStore, Orchestrator, SyncError, SyncState};
use tandem_protocol::{Record, Side, UpdateKind};
use tandem_stores::{
    MemoryStore, Method, RetryPolicy, SchemaMapping, ScriptedClient, SecondaryConfig,
    SecondaryStore, StoreError, TranslationError,
};
use proptest::prelude::*;
use tandem_testkit::prelude::*;
use tempfile::TempDir;

type MemoryOrchestrator = Orchestrator<Arc<MemoryStore>, Arc<MemoryStore>>;

fn orchestrator(stores: &StorePair, dir: &TempDir) -> MemoryOrchestrator {
    Orchestrator::new(
        Arc::clone(&stores.primary),
        Arc::clone(&stores.secondary),
        HealthStore::new(dir.path().join("logs").join("last_success.json")),
    )
}

#[test]
fn new_primary_record_is_created_in_secondary() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([decision("Adopt Rust for services", "Architecture").with_primary_id("1")]);

    let report = orchestrator(&stores, &dir).run_pass(false).unwrap();

    assert_eq!(report.delta.create_in_secondary.len(), 1);
    assert_eq!(report.delta.total_changes(), 1);
    assert_eq!(report.statistics.created_in_secondary, 1);

    let pages = stores.secondary.records();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].primary_id.as_deref(), Some("1"));
    let row = stores.primary.get("1").unwrap();
    assert_eq!(row.secondary_id, pages[0].secondary_id);
    assert!(row.is_linked());
}

#[test]
fn newer_secondary_edit_flows_to_primary() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    let (row, page) = linked_pair("1", "page-1", "Keep Postgres", "Architecture");
    stores.primary.insert(row.with_updated_at(fixed_time(1)));
    stores.secondary.insert(page.with_updated_at(fixed_time(1)));
    stores
        .secondary
        .edit("page-1", |page| page.text = "Keep Postgres, add read replicas".into());

    let report = orchestrator(&stores, &dir).run_pass(false).unwrap();

    assert_eq!(report.delta.update_in_primary.len(), 1);
    assert_eq!(report.delta.update_in_primary[0].kind, UpdateKind::Content);
    assert!(report.delta.update_in_secondary.is_empty());
    assert_eq!(
        stores.primary.get("1").unwrap().text,
        "Keep Postgres, add read replicas"
    );
    assert!(stores.converged());
}

#[test]
fn matching_content_is_linked_without_rewriting() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([decision("Quarterly budget review", "Finance").with_primary_id("7")]);
    stores.seed_secondary([decision("  quarterly BUDGET review", "finance").with_secondary_id("page-9")]);

    let report = orchestrator(&stores, &dir).run_pass(false).unwrap();

    assert_eq!(report.delta.update_in_primary.len(), 1);
    assert_eq!(report.delta.update_in_primary[0].kind, UpdateKind::LinkOnly);
    assert_eq!(report.delta.total_changes(), 1);
    // Only the fingerprints were backfilled; no content was rewritten.
    assert_eq!(stores.primary.calls().upserts, 0);
    assert_eq!(stores.secondary.calls().upserts, 0);
    assert_eq!(stores.primary.calls().fingerprints, 1);
    assert_eq!(stores.secondary.calls().fingerprints, 1);
    assert_eq!(report.statistics.fingerprints_backfilled, 2);

    let row = stores.primary.get("7").unwrap();
    assert_eq!(row.text, "Quarterly budget review");
    assert_eq!(row.secondary_id.as_deref(), Some("page-9"));
    assert!(row.linked);
    assert_eq!(
        stores.secondary.get("page-9").unwrap().primary_id.as_deref(),
        Some("7")
    );
    assert_eq!(report.statistics.linked, 2);
}

#[test]
fn second_pass_is_empty() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([
        decision("Adopt Rust", "Architecture"),
        decision("Freeze hiring", "Hiring"),
    ]);
    stores.seed_secondary([
        decision("On-call rotation", "Ops"),
        decision("adopt rust", "architecture"),
    ]);
    stores.seed_linked("10", "page-10", "Quarterly planning", "Policy");

    let orchestrator = orchestrator(&stores, &dir);
    let first = orchestrator.run_pass(false).unwrap();
    assert!(first.statistics.is_success());
    assert!(!first.delta.is_empty());

    let second = orchestrator.run_pass(false).unwrap();
    assert!(second.delta.is_empty(), "{:?}", second.delta.summary());
    assert_eq!(stores.primary.len(), stores.secondary.len());
    assert!(stores.primary.records().iter().all(|r| r.is_linked()));
}

#[test]
fn fetch_failure_aborts_before_any_write() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::with_page_size(2);
    stores.seed_primary((0..10).map(|i| decision(&format!("row {i}"), "Ops")));
    stores.seed_secondary((0..10).map(|i| decision(&format!("page {i}"), "Ops")));
    stores.secondary.fail_fetch_page(Some(3));

    let orchestrator = orchestrator(&stores, &dir);
    let err = orchestrator.run_pass(false).unwrap_err();

    assert!(matches!(
        err,
        SyncError::Fetch {
            store: Side::Secondary,
            ..
        }
    ));
    assert_eq!(stores.writes(), 0);
    assert_eq!(orchestrator.state(), SyncState::Error);

    let health = orchestrator.health().load().unwrap().unwrap();
    assert_eq!(health.status, HealthStatus::Error);
    assert!(health.error_details[0].contains("page 3"));
}

#[test]
fn paged_fetch_failure_from_secondary_api_aborts_the_pass() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([decision("Adopt Rust", "Architecture")]);

    let client = ScriptedClient::new();
    client.push_json(json!({"object": "database", "id": "db-1"}));
    for n in 1..=2 {
        client.push_json(json!({
            "results": [notion_page(&format!("p{n}"), &format!("page {n}"))],
            "has_more": true,
            "next_cursor": format!("cursor-{}", n + 1),
        }));
    }
    for _ in 0..3 {
        client.push_status(503, "upstream unavailable");
    }
    for n in 4..=5 {
        client.push_json(json!({
            "results": [notion_page(&format!("p{n}"), &format!("page {n}"))],
            "has_more": n < 5,
            "next_cursor": if n < 5 { json!(format!("cursor-{}", n + 1)) } else { Value::Null },
        }));
    }
    let secondary = SecondaryStore::new(client, SecondaryConfig::new("token", "db-1").with_page_size(1))
        .with_retry(
            RetryPolicy::new(3)
                .with_initial_delay(Duration::ZERO)
                .with_jitter(false),
        );

    let orchestrator = Orchestrator::new(
        Arc::clone(&stores.primary),
        secondary,
        HealthStore::new(dir.path().join("health.json")),
    );
    let err = orchestrator.run_pass(false).unwrap_err();

    match err {
        SyncError::Fetch { store, source } => {
            assert_eq!(store, Side::Secondary);
            assert!(matches!(
                source,
                StoreError::RetriesExhausted { attempts: 3, .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Pages 4 and 5 were never requested and nothing was written.
    assert_eq!(orchestrator.secondary().client().remaining(), 2);
    assert_eq!(stores.primary.calls().writes(), 0);

    let run = orchestrator.last_run().unwrap();
    assert!(!run.is_success());
    assert_eq!(run.created(), 0);
}

#[test]
fn conflicting_edits_resolve_to_the_newer_side() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    let (row, page) = linked_pair("1", "page-1", "Original", "Policy");
    stores.primary.insert(row);
    stores.secondary.insert(page);

    // Secondary edited first, primary later: primary wins.
    stores.secondary.edit("page-1", |p| p.text = "Edited in pages".into());
    stores.primary.edit("1", |r| r.text = "Edited in database".into());

    let report = orchestrator(&stores, &dir).run_pass(false).unwrap();
    assert_eq!(report.statistics.updated_in_secondary, 1);
    assert_eq!(report.statistics.updated_in_primary, 0);
    assert_eq!(stores.secondary.get("page-1").unwrap().text, "Edited in database");
    assert!(stores.converged());
}

#[test]
fn dry_run_writes_nothing_but_records_health() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([Record::new("No fingerprint yet", "Ops", None)]);
    stores.seed_secondary([decision("Page only", "Policy")]);

    let orchestrator = orchestrator(&stores, &dir);
    let report = orchestrator.run_pass(true).unwrap();

    assert_eq!(report.delta.create_in_primary.len(), 1);
    assert_eq!(report.delta.create_in_secondary.len(), 1);
    assert_eq!(stores.writes(), 0);
    assert_eq!(report.statistics.created(), 0);
    assert_eq!(report.statistics.fingerprints_backfilled, 0);

    let plan = report.plan();
    assert_eq!(plan.summary.create_in_primary, 1);

    let health = orchestrator.health().load().unwrap().unwrap();
    assert!(health.dry_run);
    assert_eq!(health.status, HealthStatus::Success);
}

#[test]
fn failed_write_is_recorded_and_pass_continues() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([
        decision("Rejected by the API", "Ops").with_primary_id("1"),
        decision("Goes through", "Ops").with_primary_id("2"),
    ]);
    stores.secondary.fail_upsert_for("Rejected by the API");

    let orchestrator = orchestrator(&stores, &dir);
    let report = orchestrator.run_pass(false).unwrap();

    assert_eq!(report.statistics.created_in_secondary, 1);
    assert_eq!(report.statistics.errors.len(), 1);
    assert_eq!(report.statistics.errors[0].record, "1");
    assert!(!report.statistics.is_success());
    assert_eq!(orchestrator.state(), SyncState::Idle);

    let health = orchestrator.health().load().unwrap().unwrap();
    assert_eq!(health.status, HealthStatus::Error);
    assert_eq!(health.statistics.errors, 1);
}

#[test]
fn unreadable_page_withholds_its_counterpart() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([
        decision("Row whose page is unreadable", "Ops")
            .with_primary_id("1")
            .with_secondary_id("page-broken")
            .with_linked(true),
        decision("Fresh row", "Ops").with_primary_id("2"),
    ]);
    stores.secondary.add_untranslatable(
        TranslationError::new("page-broken", "date property is not an object")
            .with_counterpart(Some("1".into())),
    );

    let report = orchestrator(&stores, &dir).run_pass(false).unwrap();

    assert_eq!(report.statistics.quarantined, 1);
    assert_eq!(report.statistics.skipped.len(), 1);
    assert_eq!(report.statistics.created_in_secondary, 1);
    assert_eq!(stores.secondary.len(), 1);
    assert_eq!(
        stores.secondary.records()[0].primary_id.as_deref(),
        Some("2")
    );
}

#[test]
fn unreachable_store_aborts_in_connecting() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    stores.seed_primary([decision("a", "Ops")]);
    stores.secondary.set_unreachable(true);

    let orchestrator = orchestrator(&stores, &dir);
    let err = orchestrator.run_pass(false).unwrap_err();

    assert!(matches!(
        err,
        SyncError::Connectivity {
            store: Side::Secondary,
            ..
        }
    ));
    assert_eq!(stores.primary.calls().fetches, 0);
    assert_eq!(
        orchestrator.state_history(),
        vec![
            SyncState::Connecting,
            SyncState::Error,
            SyncState::Persisting,
            SyncState::Error
        ]
    );
}

#[test]
fn missing_fingerprints_are_backfilled_once() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    let (row, page) = linked_pair("1", "page-1", "Linked", "Ops");
    stores.primary.insert(Record {
        fingerprint: None,
        ..row
    });
    stores.secondary.insert(page);

    let orchestrator = orchestrator(&stores, &dir);
    let first = orchestrator.run_pass(false).unwrap();
    assert_eq!(first.statistics.fingerprints_backfilled, 1);
    assert!(first.delta.is_empty());
    assert!(stores.primary.get("1").unwrap().fingerprint.is_some());

    let second = orchestrator.run_pass(false).unwrap();
    assert_eq!(second.statistics.fingerprints_backfilled, 0);
}

#[test]
fn backfill_writes_only_the_fingerprint_of_a_disallowed_category() {
    let dir = TempDir::new().unwrap();
    let stores = StorePair::new();
    let (row, _) = linked_pair("1", "p1", "Close the books monthly", "Finance");
    stores.primary.insert(row);

    let client = ScriptedClient::new();
    client.push_json(json!({"object": "database", "id": "db-1"}));
    client.push_json(json!({
        "results": [{
            "object": "page",
            "id": "p1",
            "last_edited_time": "2024-03-02T10:00:00.000Z",
            "properties": {
                "Decision": {"title": [{"plain_text": "Close the books monthly"}]},
                "Type": {"multi_select": [{"name": "Finance"}]},
                "Date": {"date": {"start": "2024-03-01"}},
                "Primary ID": {"rich_text": [{"plain_text": "1"}]},
                "Synced": {"checkbox": true}
            }
        }],
        "has_more": false,
        "next_cursor": null,
    }));
    client.push_json(json!({"object": "page", "id": "p1", "properties": {}}));
    let secondary = SecondaryStore::new(client, SecondaryConfig::new("token", "db-1"))
        .with_mapping(SchemaMapping::decision_log().with_allowed_categories(vec!["Policy".into()]));

    let orchestrator = Orchestrator::new(
        Arc::clone(&stores.primary),
        secondary,
        HealthStore::new(dir.path().join("health.json")),
    );
    let report = orchestrator.run_pass(false).unwrap();

    assert!(report.delta.is_empty(), "{:?}", report.delta.summary());
    assert!(
        report.statistics.is_success(),
        "{:?}",
        report.statistics.error_details()
    );
    assert_eq!(report.statistics.fingerprints_backfilled, 1);

    let client = orchestrator.secondary().client();
    assert_eq!(client.remaining(), 0);
    let requests = client.requests();
    let patch = requests.last().unwrap();
    assert_eq!(patch.method, Method::Patch);
    assert!(patch.url.ends_with("pages/p1"));
    let properties = patch.body.as_ref().unwrap()["properties"].as_object().unwrap();
    assert_eq!(properties.len(), 1);
    assert!(properties.contains_key("Checksum"));

    let health = orchestrator.health().load().unwrap().unwrap();
    assert_eq!(health.status, HealthStatus::Success);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_store_pair_converges_in_one_pass((primary, secondary) in store_pair_strategy(16)) {
        let dir = TempDir::new().unwrap();
        let stores = StorePair::new();
        stores.seed_primary(primary);
        stores.seed_secondary(secondary);

        let orchestrator = orchestrator(&stores, &dir);
        let first = orchestrator.run_pass(false).unwrap();
        prop_assert!(first.statistics.is_success(), "{:?}", first.statistics.error_details());

        let second = orchestrator.run_pass(false).unwrap();
        prop_assert!(second.delta.is_empty(), "{:?}", second.delta.summary());
        prop_assert_eq!(stores.primary.len(), stores.secondary.len());
    }
}

fn notion_page(id: &str, text: &str) -> Value {
    json!({
        "object": "page",
        "id": id,
        "last_edited_time": "2024-03-02T10:00:00.000Z",
        "properties": {
            "Decision": {"title": [{"plain_text": text}]},
            "Type": {"multi_select": [{"name": "Ops"}]},
            "Date": {"date": null},
            "Synced": {"checkbox": false}
        }
    })
}
