//! End-to-end reconciliation runs against fake sources and a temporary dataset file.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use wattfeed_core::{
    Dataset, Event, EventSource, EventStore, ReconcileError, Reconciler, RunOutcome, SourceError,
    SourceId, SourceMeta,
};

struct FakeSource {
    meta: SourceMeta,
    result: Result<Vec<Event>, String>,
}

impl FakeSource {
    fn ok(name: &str, events: Vec<Event>) -> Arc<dyn EventSource> {
        Arc::new(Self {
            meta: meta(name),
            result: Ok(events),
        })
    }

    fn failing(name: &str) -> Arc<dyn EventSource> {
        Arc::new(Self {
            meta: meta(name),
            result: Err("upstream unavailable".to_owned()),
        })
    }
}

fn meta(name: &str) -> SourceMeta {
    SourceMeta {
        id: SourceId(name.to_owned()),
        name: name.to_owned(),
    }
}

#[async_trait]
impl EventSource for FakeSource {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    async fn fetch(&self) -> Result<Vec<Event>, SourceError> {
        self.result.clone().map_err(SourceError::Internal)
    }
}

struct PanickingSource {
    meta: SourceMeta,
}

#[async_trait]
impl EventSource for PanickingSource {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    #[expect(clippy::panic, reason = "exercises task failure isolation")]
    async fn fetch(&self) -> Result<Vec<Event>, SourceError> {
        panic!("source blew up");
    }
}

fn day(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn window(day_of_month: u32, hour: u32) -> Event {
    let start = day(day_of_month, hour);
    Event::new(start, start + Duration::hours(1), "", None)
}

fn store_with(dir: &Path, events: Vec<Event>) -> EventStore {
    let store = EventStore::new(dir.join("free_electricity.json"));
    let mut dataset = Dataset::new(events);
    dataset.assign_codes();
    store.save(&dataset).expect("seed dataset");
    store
}

#[tokio::test]
async fn first_run_publishes_both_sources() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = EventStore::new(dir.path().join("free_electricity.json"));
    let reconciler = Reconciler::new(
        store.clone(),
        FakeSource::ok("primary", vec![window(3, 12)]),
        FakeSource::ok("secondary", vec![window(1, 12), window(2, 12)]),
    );

    let outcome = reconciler.run().await.expect("run succeeds");

    assert_eq!(
        outcome,
        RunOutcome::Published {
            previous: 0,
            count: 3,
            primary: 1,
            secondary: 2
        },
        "all events published"
    );
    let published = store.load().expect("load published");
    let codes: Vec<&str> = published.events().iter().map(|ev| ev.code.as_str()).collect();
    let starts: Vec<DateTime<Utc>> = published.events().iter().map(|ev| ev.start).collect();
    assert_eq!(codes, vec!["1", "2", "3"], "codes follow start order");
    assert_eq!(starts, vec![day(1, 12), day(2, 12), day(3, 12)], "sorted by start");
}

#[tokio::test]
async fn failed_primary_does_not_abort_run() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = store_with(dir.path(), vec![window(5, 8)]);
    let reconciler = Reconciler::new(
        store.clone(),
        FakeSource::failing("primary"),
        FakeSource::ok("secondary", vec![window(1, 12), window(2, 12)]),
    );

    let outcome = reconciler.run().await.expect("source failure is not fatal");

    assert!(
        matches!(outcome, RunOutcome::Published { count: 3, primary: 0, .. }),
        "secondary and existing events kept: {outcome:?}"
    );
    assert_eq!(store.load().expect("load").len(), 3, "three events on disk");
}

#[tokio::test]
async fn panicking_source_is_isolated() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = EventStore::new(dir.path().join("free_electricity.json"));
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(PanickingSource {
            meta: meta("primary"),
        }),
        FakeSource::ok("secondary", vec![window(1, 12)]),
    );

    let outcome = reconciler.run().await.expect("panic is contained");

    assert!(
        matches!(outcome, RunOutcome::Published { count: 1, .. }),
        "secondary still published: {outcome:?}"
    );
}

#[tokio::test]
async fn primary_copy_wins_over_secondary_and_existing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut stale = window(1, 10);
    stale.is_test = Some(true);
    let store = store_with(dir.path(), vec![stale]);

    let mut from_secondary = window(1, 10);
    from_secondary.is_test = Some(false);
    let from_primary = window(1, 10);
    let reconciler = Reconciler::new(
        store.clone(),
        FakeSource::ok("primary", vec![from_primary, window(1, 12)]),
        FakeSource::ok("secondary", vec![from_secondary]),
    );

    reconciler.run().await.expect("run succeeds");

    let published = store.load().expect("load");
    assert_eq!(published.len(), 2, "duplicate key collapsed");
    assert_eq!(
        published.events().first().and_then(|ev| ev.is_test),
        None,
        "primary copy replaced both older copies"
    );
}

#[tokio::test]
async fn unchanged_run_leaves_file_untouched() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = store_with(dir.path(), vec![window(1, 12), window(2, 12)]);
    // Hand-edited codes prove the file is not rewritten with fresh ones.
    let path = store.path().to_path_buf();
    let original = fs::read_to_string(&path)
        .expect("read seed")
        .replace("\"code\": \"1\"", "\"code\": \"legacy\"");
    fs::write(&path, &original).expect("rewrite seed");
    let modified_before = fs::metadata(&path).and_then(|md| md.modified()).expect("mtime");

    let reconciler = Reconciler::new(
        store.clone(),
        FakeSource::ok("primary", vec![window(2, 12)]),
        FakeSource::ok("secondary", vec![window(1, 12), window(2, 12)]),
    );

    let outcome = reconciler.run().await.expect("run succeeds");

    assert_eq!(outcome, RunOutcome::Unchanged { count: 2 }, "no write needed");
    assert_eq!(fs::read_to_string(&path).expect("read"), original, "content untouched");
    let modified_after = fs::metadata(&path).and_then(|md| md.modified()).expect("mtime");
    assert_eq!(modified_before, modified_after, "mtime untouched");
}

#[tokio::test]
async fn both_sources_failing_is_a_no_op() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = store_with(dir.path(), vec![window(1, 12)]);
    let reconciler = Reconciler::new(
        store,
        FakeSource::failing("primary"),
        FakeSource::failing("secondary"),
    );

    let outcome = reconciler.run().await.expect("run succeeds");

    assert_eq!(outcome, RunOutcome::Unchanged { count: 1 }, "existing data kept");
}

#[tokio::test]
async fn shrinking_merge_is_refused() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("free_electricity.json");
    // Five rows but only three distinct windows, as left behind by a corrupt foreign response.
    let seeded = r#"{
  "data": [
    {"start": "2025-01-01T12:00:00.000Z", "end": "2025-01-01T13:00:00.000Z", "code": "1"},
    {"start": "2025-01-01T12:00:00.000Z", "end": "2025-01-01T13:00:00.000Z", "code": "2"},
    {"start": "2025-01-02T12:00:00.000Z", "end": "2025-01-02T13:00:00.000Z", "code": "3"},
    {"start": "2025-01-02T12:00:00.000Z", "end": "2025-01-02T13:00:00.000Z", "code": "4"},
    {"start": "2025-01-03T12:00:00.000Z", "end": "2025-01-03T13:00:00.000Z", "code": "5"}
  ]
}"#;
    fs::write(&path, seeded).expect("seed");
    let reconciler = Reconciler::new(
        EventStore::new(&path),
        FakeSource::failing("primary"),
        FakeSource::ok("secondary", vec![window(1, 12)]),
    );

    let err = reconciler.run().await.expect_err("shrink must fail");

    assert!(
        matches!(err, ReconcileError::Shrink { previous: 5, merged: 3 }),
        "counts reported: {err}"
    );
    assert_eq!(fs::read_to_string(&path).expect("read"), seeded, "file unchanged");
}

#[tokio::test]
async fn corrupt_dataset_is_fatal() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("free_electricity.json");
    fs::write(&path, "{not json").expect("seed");
    let reconciler = Reconciler::new(
        EventStore::new(&path),
        FakeSource::ok("primary", vec![window(1, 12)]),
        FakeSource::ok("secondary", Vec::new()),
    );

    let err = reconciler.run().await.expect_err("corrupt file must fail");

    assert!(matches!(err, ReconcileError::Load(_)), "load error surfaced: {err}");
    assert_eq!(fs::read_to_string(&path).expect("read"), "{not json", "file unchanged");
}

#[tokio::test]
async fn unwritable_output_is_fatal() {
    let dir = tempfile::tempdir().expect("temp dir");
    // The parent directory does not exist: loading sees no dataset, saving cannot create one.
    let path = dir.path().join("missing").join("free_electricity.json");
    let reconciler = Reconciler::new(
        EventStore::new(&path),
        FakeSource::ok("primary", vec![window(1, 12)]),
        FakeSource::failing("secondary"),
    );

    let err = reconciler.run().await.expect_err("write failure must fail");

    assert!(matches!(err, ReconcileError::Write(_)), "write error surfaced: {err}");
    assert!(!path.exists(), "nothing published");
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .expect("list temp dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name())
        .collect();
    assert!(leftovers.is_empty(), "no temp file left behind: {leftovers:?}");
}

#[tokio::test]
async fn repeated_runs_never_shrink() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = EventStore::new(dir.path().join("free_electricity.json"));
    let batches = [
        vec![window(1, 12), window(2, 12)],
        vec![window(2, 12)],
        Vec::new(),
        vec![window(3, 12), window(1, 12)],
    ];

    let mut last_len = 0;
    for batch in batches {
        let reconciler = Reconciler::new(
            store.clone(),
            FakeSource::ok("primary", batch),
            FakeSource::failing("secondary"),
        );
        reconciler.run().await.expect("run succeeds");

        let len = store.load().map(|dataset| dataset.len()).unwrap_or_default();
        assert!(len >= last_len, "dataset shrank from {last_len} to {len}");
        last_len = len;
    }
    assert_eq!(last_len, 3, "all distinct windows retained");
}
