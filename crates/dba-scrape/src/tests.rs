#![allow(clippy::float_cmp)]

use assert_matches::assert_matches;
use futures_util::{future::BoxFuture, FutureExt};
use tokio::time::Instant;
use tracing::subscriber::Subscriber;
use tracing_capture::{CaptureLayer, SharedStorage};
use tracing_subscriber::layer::SubscriberExt;

use std::{sync::Arc, time::Duration};

use super::*;
use crate::testing::MockConnection;

const TIMEOUT: Duration = Duration::from_secs(5);

fn open_table_row(schema: &str, table: &str, in_use: u64) -> Row {
    Row::new(vec![
        schema.into(),
        table.into(),
        Value::UInt(in_use),
        Value::UInt(0),
    ])
}

fn partition_row(partition: &str, size: &str, bound: u64) -> Row {
    Row::new(vec![
        "s1".into(),
        "t1".into(),
        partition.into(),
        Value::Decimal(size.to_owned()),
        Value::UInt(bound),
    ])
}

async fn run_pass(
    runner: &ScrapeRunner,
    ctx: &ScrapeContext,
    connection: &MockConnection,
) -> (Result<PassReport, PassError>, Vec<Sample>) {
    let (sink, stream) = sink::channel(1);
    let connection = Arc::new(connection.clone());
    tokio::join!(
        runner.run_pass(ctx, connection, sink),
        stream.collect_all()
    )
}

fn tracing_subscriber(storage: &SharedStorage) -> impl Subscriber {
    tracing_subscriber::fmt()
        .pretty()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .finish()
        .with(CaptureLayer::new(storage))
}

#[tokio::test]
async fn pass_emits_sample_per_row() {
    let runner = ScrapeRunner::for_checks(Check::ALL).unwrap();
    let connection = MockConnection::new("8.0.34-log")
        .with_rows(
            Check::DisabledEventsOnActiveNode.query(),
            vec![Row::from_iter(["app", "purge_sessions"])],
        )
        .with_rows(
            Check::OpenTables.query(),
            (0..20)
                .map(|i| open_table_row("app", &format!("table{i}"), i))
                .collect(),
        )
        .with_rows(Check::UsingPartitions.query(), vec![])
        .with_rows(
            Check::PartitionsToRemove.query(),
            vec![
                partition_row("p20240101", "128.50", 1_704_067_200),
                partition_row("p20240201", "64.00", 1_706_745_600),
            ],
        )
        .with_rows(
            Check::RoutineMissing.query(),
            vec![Row::from_iter(["app"]), Row::from_iter(["billing"])],
        );

    let ctx = ScrapeContext::with_timeout(TIMEOUT);
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    let report = report.unwrap();

    assert_eq!(report.server_version, ServerVersion::new(8, 0, 34));
    assert!(!report.is_degraded());
    let names: Vec<_> = report.outcomes.iter().map(|outcome| outcome.name.as_str()).collect();
    let expected_names: Vec<_> = Check::ALL.iter().map(|check| check.name()).collect();
    assert_eq!(names, expected_names);

    let expected_counts = [1, 20, 0, 2, 2];
    for (outcome, expected) in report.outcomes.iter().zip(expected_counts) {
        let stats = outcome.result.as_ref().unwrap();
        assert_eq!(*stats, ScrapeStats { rows: expected, samples: expected }, "{}", outcome.name);
    }
    assert_eq!(samples.len(), 25);

    // Rows of a single scraper are emitted in order.
    let open_tables: Vec<_> = samples
        .iter()
        .filter(|sample| sample.descriptor().name() == "mysql_dba_open_tables")
        .map(|sample| sample.value())
        .collect();
    let expected_values: Vec<_> = (0..20).map(f64::from).collect();
    assert_eq!(open_tables, expected_values);

    for check in Check::ALL {
        assert_eq!(connection.opened_cursors(check.query()), 1);
        assert_eq!(connection.released_cursors(check.query()), 1);
    }
}

#[tokio::test]
async fn partitions_to_remove_scenario() {
    let runner = ScrapeRunner::for_checks([Check::PartitionsToRemove]).unwrap();
    let connection = MockConnection::new("8.0.34").with_rows(
        Check::PartitionsToRemove.query(),
        vec![partition_row("p20240101", "128.5", 1_704_067_200)],
    );

    let ctx = ScrapeContext::with_timeout(TIMEOUT);
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    assert!(!report.unwrap().is_degraded());

    assert_eq!(samples.len(), 1);
    let sample = &samples[0];
    let labels: Vec<_> = sample.labels().collect();
    assert_eq!(
        labels,
        [
            ("schema", "s1"),
            ("table", "t1"),
            ("partition", "p20240101"),
            ("size", "128.5")
        ]
    );
    assert_eq!(sample.value(), 1_704_067_200.0);
}

#[tokio::test]
async fn disabled_events_scenario() {
    let runner = ScrapeRunner::for_checks([Check::DisabledEventsOnActiveNode]).unwrap();
    let connection = MockConnection::new("5.7.44").with_rows(
        Check::DisabledEventsOnActiveNode.query(),
        vec![Row::from_iter(["app", "purge_sessions"])],
    );

    let ctx = ScrapeContext::with_timeout(TIMEOUT);
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    assert!(!report.unwrap().is_degraded());

    let lines: Vec<_> = samples.iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        [r#"mysql_dba_disabled_events_on_active_node{schema="app",event="purge_sessions"} 0"#]
    );
}

#[tokio::test]
async fn failing_scrapers_do_not_affect_others() {
    let storage = SharedStorage::default();
    let _subscriber_guard = tracing::subscriber::set_default(tracing_subscriber(&storage));
    // ^ `set_default()` works because the test uses a single-threaded Tokio runtime

    let runner =
        ScrapeRunner::for_checks([Check::OpenTables, Check::RoutineMissing, Check::UsingPartitions])
            .unwrap();
    let bad_row = Row::new(vec![Value::Null]);
    let connection = MockConnection::new("8.0.34")
        .with_failure_after(
            Check::OpenTables.query(),
            vec![open_table_row("app", "orders", 1)],
            "Lost connection to MySQL server during query",
        )
        .with_rows(
            Check::RoutineMissing.query(),
            vec![Row::from_iter(["app"]), bad_row, Row::from_iter(["billing"])],
        )
        .with_rows(
            Check::UsingPartitions.query(),
            vec![Row::new(vec![
                "s1".into(),
                "t1".into(),
                "p20240101".into(),
                Value::UInt(1_704_067_200),
            ])],
        );

    let ctx = ScrapeContext::with_timeout(TIMEOUT);
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    let report = report.unwrap();
    assert!(report.is_degraded());

    let open_tables = report.outcome("open_tables").unwrap();
    assert_matches!(&open_tables.result, Err(ScrapeError::Query(_)));
    let routine_missing = report.outcome("routine_missing").unwrap();
    assert_matches!(
        &routine_missing.result,
        Err(ScrapeError::Scan(ScanError::UnexpectedNull { column: 0 }))
    );
    let using_partitions = report.outcome("using_partitions").unwrap();
    assert_matches!(&using_partitions.result, Ok(ScrapeStats { samples: 1, .. }));

    let failed: Vec<_> = report.failures().map(|outcome| outcome.name.as_str()).collect();
    assert_eq!(failed, ["open_tables", "routine_missing"]);
    // Samples sent before a failure are retained.
    assert_eq!(samples.len(), 3);
    for check in [Check::OpenTables, Check::RoutineMissing, Check::UsingPartitions] {
        assert_eq!(connection.released_cursors(check.query()), 1);
    }

    let storage = storage.lock();
    let warnings: Vec<_> = storage
        .all_events()
        .filter(|event| {
            *event.metadata().level() == tracing::Level::WARN
                && event.message() == Some("Scraper failed")
        })
        .collect();
    assert_eq!(warnings.len(), 2);
    let failed_scrapers: Vec<_> = warnings
        .iter()
        .map(|event| event["scraper"].as_debug_str().unwrap())
        .collect();
    assert_eq!(failed_scrapers, ["open_tables", "routine_missing"]);
    assert!(warnings[0]["err"]
        .as_debug_str()
        .unwrap()
        .contains("Lost connection"));
}

#[derive(Debug)]
struct VersionedScraper {
    min_version: ServerVersion,
}

impl Scrape for VersionedScraper {
    fn name(&self) -> &str {
        "versioned"
    }

    fn help(&self) -> &str {
        "Scraper requiring a recent server version"
    }

    fn min_version(&self) -> ServerVersion {
        self.min_version
    }

    fn scrape<'a>(
        &'a self,
        _ctx: &'a ScrapeContext,
        connection: &'a dyn Connection,
        _sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<ScrapeStats, ScrapeError>> {
        async {
            let _rows = connection.query("SELECT 1");
            Ok(ScrapeStats::default())
        }
        .boxed()
    }
}

#[tokio::test]
async fn version_gate_excludes_scrapers() {
    let scrapers: [Arc<dyn Scrape>; 2] = [
        Arc::new(VersionedScraper {
            min_version: ServerVersion::new(8, 0, 0),
        }),
        Arc::new(Scraper::new(Check::RoutineMissing).unwrap()),
    ];
    let runner = ScrapeRunner::new(scrapers);
    let connection = MockConnection::new("5.7.44-48-log")
        .with_rows("SELECT 1", vec![])
        .with_rows(Check::RoutineMissing.query(), vec![]);

    let eligible: Vec<_> = runner
        .eligible(ServerVersion::new(5, 7, 44))
        .map(|scraper| scraper.name())
        .collect();
    assert_eq!(eligible, ["routine_missing"]);

    let ctx = ScrapeContext::with_timeout(TIMEOUT);
    let (report, _) = run_pass(&runner, &ctx, &connection).await;
    let report = report.unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcome("versioned").is_none());
    assert_eq!(connection.opened_cursors("SELECT 1"), 0);

    let connection = MockConnection::new("8.0.34")
        .with_rows("SELECT 1", vec![])
        .with_rows(Check::RoutineMissing.query(), vec![]);
    let ctx = ScrapeContext::with_timeout(TIMEOUT);
    let (report, _) = run_pass(&runner, &ctx, &connection).await;
    assert_eq!(report.unwrap().outcomes.len(), 2);
    assert_eq!(connection.opened_cursors("SELECT 1"), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_cancels_slow_scrapers() {
    let runner = ScrapeRunner::for_checks([Check::OpenTables, Check::RoutineMissing]).unwrap();
    let connection = MockConnection::new("8.0.34")
        .with_delay(
            Check::OpenTables.query(),
            Duration::from_secs(30),
            vec![open_table_row("app", "orders", 1)],
        )
        .with_rows(Check::RoutineMissing.query(), vec![Row::from_iter(["app"])]);

    let ctx = ScrapeContext::with_timeout(Duration::from_secs(1));
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    let report = report.unwrap();

    let open_tables = report.outcome("open_tables").unwrap();
    assert_matches!(&open_tables.result, Err(err) if err.is_cancelled());
    assert!(report.outcome("routine_missing").unwrap().is_success());
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].descriptor().name(), "mysql_dba_routine_missing");
    assert_eq!(connection.released_cursors(Check::OpenTables.query()), 1);
    // Cancellation is observed at the deadline, without waiting for the grace period.
    assert!(report.duration < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn explicit_cancellation_of_pass() {
    let runner = ScrapeRunner::for_checks([Check::OpenTables]).unwrap();
    let connection = MockConnection::new("8.0.34").with_hang(Check::OpenTables.query());
    let (ctx, cancel_handle) = ScrapeContext::cancellable(Instant::now() + TIMEOUT);

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_handle.cancel();
    };
    let ((report, _), ()) = tokio::join!(run_pass(&runner, &ctx, &connection), cancel);
    let report = report.unwrap();
    let outcome = report.outcome("open_tables").unwrap();
    assert_matches!(outcome.result, Err(ScrapeError::Cancelled));
    assert!(report.duration < TIMEOUT);
    assert_eq!(connection.released_cursors(Check::OpenTables.query()), 1);
}

#[derive(Debug)]
struct StubbornScraper;

impl Scrape for StubbornScraper {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn help(&self) -> &str {
        "Scraper ignoring cancellation"
    }

    fn min_version(&self) -> ServerVersion {
        ServerVersion::new(5, 1, 0)
    }

    fn scrape<'a>(
        &'a self,
        _ctx: &'a ScrapeContext,
        _connection: &'a dyn Connection,
        _sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<ScrapeStats, ScrapeError>> {
        async {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(ScrapeStats::default())
        }
        .boxed()
    }
}

#[tokio::test(start_paused = true)]
async fn stubborn_scrapers_are_aborted_after_grace_period() {
    let grace_period = Duration::from_millis(500);
    let scrapers: [Arc<dyn Scrape>; 2] = [
        Arc::new(StubbornScraper),
        Arc::new(Scraper::new(Check::RoutineMissing).unwrap()),
    ];
    let runner = ScrapeRunner::new(scrapers).with_grace_period(grace_period);
    let connection = MockConnection::new("8.0.34")
        .with_rows(Check::RoutineMissing.query(), vec![Row::from_iter(["app"])]);

    let timeout = Duration::from_secs(1);
    let ctx = ScrapeContext::with_timeout(timeout);
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    let report = report.unwrap();

    assert_matches!(
        report.outcome("stubborn").unwrap().result,
        Err(ScrapeError::Cancelled)
    );
    assert!(report.outcome("routine_missing").unwrap().is_success());
    assert_eq!(samples.len(), 1);
    assert!(report.duration >= timeout + grace_period);
    assert!(report.duration < timeout + grace_period * 2);
}

#[tokio::test(start_paused = true)]
async fn grace_period_starts_at_explicit_cancellation() {
    let grace_period = Duration::from_millis(500);
    let runner = ScrapeRunner::new([Arc::new(StubbornScraper) as Arc<dyn Scrape>])
        .with_grace_period(grace_period);
    let connection = MockConnection::new("8.0.34");
    let deadline = Instant::now() + Duration::from_secs(60);
    let (ctx, cancel_handle) = ScrapeContext::cancellable(deadline);

    let cancel_after = Duration::from_secs(1);
    let cancel = async {
        tokio::time::sleep(cancel_after).await;
        cancel_handle.cancel();
    };
    let ((report, _), ()) = tokio::join!(run_pass(&runner, &ctx, &connection), cancel);
    let report = report.unwrap();

    assert_matches!(
        report.outcome("stubborn").unwrap().result,
        Err(ScrapeError::Cancelled)
    );
    assert!(report.duration >= cancel_after + grace_period);
    assert!(report.duration < cancel_after + grace_period * 2);
}

#[derive(Debug)]
struct PanickingScraper;

impl Scrape for PanickingScraper {
    fn name(&self) -> &str {
        "panicking"
    }

    fn help(&self) -> &str {
        "Scraper that panics"
    }

    fn min_version(&self) -> ServerVersion {
        ServerVersion::new(5, 1, 0)
    }

    fn scrape<'a>(
        &'a self,
        _ctx: &'a ScrapeContext,
        _connection: &'a dyn Connection,
        _sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<ScrapeStats, ScrapeError>> {
        panic!("oops");
    }
}

#[tokio::test]
async fn panicking_scrapers_are_isolated() {
    let scrapers: [Arc<dyn Scrape>; 2] = [
        Arc::new(PanickingScraper),
        Arc::new(Scraper::new(Check::RoutineMissing).unwrap()),
    ];
    let runner = ScrapeRunner::new(scrapers);
    let connection = MockConnection::new("8.0.34")
        .with_rows(Check::RoutineMissing.query(), vec![Row::from_iter(["app"])]);

    let ctx = ScrapeContext::with_timeout(TIMEOUT);
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    let report = report.unwrap();

    assert_matches!(
        report.outcome("panicking").unwrap().result,
        Err(ScrapeError::Panicked)
    );
    assert!(report.outcome("routine_missing").unwrap().is_success());
    assert_eq!(samples.len(), 1);
}

#[tokio::test]
async fn pass_errors() {
    let runner = ScrapeRunner::for_checks([Check::RoutineMissing]).unwrap();
    let ctx = ScrapeContext::with_timeout(TIMEOUT);

    let connection = MockConnection::new("8.0.34").with_version_error("Access denied");
    let (report, samples) = run_pass(&runner, &ctx, &connection).await;
    assert_matches!(report, Err(PassError::ServerVersion(_)));
    assert!(samples.is_empty());

    let connection = MockConnection::new("MariaDB");
    let (report, _) = run_pass(&runner, &ctx, &connection).await;
    assert_matches!(report, Err(PassError::InvalidVersion { raw, .. }) if raw == "MariaDB");

    let expired_ctx = ScrapeContext::with_deadline(Instant::now());
    let connection = MockConnection::new("8.0.34");
    let (report, _) = run_pass(&runner, &expired_ctx, &connection).await;
    assert_matches!(report, Err(PassError::DeadlineExpired));

    let (cancelled_ctx, cancel_handle) = ScrapeContext::cancellable(Instant::now() + TIMEOUT);
    cancel_handle.cancel();
    let (report, _) = run_pass(&runner, &cancelled_ctx, &connection).await;
    assert_matches!(report, Err(PassError::Cancelled));
    assert_eq!(connection.opened_cursors(Check::RoutineMissing.query()), 0);
}
