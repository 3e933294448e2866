//! Tests for metrics exporter.

use http_body_util::{BodyExt as _, Empty};
use hyper::{body::Bytes, Uri};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tracing::subscriber::Subscriber;
use tracing_capture::{CaptureLayer, SharedStorage};
use tracing_subscriber::layer::SubscriberExt;

use std::{net::Ipv4Addr, str};

use super::*;
use dba_scrape::{testing::MockConnection, Check, Row, Value};

const TEST_TIMEOUT: Duration = Duration::from_secs(3);

fn mock_connection() -> MockConnection {
    MockConnection::new("8.0.34")
        .with_rows(
            Check::DisabledEventsOnActiveNode.query(),
            vec![Row::from_iter(["app", "purge_sessions"])],
        )
        .with_rows(
            Check::OpenTables.query(),
            vec![Row::new(vec![
                "app".into(),
                "orders".into(),
                Value::UInt(2),
                Value::UInt(0),
            ])],
        )
        .with_rows(Check::UsingPartitions.query(), vec![])
        .with_rows(Check::PartitionsToRemove.query(), vec![])
        .with_rows(
            Check::RoutineMissing.query(),
            vec![Row::from_iter(["archive"])],
        )
}

fn exporter(connection: MockConnection) -> MetricsExporter<'static> {
    let runner = ScrapeRunner::for_checks(Check::ALL).unwrap();
    MetricsExporter::new(Arc::new(runner), Arc::new(connection))
        .unwrap()
        .with_timeout(Duration::from_secs(1))
}

async fn fetch(exporter: MetricsExporter<'static>) -> (HeaderValue, String) {
    let (shutdown_sender, mut shutdown) = watch::channel(());
    let exporter = exporter.with_graceful_shutdown(async move {
        shutdown.changed().await.ok();
    });
    let server = exporter.bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
    let local_addr = server.local_addr();
    let server_task = tokio::spawn(server.start());

    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let uri: Uri = format!("http://{local_addr}/metrics").parse().unwrap();
    let response = tokio::time::timeout(TEST_TIMEOUT, client.get(uri))
        .await
        .expect("timed out waiting for metrics")
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body = str::from_utf8(&body).unwrap().to_owned();

    drop(client);
    shutdown_sender.send_replace(());
    tokio::time::timeout(TEST_TIMEOUT, server_task)
        .await
        .expect("timed out waiting for server shutdown")
        .unwrap()
        .unwrap();
    (content_type, body)
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
async fn serving_metrics() {
    let (content_type, body) = fetch(exporter(mock_connection())).await;
    assert_eq!(content_type, Format::PROMETHEUS_CONTENT_TYPE);

    let lines: Vec<_> = body.lines().collect();
    assert!(lines.iter().all(|line| !line.is_empty()), "{lines:#?}");
    let expected_lines = [
        "# TYPE mysql_dba_disabled_events_on_active_node gauge",
        r#"mysql_dba_disabled_events_on_active_node{schema="app",event="purge_sessions"} 0.0"#,
        "# TYPE mysql_dba_open_tables gauge",
        r#"mysql_dba_open_tables{schema="app",table="orders"} 2.0"#,
        r#"mysql_dba_routine_missing{schema="archive"} 0.0"#,
        "mysql_up 1.0",
        "mysql_exporter_last_scrape_error 0.0",
        r#"mysql_exporter_collector_success{collector="open_tables"} 1.0"#,
        r#"mysql_exporter_collector_success{collector="routine_missing"} 1.0"#,
    ];
    for line in expected_lines {
        assert!(lines.contains(&line), "{lines:#?}");
    }
    assert!(!lines.contains(&"# EOF"), "{lines:#?}");
    // Metrics without samples are not described.
    assert!(
        !lines.iter().any(|line| line.contains("mysql_dba_using_partitions")),
        "{lines:#?}"
    );
    let durations = lines
        .iter()
        .filter(|line| line.starts_with("mysql_exporter_collector_duration_seconds{"));
    assert_eq!(durations.count(), Check::ALL.len());
}

#[tokio::test]
async fn serving_metrics_in_open_metrics_format() {
    let exporter = exporter(mock_connection()).with_format(Format::OpenMetrics);
    let (content_type, body) = fetch(exporter).await;
    assert_eq!(content_type, Format::OPEN_METRICS_CONTENT_TYPE);

    let lines: Vec<_> = body.lines().collect();
    assert_eq!(lines.last(), Some(&"# EOF"), "{lines:#?}");
    assert!(lines.contains(&"mysql_up 1.0"), "{lines:#?}");
}

#[tokio::test]
async fn failing_scraper_is_reported() {
    let tracing_storage = SharedStorage::default();
    let _subscriber_guard = tracing::subscriber::set_default(tracing_subscriber(&tracing_storage));
    // ^ **NB.** `set_default()` only works because tests use a single-threaded Tokio runtime

    let connection = mock_connection().with_failure(Check::OpenTables.query(), "Lost connection");
    let (_, body) = fetch(exporter(connection)).await;
    let lines: Vec<_> = body.lines().collect();
    let expected_lines = [
        "mysql_up 1.0",
        "mysql_exporter_last_scrape_error 1.0",
        r#"mysql_exporter_collector_success{collector="open_tables"} 0.0"#,
        r#"mysql_exporter_collector_success{collector="routine_missing"} 1.0"#,
        r#"mysql_dba_routine_missing{schema="archive"} 0.0"#,
    ];
    for line in expected_lines {
        assert!(lines.contains(&line), "{lines:#?}");
    }
    assert!(
        !lines.iter().any(|line| line.starts_with("mysql_dba_open_tables{")),
        "{lines:#?}"
    );

    let storage = tracing_storage.lock();
    let warnings: Vec<_> = storage
        .all_events()
        .filter(|event| *event.metadata().level() == tracing::Level::WARN)
        .collect();
    assert_eq!(warnings.len(), 1, "{warnings:#?}");
    let warning = &warnings[0];
    assert_eq!(warning.message(), Some("Scraper failed"));
    assert_eq!(warning["scraper"].as_debug_str(), Some("open_tables"));
}

#[tokio::test]
async fn unreachable_server_is_reported() {
    let tracing_storage = SharedStorage::default();
    let _subscriber_guard = tracing::subscriber::set_default(tracing_subscriber(&tracing_storage));

    let connection = MockConnection::new("8.0.34").with_version_error("Access denied");
    let (_, body) = fetch(exporter(connection)).await;
    let value_lines: Vec<_> = body.lines().filter(|line| !line.starts_with('#')).collect();
    assert_eq!(
        value_lines,
        ["mysql_exporter_last_scrape_error 1.0", "mysql_up 0.0"]
    );

    let storage = tracing_storage.lock();
    let warning = storage
        .all_events()
        .find(|event| event.message() == Some("Scrape pass failed"))
        .expect("no warning for failed pass");
    assert!(
        warning["err"].as_debug_str().unwrap().contains("Access denied"),
        "{warning:?}"
    );
}
