mod common;

use cassandra_harness::server::{Endpoint, LineSink, OutputMonitor};
use common::{CollectingSink, MARKER_LINE};
use futures::channel::mpsc;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MARKER: &str = "Listening for thrift clients...";

fn endpoint() -> Endpoint {
    Endpoint::new("127.0.0.1", 9160)
}

async fn wait_until_finished(monitor: &OutputMonitor) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !monitor.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("monitor did not finish");
}

#[tokio::test(start_paused = true)]
async fn test_marker_at_two_seconds_is_seen_at_two_seconds() {
    let (tx, rx) = mpsc::unbounded::<io::Result<String>>();
    let monitor = OutputMonitor::spawn(rx, endpoint(), MARKER, None);

    tokio::spawn(async move {
        tx.unbounded_send(Ok("INFO Loading settings".to_string()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        tx.unbounded_send(Ok(MARKER_LINE.to_string())).unwrap();
        // Keep the stream open like a running server would.
        std::future::pending::<()>().await;
    });

    let started = Instant::now();
    assert!(monitor.await_ready(Duration::from_millis(10_000)).await);
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(2_000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2_100), "{:?}", elapsed);
    assert!(monitor.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_missing_marker_times_out_without_error() {
    let (tx, rx) = mpsc::unbounded::<io::Result<String>>();
    let monitor = OutputMonitor::spawn(rx, endpoint(), MARKER, None);
    tx.unbounded_send(Ok("INFO still booting".to_string()))
        .unwrap();

    let started = Instant::now();
    assert!(!monitor.await_ready(Duration::from_millis(200)).await);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(!monitor.is_ready());
}

#[tokio::test]
async fn test_marker_must_be_a_suffix() {
    let lines = futures::stream::iter(vec![Ok(format!("{} (not yet)", MARKER))]);
    let monitor = OutputMonitor::spawn(lines, endpoint(), MARKER, None);

    wait_until_finished(&monitor).await;
    assert!(!monitor.await_ready(Duration::from_millis(20)).await);
}

#[tokio::test]
async fn test_repeated_marker_is_harmless() {
    let lines = futures::stream::iter(vec![
        Ok(MARKER_LINE.to_string()),
        Ok(MARKER_LINE.to_string()),
    ]);
    let monitor = OutputMonitor::spawn(lines, endpoint(), MARKER, None);

    assert!(monitor.await_ready(Duration::from_secs(5)).await);
    wait_until_finished(&monitor).await;
    assert!(monitor.is_ready());
}

#[tokio::test]
async fn test_forwards_every_line_with_endpoint_prefix() {
    let sink = Arc::new(CollectingSink::default());
    let lines = futures::stream::iter(vec![
        Ok("first".to_string()),
        Ok(MARKER_LINE.to_string()),
        Ok("after ready".to_string()),
    ]);
    let monitor = OutputMonitor::spawn(
        lines,
        endpoint(),
        MARKER,
        Some(sink.clone() as Arc<dyn LineSink>),
    );

    wait_until_finished(&monitor).await;

    assert_eq!(
        sink.lines(),
        vec![
            "[127.0.0.1:9160] first".to_string(),
            format!("[127.0.0.1:9160] {}", MARKER_LINE),
            "[127.0.0.1:9160] after ready".to_string(),
        ]
    );
    assert!(monitor.is_ready());
}

#[tokio::test]
async fn test_read_error_ends_the_monitor_unsignaled() {
    let lines = futures::stream::iter(vec![
        Ok("partial output".to_string()),
        Err(io::Error::other("pipe broke")),
        Ok(MARKER_LINE.to_string()),
    ]);
    let monitor = OutputMonitor::spawn(lines, endpoint(), MARKER, None);

    wait_until_finished(&monitor).await;
    assert!(!monitor.await_ready(Duration::from_millis(20)).await);
}

#[tokio::test]
async fn test_end_of_stream_ends_the_monitor_unsignaled() {
    let lines = futures::stream::iter(Vec::<io::Result<String>>::new());
    let monitor = OutputMonitor::spawn(lines, endpoint(), MARKER, None);

    wait_until_finished(&monitor).await;
    assert!(!monitor.is_ready());
}

#[tokio::test]
async fn test_cancel_abandons_the_stream() {
    let (tx, rx) = mpsc::unbounded::<io::Result<String>>();
    let mut monitor = OutputMonitor::spawn(rx, endpoint(), MARKER, None);
    tx.unbounded_send(Ok("booting".to_string())).unwrap();

    monitor.cancel().await.unwrap();

    assert!(monitor.is_finished());
    assert!(!monitor.is_ready());
    // The read side is gone, so the producer notices.
    assert!(tx.unbounded_send(Ok(MARKER_LINE.to_string())).is_err());
    // A second cancel is a no-op.
    monitor.cancel().await.unwrap();
}
