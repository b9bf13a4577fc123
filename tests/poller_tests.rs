mod common;

use cassandra_harness::server::{Endpoint, LinearBackoff, PollOutcome, ReachabilityPoller};
use common::{closed_port, listener};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_open_port_is_reachable_on_first_attempt() {
    let (_listener, port) = listener().await;
    let poller = ReachabilityPoller::new(Endpoint::new("127.0.0.1", port));

    match poller.poll(&CancellationToken::new()).await {
        PollOutcome::Reachable { attempts, elapsed } => {
            assert_eq!(attempts, 1);
            assert!(elapsed < Duration::from_secs(1));
        }
        other => panic!("expected Reachable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_port_opening_later_is_reached_after_retries() {
    let port = closed_port().await;
    let poller = ReachabilityPoller::new(Endpoint::new("127.0.0.1", port))
        .with_backoff(LinearBackoff::new(Duration::from_millis(50)));

    let opener = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        TcpListener::bind(("127.0.0.1", port)).await.unwrap()
    });

    let outcome = poller.poll(&CancellationToken::new()).await;
    let _listener = opener.await.unwrap();

    match outcome {
        PollOutcome::Reachable { attempts, elapsed } => {
            assert!(attempts > 1, "attempts = {}", attempts);
            assert!(elapsed >= Duration::from_millis(250), "{:?}", elapsed);
        }
        other => panic!("expected Reachable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deadline_bounds_the_run() {
    let port = closed_port().await;
    let poller = ReachabilityPoller::new(Endpoint::new("127.0.0.1", port))
        .with_deadline(Some(Duration::from_millis(250)));

    let started = Instant::now();
    let outcome = poller.poll(&CancellationToken::new()).await;

    match outcome {
        PollOutcome::TimedOut { attempts, elapsed } => {
            // 100ms then 150ms (clipped to the deadline) between attempts.
            assert!(attempts >= 2, "attempts = {}", attempts);
            assert!(elapsed >= Duration::from_millis(250));
        }
        other => panic!("expected TimedOut, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancellation_interrupts_the_backoff_sleep() {
    let port = closed_port().await;
    let poller = ReachabilityPoller::new(Endpoint::new("127.0.0.1", port))
        .with_backoff(LinearBackoff::new(Duration::from_secs(10)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = poller.poll(&cancel).await;

    assert!(matches!(outcome, PollOutcome::Cancelled { attempts: 1 }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_already_cancelled_token_makes_no_attempt() {
    let (_listener, port) = listener().await;
    let poller = ReachabilityPoller::new(Endpoint::new("127.0.0.1", port));
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(
        poller.poll(&cancel).await,
        PollOutcome::Cancelled { attempts: 0 }
    );
}

#[test]
fn test_delay_strictly_increases_by_increment() {
    let backoff = LinearBackoff::new(Duration::from_millis(100));
    let mut previous = Duration::ZERO;

    for attempt in 1..=50 {
        let delay = backoff.delay(attempt);
        assert_eq!(delay, previous + Duration::from_millis(100));
        previous = delay;
    }
}
