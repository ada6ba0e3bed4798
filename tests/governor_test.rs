//! Connection governor tests
//!
//! Concurrency bounds, FIFO queueing, and slot release on every exit path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tvproxy::proxy::{Governor, GovernorError};

#[tokio::test]
async fn test_at_most_capacity_granted_simultaneously() {
    let governor = Arc::new(Governor::new(3, Duration::from_secs(5)));
    let current = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..40 {
        let governor = Arc::clone(&governor);
        let current = Arc::clone(&current);
        let max_seen = Arc::clone(&max_seen);
        handles.push(tokio::spawn(async move {
            let slot = governor.acquire("cdn.example.com").await.unwrap();
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            drop(slot);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(
        max_seen.load(Ordering::SeqCst) <= 3,
        "no more than capacity slots may be held at once, saw {}",
        max_seen.load(Ordering::SeqCst)
    );
    assert_eq!(governor.available("cdn.example.com"), 3, "all slots returned");
}

#[tokio::test]
async fn test_waiters_are_granted_in_arrival_order() {
    let governor = Arc::new(Governor::new(1, Duration::from_secs(5)));
    let order = Arc::new(Mutex::new(Vec::new()));

    // Hold the only slot while the queue forms.
    let held = governor.acquire("cdn.example.com").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..5u32 {
        let governor = Arc::clone(&governor);
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let slot = governor.acquire("cdn.example.com").await.unwrap();
            order.lock().unwrap().push(i);
            drop(slot);
        }));
        // Establish distinct arrival times.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    drop(held);
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_acquire_fails_with_timeout_when_starved() {
    let governor = Governor::new(1, Duration::from_millis(80));
    let _held = governor.acquire("cdn.example.com").await.unwrap();

    let start = std::time::Instant::now();
    let result = governor.acquire("cdn.example.com").await;
    assert!(matches!(result, Err(GovernorError::Timeout { .. })));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_dropped_slot_frees_next_waiter_promptly() {
    let governor = Arc::new(Governor::new(1, Duration::from_secs(5)));
    let held = governor.acquire("cdn.example.com").await.unwrap();

    let waiter = {
        let governor = Arc::clone(&governor);
        tokio::spawn(async move { governor.acquire("cdn.example.com").await.is_ok() })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Simulates abnormal termination: no explicit release, just a drop.
    drop(held);

    let granted = tokio::time::timeout(Duration::from_millis(500), waiter)
        .await
        .expect("waiter must be granted promptly after the drop")
        .unwrap();
    assert!(granted);
}

#[tokio::test]
async fn test_pools_are_per_host() {
    let governor = Governor::new(1, Duration::from_millis(80));
    let _a = governor.acquire("a.example.com").await.unwrap();
    let _b = governor.acquire("b.example.com").await.unwrap();
    assert_eq!(governor.available("a.example.com"), 0);
    assert_eq!(governor.available("b.example.com"), 0);
    assert_eq!(governor.available("c.example.com"), 1);
}
