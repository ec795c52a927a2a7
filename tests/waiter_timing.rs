//! Timing behaviour of condition and stability waits, driven by Tokio's
//! paused clock so every elapsed duration is exact.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use testutil_rs::report::FailureLog;
use testutil_rs::waiter::{Check, CheckError, DocumentQuery, Reading, WaitError, WaitOptions, Waiter};
use tokio::time::{self, Duration, Instant};

fn waiter() -> (Waiter, Arc<FailureLog>) {
    let log = Arc::new(FailureLog::new());
    (Waiter::new(log.clone()), log)
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&calls), calls)
}

#[tokio::test(start_paused = true)]
async fn resolves_on_the_tick_the_predicate_holds() {
    let (waiter, log) = waiter();
    let (calls, seen) = counter();

    let started = Instant::now();
    waiter
        .wait(
            Check::predicate(move || calls.fetch_add(1, Ordering::SeqCst) + 1 >= 4),
            None,
        )
        .await
        .expect("predicate holds on the fourth tick");

    assert_eq!(started.elapsed(), Duration::from_millis(150));
    assert_eq!(seen.load(Ordering::SeqCst), 4);
    assert_eq!(waiter.active_polls(), 0);
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn first_check_runs_immediately() {
    let (waiter, log) = waiter();
    let started = Instant::now();
    waiter
        .wait(Check::predicate(|| true), Some(WaitOptions::new(1_000, 500)))
        .await
        .expect("resolves at once");
    assert_eq!(started.elapsed(), Duration::ZERO);
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn timeout_rejects_and_reports_one_failure() {
    let (waiter, log) = waiter();

    let started = Instant::now();
    let handle = waiter.wait(Check::predicate(|| false), Some(WaitOptions::new(300, 50)));
    assert_eq!(waiter.active_polls(), 1);

    let err = handle.await.expect_err("never holds");
    assert!(matches!(err, WaitError::Timeout { timeout_ms: 300 }));
    assert_eq!(started.elapsed(), Duration::from_millis(300));

    let failures = log.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].message, "wait timed out after 300ms");
    assert_eq!(failures[0].category.as_deref(), Some("wait"));
    assert_eq!(waiter.active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn check_wins_when_it_holds_on_the_timeout_tick() {
    let (waiter, log) = waiter();
    let (calls, _) = counter();

    // Ticks at 0, 50, ..., 300: the seventh check coincides with the timeout.
    waiter
        .wait(
            Check::predicate(move || calls.fetch_add(1, Ordering::SeqCst) + 1 == 7),
            Some(WaitOptions::new(300, 50)),
        )
        .await
        .expect("check evaluated before the timeout");
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn predicate_error_rejects_without_reporting() {
    let (waiter, log) = waiter();
    let (calls, seen) = counter();

    let started = Instant::now();
    let err = waiter
        .wait(
            Check::try_predicate(move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                    Err(io::Error::other("element detached"))
                } else {
                    Ok(false)
                }
            }),
            None,
        )
        .await
        .expect_err("second check fails");

    match err {
        WaitError::Check(source) => assert_eq!(source.to_string(), "element detached"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(started.elapsed(), Duration::from_millis(50));

    // No further checks run once the wait has settled.
    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(waiter.active_polls(), 0);
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn panicking_predicate_rejects() {
    let (waiter, log) = waiter();
    let err = waiter
        .wait(Check::predicate(|| panic!("no such element")), None)
        .await
        .expect_err("panic becomes an error");
    assert_eq!(err.to_string(), "check failed: check panicked: no such element");
    assert_eq!(waiter.active_polls(), 0);
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_still_reports_timeout() {
    let (waiter, log) = waiter();
    drop(waiter.wait(Check::predicate(|| false), Some(WaitOptions::new(200, 50))));

    time::sleep(Duration::from_millis(250)).await;
    assert_eq!(log.len(), 1);
    assert_eq!(waiter.active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_waits_settle_independently() {
    let (waiter, log) = waiter();

    let fast = waiter.wait(Check::predicate(|| true), None);
    let slow = waiter.wait(Check::predicate(|| false), Some(WaitOptions::new(100, 25)));
    assert_eq!(waiter.active_polls(), 2);

    let (fast, slow) = tokio::join!(fast, slow);
    assert!(fast.is_ok());
    assert!(slow.expect_err("slow wait times out").is_timeout());
    assert_eq!(log.len(), 1);
    assert_eq!(waiter.active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn constant_value_stabilises_after_one_interval() {
    let (waiter, log) = waiter();
    let (calls, seen) = counter();

    let started = Instant::now();
    waiter
        .wait_until_stable(
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                "loaded"
            },
            None,
        )
        .await
        .expect("constant value is stable");

    assert_eq!(started.elapsed(), Duration::from_millis(50));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn reading_stabilises_once_value_stops_changing() {
    let (waiter, log) = waiter();
    let (calls, _) = counter();

    let started = Instant::now();
    waiter
        .wait_until_stable(
            move || calls.fetch_add(1, Ordering::SeqCst).min(3),
            None,
        )
        .await
        .expect("settles at 3");

    // Reads 0, 1, 2, 3, 3.
    assert_eq!(started.elapsed(), Duration::from_millis(200));
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn toggling_value_times_out() {
    let (waiter, log) = waiter();
    let (calls, _) = counter();

    let err = waiter
        .wait_until_stable(
            move || calls.fetch_add(1, Ordering::SeqCst) % 2,
            Some(WaitOptions::new(400, 50)),
        )
        .await
        .expect_err("never stable");
    assert!(err.is_timeout());
    assert_eq!(log.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unstable_reading_never_stabilises() {
    let (waiter, log) = waiter();

    let err = waiter
        .wait_until_stable_readings(|| Reading::<u32>::UNSTABLE, Some(WaitOptions::new(250, 50)))
        .await
        .expect_err("unstable forever");
    assert!(matches!(err, WaitError::Timeout { timeout_ms: 250 }));
    assert_eq!(log.failures()[0].message, "wait timed out after 250ms");
}

#[tokio::test(start_paused = true)]
async fn unstable_readings_delay_stability() {
    let (waiter, log) = waiter();
    let (calls, _) = counter();

    let started = Instant::now();
    waiter
        .wait_until_stable_readings(
            move || {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Reading::UNSTABLE
                } else {
                    Reading::Value(42)
                }
            },
            None,
        )
        .await
        .expect("stable once loaded");

    // Three unstable reads, then 42 twice.
    assert_eq!(started.elapsed(), Duration::from_millis(200));
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn failing_read_rejects_stability_wait() {
    let (waiter, log) = waiter();
    let err = waiter
        .try_wait_until_stable(
            || Err::<Reading<u8>, _>(io::Error::other("read failed")),
            None,
        )
        .await
        .expect_err("read error");
    assert!(matches!(err, WaitError::Check(_)));
    log.assert_clean();
}

struct AppearingElement {
    present_after: usize,
    queries: AtomicUsize,
}

#[async_trait]
impl DocumentQuery for AppearingElement {
    async fn has_match(&self, selector: &str) -> Result<bool, CheckError> {
        if selector != "#results li" {
            return Err(format!("unexpected selector {selector}").into());
        }
        Ok(self.queries.fetch_add(1, Ordering::SeqCst) + 1 >= self.present_after)
    }
}

#[tokio::test(start_paused = true)]
async fn selector_resolves_once_element_is_present() {
    let document = Arc::new(AppearingElement {
        present_after: 3,
        queries: AtomicUsize::new(0),
    });
    let log = Arc::new(FailureLog::new());
    let waiter = Waiter::new(log.clone()).with_document(document.clone());

    let started = Instant::now();
    waiter
        .wait("#results li", None)
        .await
        .expect("element appears");

    assert_eq!(started.elapsed(), Duration::from_millis(100));
    assert_eq!(document.queries.load(Ordering::SeqCst), 3);
    log.assert_clean();
}

#[tokio::test(start_paused = true)]
async fn missing_element_times_out() {
    let document = Arc::new(AppearingElement {
        present_after: usize::MAX,
        queries: AtomicUsize::new(0),
    });
    let log = Arc::new(FailureLog::new());
    let waiter = Waiter::new(log.clone())
        .with_document(document)
        .with_options(WaitOptions::new(150, 50));

    let err = waiter
        .wait(Check::selector("#results li"), None)
        .await
        .expect_err("never appears");
    assert!(err.is_timeout());
    assert_eq!(log.len(), 1);
}

/// Takes `delay` to answer each query and finds a match from the
/// `present_after`-th query on.
struct SlowDocument {
    delay: Duration,
    present_after: usize,
    queries: AtomicUsize,
}

#[async_trait]
impl DocumentQuery for SlowDocument {
    async fn has_match(&self, _selector: &str) -> Result<bool, CheckError> {
        time::sleep(self.delay).await;
        Ok(self.queries.fetch_add(1, Ordering::SeqCst) + 1 >= self.present_after)
    }
}

#[tokio::test(start_paused = true)]
async fn hung_check_still_times_out_on_schedule() {
    let document = Arc::new(SlowDocument {
        delay: Duration::from_secs(30),
        present_after: 1,
        queries: AtomicUsize::new(0),
    });
    let log = Arc::new(FailureLog::new());
    let waiter = Waiter::new(log.clone()).with_document(document.clone());

    let started = Instant::now();
    let err = waiter
        .wait("#results li", Some(WaitOptions::new(1_000, 50)))
        .await
        .expect_err("query never answers in time");

    assert!(matches!(err, WaitError::Timeout { timeout_ms: 1_000 }));
    assert_eq!(started.elapsed(), Duration::from_millis(1_000));
    assert_eq!(document.queries.load(Ordering::SeqCst), 0);
    assert_eq!(log.len(), 1);
    assert_eq!(waiter.active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn check_slower_than_interval_resolves() {
    let document = Arc::new(SlowDocument {
        delay: Duration::from_millis(80),
        present_after: 2,
        queries: AtomicUsize::new(0),
    });
    let log = Arc::new(FailureLog::new());
    let waiter = Waiter::new(log.clone()).with_document(document.clone());

    let started = Instant::now();
    waiter
        .wait("#results li", Some(WaitOptions::new(1_000, 50)))
        .await
        .expect("second query matches");

    // The tick missed during the first query fires as soon as it returns.
    assert_eq!(started.elapsed(), Duration::from_millis(160));
    assert_eq!(document.queries.load(Ordering::SeqCst), 2);
    assert_eq!(waiter.active_polls(), 0);
    log.assert_clean();
}
