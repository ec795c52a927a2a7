//! Timer state owned by a single in-flight wait.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior, Sleep};

/// How a wait settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Resolved,
    Rejected,
    TimedOut,
}

impl Settlement {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Settlement::Resolved => "resolved",
            Settlement::Rejected => "rejected",
            Settlement::TimedOut => "timed out",
        }
    }
}

/// Counts live [`PollState`]s for one waiter.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActivePolls(Arc<AtomicUsize>);

impl ActivePolls {
    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> ActivePollGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        ActivePollGuard(Arc::clone(&self.0))
    }
}

#[derive(Debug)]
struct ActivePollGuard(Arc<AtomicUsize>);

impl Drop for ActivePollGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Interval and timeout timers of one wait.
///
/// Both timers are released when the state is dropped, which [`settle`]
/// does. A settled state cannot be polled again.
///
/// [`settle`]: PollState::settle
pub(crate) struct PollState {
    pub(crate) interval: Interval,
    pub(crate) deadline: Pin<Box<Sleep>>,
    started_at: Instant,
    ticks: u64,
    _active: ActivePollGuard,
}

impl PollState {
    /// Arm both timers. The first interval tick completes immediately so the
    /// check runs at time zero.
    pub(crate) fn start(interval: Duration, timeout: Duration, active: &ActivePolls) -> Self {
        let started_at = Instant::now();
        let mut interval = time::interval_at(started_at, interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            interval,
            deadline: Box::pin(time::sleep_until(started_at + timeout)),
            started_at,
            ticks: 0,
            _active: active.acquire(),
        }
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks += 1;
    }

    /// True once the timeout instant has been reached, even if the sleep has
    /// not been polled since.
    pub(crate) fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline.deadline()
    }

    /// Consume the state, clearing both timers, and describe the settlement.
    pub(crate) fn settle(self, settlement: Settlement) -> SettleSummary {
        SettleSummary {
            settlement,
            elapsed: self.started_at.elapsed(),
            ticks: self.ticks,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SettleSummary {
    pub(crate) settlement: Settlement,
    pub(crate) elapsed: Duration,
    pub(crate) ticks: u64,
}
