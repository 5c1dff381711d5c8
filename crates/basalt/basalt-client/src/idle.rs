//! Back-off policies for busy loops.
//!
//! The conductor calls `idle(work_count)` once per loop iteration; a strategy
//! only backs off when no work was done. User-side `wait_for_*` helpers use
//! the same trait while spinning on `find_*`.

use std::time::Duration;

pub trait IdleStrategy: Send + Sync {
    fn idle(&self, work_count: usize);
}

/// Burns the core with a spin hint. Lowest latency, one core pinned.
pub struct BusySpinIdleStrategy;

impl IdleStrategy for BusySpinIdleStrategy {
    #[inline]
    fn idle(&self, work_count: usize) {
        if work_count == 0 {
            std::hint::spin_loop();
        }
    }
}

/// Yields the time slice back to the scheduler when idle.
pub struct YieldingIdleStrategy;

impl IdleStrategy for YieldingIdleStrategy {
    #[inline]
    fn idle(&self, work_count: usize) {
        if work_count == 0 {
            std::thread::yield_now();
        }
    }
}

/// Parks the thread for a fixed period when idle. Cheapest on CPU, highest
/// wake-up latency.
pub struct SleepingIdleStrategy {
    period: Duration,
}

impl SleepingIdleStrategy {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl IdleStrategy for SleepingIdleStrategy {
    #[inline]
    fn idle(&self, work_count: usize) {
        if work_count == 0 {
            std::thread::sleep(self.period);
        }
    }
}
