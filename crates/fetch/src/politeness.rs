//! Politeness controls: a global concurrency cap plus a per-host minimum gap.
//!
//! The gate is the only coordinator between concurrent fetch callers, so it
//! must behave identically under parallel use: a counting semaphore bounds
//! in-flight requests and a guarded `next_allowed` map serializes each host.
//! Clock and sleep are injectable so tests run without wall-clock delays.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

type ClockFn = Box<dyn Fn() -> f64 + Send + Sync>;
type SleepFn = Box<dyn Fn(f64) + Send + Sync>;

struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Semaphore {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut permits = self.permits.lock().expect("semaphore is never poisoned");
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .expect("semaphore is never poisoned");
        }
        *permits -= 1;
    }

    fn release(&self) {
        let mut permits = self.permits.lock().expect("semaphore is never poisoned");
        *permits += 1;
        self.available.notify_one();
    }
}

/// Enforce per-host delay and global concurrency for fetches.
pub struct PolitenessGate {
    base_delay_seconds: f64,
    slots: Semaphore,
    next_allowed: Mutex<HashMap<String, f64>>,
    clock: ClockFn,
    sleep: SleepFn,
}

impl PolitenessGate {
    /// Gate with a monotonic wall clock and real sleeping.
    pub fn new(base_delay_seconds: f64, max_global_concurrency: usize) -> Self {
        let origin = Instant::now();
        Self::with_timers(
            base_delay_seconds,
            max_global_concurrency,
            Box::new(move || origin.elapsed().as_secs_f64()),
            Box::new(|seconds| {
                if seconds > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(seconds));
                }
            }),
        )
    }

    /// Gate with injected clock/sleep, for tests.
    pub fn with_timers(
        base_delay_seconds: f64,
        max_global_concurrency: usize,
        clock: ClockFn,
        sleep: SleepFn,
    ) -> Self {
        PolitenessGate {
            base_delay_seconds: base_delay_seconds.max(0.0),
            slots: Semaphore::new(max_global_concurrency.max(1)),
            next_allowed: Mutex::new(HashMap::new()),
            clock,
            sleep,
        }
    }

    /// Acquire one global slot (blocking), then wait until the host is
    /// eligible for its next request. The returned `Slot` re-arms the host
    /// delay and returns the global slot when dropped.
    pub fn acquire(&self, host: &str, delay_multiplier: f64) -> Slot<'_> {
        self.slots.acquire();

        loop {
            let wait_seconds = {
                let next_allowed = self
                    .next_allowed
                    .lock()
                    .expect("politeness map is never poisoned");
                let now = (self.clock)();
                match next_allowed.get(host) {
                    Some(next) if *next > now => *next - now,
                    _ => break,
                }
            };
            (self.sleep)(wait_seconds);
        }

        Slot {
            gate: self,
            host: host.to_string(),
            delay_multiplier: delay_multiplier.max(0.0),
        }
    }

    fn release(&self, host: &str, delay_multiplier: f64) {
        {
            let mut next_allowed = self
                .next_allowed
                .lock()
                .expect("politeness map is never poisoned");
            let now = (self.clock)();
            next_allowed.insert(
                host.to_string(),
                now + self.base_delay_seconds * delay_multiplier,
            );
        }
        self.slots.release();
    }
}

/// An acquired politeness slot. Dropping it releases the global slot and
/// schedules the host's next allowed request time.
pub struct Slot<'a> {
    gate: &'a PolitenessGate,
    host: String,
    delay_multiplier: f64,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.host, self.delay_multiplier);
    }
}
