//! Clock translation between independent device clocks
//!
//! Every device runs its own wrapping 32-bit microsecond counter. A START
//! message carries one sample of the coordinator's clock (`currentClock`)
//! taken at send time, which is enough to map the coordinator's schedule
//! into the receiver's clock domain with a single wrapping subtraction.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::core::Micros;

/// Translates a coordinator-clock start time into the local clock domain.
///
/// `offset = local_receive − current_clock` captures the difference between
/// the two clock domains plus any fixed transmission latency; the local fire
/// deadline is then `master_start + offset`. Variable in-flight latency is
/// not corrected for; that approximation is part of the protocol contract.
/// All arithmetic wraps at 2^32.
pub fn translate(local_receive: Micros, current_clock: Micros, master_start: Micros) -> Micros {
    let offset = local_receive.wrapping_since(current_clock);
    master_start.wrapping_add(offset)
}

/// A device's local monotonic microsecond clock.
///
/// Implementations must be monotonic within the wrapping 32-bit space;
/// values from different clocks are never comparable.
pub trait MonotonicClock: Send {
    /// Current local clock reading
    fn now(&self) -> Micros;
}

/// Monotonic clock backed by `std::time::Instant`.
///
/// The reading is the microseconds elapsed since the clock was created,
/// truncated to 32 bits, which wraps a little over every 71 minutes exactly
/// like the microcontroller counters it stands in for.
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    /// Creates a clock whose epoch is now
    pub fn new() -> Self {
        StdClock {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        StdClock::new()
    }
}

impl MonotonicClock for StdClock {
    fn now(&self) -> Micros {
        Micros(self.origin.elapsed().as_micros() as u32)
    }
}

/// Manually advanced clock for tests and virtual devices.
///
/// Clones share the same underlying counter, so a test can hold one handle
/// while a driver owns another.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    micros: Arc<AtomicU32>,
}

impl VirtualClock {
    /// Creates a clock reading `start`
    pub fn new(start: Micros) -> Self {
        VirtualClock {
            micros: Arc::new(AtomicU32::new(start.0)),
        }
    }

    /// Advances the clock by `delta` microseconds, wrapping
    pub fn advance(&self, delta: u32) {
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute reading
    pub fn set(&self, value: Micros) {
        self.micros.store(value.0, Ordering::SeqCst);
    }
}

impl MonotonicClock for VirtualClock {
    fn now(&self) -> Micros {
        Micros(self.micros.load(Ordering::SeqCst))
    }
}
