//! Utility module
//!
//! This module provides common helpers used throughout the library.

use std::time::Duration;

use crate::core::Micros;

/// Returns true if `a` is a newer sequence number than `b`, treating the
/// 16-bit space as a circle so wraparound at 65536 is tolerated.
pub fn seq_newer(a: u16, b: u16) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000
}

/// Time remaining until `deadline` on the given clock.
///
/// A deadline more than half the 32-bit range away is taken to be in the
/// past and yields zero.
pub fn micros_until(now: Micros, deadline: Micros) -> Duration {
    let delta = deadline.wrapping_since(now);
    if delta < u32::MAX / 2 {
        Duration::from_micros(u64::from(delta))
    } else {
        Duration::ZERO
    }
}

/// Initializes tracing with an env-filtered fmt subscriber.
///
/// Intended for binaries and examples embedding this library; calling it
/// twice is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_newer() {
        assert!(seq_newer(6, 5));
        assert!(!seq_newer(4, 5));
        assert!(!seq_newer(5, 5));
        // Wraparound: 0 follows 65535
        assert!(seq_newer(0, 65535));
        assert!(!seq_newer(65535, 0));
    }

    #[test]
    fn test_micros_until() {
        assert_eq!(micros_until(Micros(1000), Micros(2100)), Duration::from_micros(1100));
        assert_eq!(micros_until(Micros(2100), Micros(1000)), Duration::ZERO);
        // Deadline just past a clock wrap is still in the future
        assert_eq!(
            micros_until(Micros(u32::MAX - 9), Micros(90)),
            Duration::from_micros(100)
        );
    }
}
