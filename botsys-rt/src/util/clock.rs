//! Monotonic timestamps for message envelopes.
//!
//! Envelope stamps are signed 64-bit monotonic nanoseconds measured from
//! process start. They order events within one process run and are never
//! wall-clock times; diagnostics that need calendar time use `chrono`
//! separately.

// Layer 1: Standard library imports
use std::sync::OnceLock;
use std::time::Instant;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the first call in this process.
///
/// Monotonic and non-decreasing across threads. Saturates at `i64::MAX`
/// (about 292 years of uptime).
pub fn monotonic_ns() -> i64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    let nanos = epoch.elapsed().as_nanos();
    i64::try_from(nanos).unwrap_or(i64::MAX)
}
