//! Metrics for broadcast and retraction outcomes
//!
//! Counters and histograms are recorded through the `metrics` facade; the
//! embedding process decides which recorder (if any) is installed.

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const COPIES_SUCCESS: &str = "fanout.copies.success";
pub const COPIES_FAILED: &str = "fanout.copies.failed";
pub const DELETES_SUCCESS: &str = "fanout.deletes.success";
pub const DELETES_FAILED: &str = "fanout.deletes.failed";
pub const BATCHES_CREATED: &str = "fanout.batches.created";
pub const BATCHES_PURGED: &str = "fanout.batches.purged";
pub const BROADCAST_DURATION_MS: &str = "fanout.broadcast.duration_ms";
pub const RETRACTION_DURATION_MS: &str = "fanout.retraction.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(COPIES_SUCCESS, "Copies delivered to destinations");
    describe_counter!(COPIES_FAILED, "Copies that failed or timed out");
    describe_counter!(DELETES_SUCCESS, "Remote copies deleted by retractions");
    describe_counter!(DELETES_FAILED, "Remote deletes that failed or found nothing");
    describe_counter!(BATCHES_CREATED, "Broadcast batches created");
    describe_counter!(BATCHES_PURGED, "Broadcast batches purged after retraction");
    describe_histogram!(BROADCAST_DURATION_MS, "Broadcast duration in milliseconds");
    describe_histogram!(RETRACTION_DURATION_MS, "Retraction duration in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        // No recorder is installed; describing and recording must be no-ops
        init_metrics();
        record_counter(COPIES_SUCCESS, 3);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new(BROADCAST_DURATION_MS);
        std::thread::sleep(std::time::Duration::from_millis(5));
        timer.stop();
    }
}
