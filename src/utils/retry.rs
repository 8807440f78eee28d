//! Retry policies built on `backon`.
//!
//! Exponential backoff with jitter for direct observer delivery.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for delivering an event frame straight to an observer.
///
/// - Min delay: 10ms
/// - Max delay: 1s
/// - Max attempts: 5
/// - Jitter enabled
pub fn delivery_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_secs(1))
        .with_max_times(5)
        .with_jitter()
}
