//! Shared helpers: wall clock, tracing bootstrap and retry policies.

pub mod bootstrap;
pub mod retry;

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
