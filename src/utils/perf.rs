//! Timing and memory measurement for the experiment binaries.
//!
//! Peak memory is read from `/proc/self/status` and is therefore only available
//! on Linux. It is a process-wide high-water mark, so measurements taken later
//! in a run can only grow.

use std::time::{Duration, Instant};

/// The outcome of a measured computation.
#[derive(Debug, Clone)]
pub struct Measurement<R> {
    pub value: R,
    pub elapsed: Duration,
    /// Peak resident set size in kilobytes after the computation, or 0 if unavailable.
    pub peak_rss_kb: u64,
}

/// Runs `f` once and records its wall-clock time and the process peak RSS.
pub fn measure<R>(f: impl FnOnce() -> R) -> Measurement<R> {
    let start = Instant::now();
    let value = f();
    let elapsed = start.elapsed();
    Measurement {
        value,
        elapsed,
        peak_rss_kb: peak_rss_kb(),
    }
}

/// Reads the resident-set high-water mark (`VmHWM`) in kilobytes.
#[cfg(target_os = "linux")]
pub fn peak_rss_kb() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find(|line| line.starts_with("VmHWM:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|value| value.parse().ok())
        })
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
pub fn peak_rss_kb() -> u64 {
    use std::sync::Once;
    static WARN_ONCE: Once = Once::new();
    WARN_ONCE.call_once(|| {
        log::warn!("Peak RSS measurement is only supported on Linux; returning 0.");
    });
    0
}
