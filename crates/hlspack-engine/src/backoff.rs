//! Claim lease schedule and GC scheduling windows.

use chrono::Duration;

/// Minimum claim lease: the uncontended window granted on the first claim.
const CLAIM_BASE_MINUTES: i64 = 5;

/// Cap on the claim lease, reached after several doublings.
const CLAIM_CAP_HOURS: i64 = 2;

/// Safety-net window for reserved or confirmed storage keys. A deletion task
/// this far out means "keep unless told otherwise".
pub const RETAIN_WINDOW_DAYS: i64 = 365;

/// Near-term window for rolled-back or superseded keys.
pub const GC_SOON_MINUTES: i64 = 5;

/// Lease duration for the n-th claim of a task row.
///
/// Doubles from the base up to the cap; monotone non-decreasing in
/// `retry_count`.
pub fn claim_backoff(retry_count: u32) -> Duration {
    let base = Duration::minutes(CLAIM_BASE_MINUTES);
    let cap = Duration::hours(CLAIM_CAP_HOURS);

    // 2^retry_count, saturating well past the cap
    let factor = 1i64 << retry_count.min(16);
    std::cmp::min(base * (factor as i32), cap)
}

/// Far-future window for retained keys.
pub fn retain_window() -> Duration {
    Duration::days(RETAIN_WINDOW_DAYS)
}

/// Near-term window for keys to garbage-collect soon.
pub fn gc_soon_window() -> Duration {
    Duration::minutes(GC_SOON_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_starts_at_base() {
        assert_eq!(claim_backoff(0), Duration::minutes(5));
        assert_eq!(claim_backoff(1), Duration::minutes(10));
        assert_eq!(claim_backoff(2), Duration::minutes(20));
    }

    #[test]
    fn backoff_is_monotone_and_capped() {
        let mut previous = Duration::zero();
        for n in 0..40 {
            let delay = claim_backoff(n);
            assert!(delay >= previous, "backoff decreased at retry {n}");
            assert!(delay <= Duration::hours(2));
            previous = delay;
        }
        assert_eq!(claim_backoff(30), Duration::hours(2));
    }

    #[test]
    fn gc_windows_are_far_apart() {
        assert!(retain_window() > Duration::days(30));
        assert!(gc_soon_window() < Duration::hours(1));
    }
}
