//! Per-repository budget accounting.
//!
//! One `BudgetTracker` lives for exactly one repository analysis pass and is
//! shared by every agent of that pass. `try_reserve` is the single
//! synchronization point for all budget state: it checks every ceiling
//! before moving any counter, so two agents can never both be granted the
//! reservation that would push a counter past its ceiling.

use std::fmt;
use std::sync::Mutex;

use crate::config::Config;

/// Configured ceilings for one repository pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetCeilings {
    /// Maximum external agent calls.
    pub max_calls: u64,
    /// Maximum payload bytes sent across all calls.
    pub max_bytes: u64,
    /// Maximum files consumed by selection.
    pub max_files: u64,
}

impl BudgetCeilings {
    /// Derive ceilings from configuration. The byte ceiling is the call
    /// ceiling times the per-snippet cap: snippet extraction is shared per
    /// repository, so bytes are bounded by what the calls can carry.
    pub fn from_config(config: &Config) -> Self {
        let max_calls = config.budget.max_calls_per_repo;
        Self {
            max_calls,
            max_bytes: max_calls.saturating_mul(config.selector.max_snippet_bytes as u64),
            max_files: config.selector.max_files_per_repo as u64,
        }
    }
}

/// A reservation request; unused dimensions stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReserveRequest {
    pub calls: u64,
    pub bytes: u64,
    pub files: u64,
}

impl ReserveRequest {
    /// One external call carrying `bytes` of payload.
    pub fn call(bytes: u64) -> Self {
        Self {
            calls: 1,
            bytes,
            files: 0,
        }
    }

    /// Record `n` files consumed by selection.
    pub fn files(n: u64) -> Self {
        Self {
            calls: 0,
            bytes: 0,
            files: n,
        }
    }
}

/// Which ceiling denied a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeniedReason {
    Calls,
    Bytes,
    Files,
}

impl fmt::Display for DeniedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeniedReason::Calls => write!(f, "call ceiling reached"),
            DeniedReason::Bytes => write!(f, "byte ceiling reached"),
            DeniedReason::Files => write!(f, "file ceiling reached"),
        }
    }
}

/// Outcome of a reservation attempt. Denial is non-fatal: the caller must
/// degrade to a partial or skipped result, never crash the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted,
    Denied(DeniedReason),
}

impl Reservation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Reservation::Granted)
    }
}

/// Realized consumption, for logging and report signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub calls_made: u64,
    pub bytes_sent: u64,
    pub files_used: u64,
}

#[derive(Debug, Default)]
struct Counters {
    calls_made: u64,
    bytes_sent: u64,
    files_used: u64,
}

/// Mutex-guarded counters enforcing the configured ceilings.
#[derive(Debug)]
pub struct BudgetTracker {
    ceilings: BudgetCeilings,
    counters: Mutex<Counters>,
}

impl BudgetTracker {
    pub fn new(ceilings: BudgetCeilings) -> Self {
        Self {
            ceilings,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Atomically check every ceiling and, only if all pass, commit the
    /// request. A request over any ceiling is denied without moving any
    /// counter, regardless of which other ceiling would also trip.
    pub fn try_reserve(&self, request: ReserveRequest) -> Reservation {
        let mut counters = self.counters.lock().expect("budget lock poisoned");

        if counters.calls_made + request.calls > self.ceilings.max_calls {
            return Reservation::Denied(DeniedReason::Calls);
        }
        if counters.bytes_sent + request.bytes > self.ceilings.max_bytes {
            return Reservation::Denied(DeniedReason::Bytes);
        }
        if counters.files_used + request.files > self.ceilings.max_files {
            return Reservation::Denied(DeniedReason::Files);
        }

        counters.calls_made += request.calls;
        counters.bytes_sent += request.bytes;
        counters.files_used += request.files;
        Reservation::Granted
    }

    /// Current consumption.
    pub fn snapshot(&self) -> BudgetSnapshot {
        let counters = self.counters.lock().expect("budget lock poisoned");
        BudgetSnapshot {
            calls_made: counters.calls_made,
            bytes_sent: counters.bytes_sent,
            files_used: counters.files_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ceilings(calls: u64, bytes: u64, files: u64) -> BudgetCeilings {
        BudgetCeilings {
            max_calls: calls,
            max_bytes: bytes,
            max_files: files,
        }
    }

    #[test]
    fn test_grant_until_call_ceiling() {
        let tracker = BudgetTracker::new(ceilings(2, 1000, 10));

        assert!(tracker.try_reserve(ReserveRequest::call(100)).is_granted());
        assert!(tracker.try_reserve(ReserveRequest::call(100)).is_granted());
        assert_eq!(
            tracker.try_reserve(ReserveRequest::call(100)),
            Reservation::Denied(DeniedReason::Calls)
        );

        // Realized counts never exceed the ceilings.
        let snap = tracker.snapshot();
        assert_eq!(snap.calls_made, 2);
        assert_eq!(snap.bytes_sent, 200);
    }

    #[test]
    fn test_denial_commits_nothing() {
        let tracker = BudgetTracker::new(ceilings(10, 500, 10));

        assert!(tracker.try_reserve(ReserveRequest::call(400)).is_granted());
        // 400 + 200 would cross the byte ceiling; the call counter must not
        // move either.
        assert_eq!(
            tracker.try_reserve(ReserveRequest::call(200)),
            Reservation::Denied(DeniedReason::Bytes)
        );

        let snap = tracker.snapshot();
        assert_eq!(snap.calls_made, 1);
        assert_eq!(snap.bytes_sent, 400);

        // A smaller request still fits.
        assert!(tracker.try_reserve(ReserveRequest::call(100)).is_granted());
    }

    #[test]
    fn test_file_ceiling() {
        let tracker = BudgetTracker::new(ceilings(10, 1000, 3));
        assert!(tracker.try_reserve(ReserveRequest::files(3)).is_granted());
        assert_eq!(
            tracker.try_reserve(ReserveRequest::files(1)),
            Reservation::Denied(DeniedReason::Files)
        );
        assert_eq!(tracker.snapshot().files_used, 3);
    }

    #[test]
    fn test_concurrent_reserve_never_overshoots() {
        let tracker = Arc::new(BudgetTracker::new(ceilings(50, 50_000, 10)));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                let mut granted = 0u64;
                for _ in 0..20 {
                    if tracker.try_reserve(ReserveRequest::call(10)).is_granted() {
                        granted += 1;
                    }
                }
                granted
            }));
        }

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // 8 threads x 20 attempts = 160 attempts, exactly 50 grants.
        assert_eq!(total, 50);
        assert_eq!(tracker.snapshot().calls_made, 50);
    }

    #[test]
    fn test_ceilings_from_config() {
        let config = Config::default();
        let ceilings = BudgetCeilings::from_config(&config);
        assert_eq!(ceilings.max_calls, 120);
        assert_eq!(ceilings.max_bytes, 120 * 3000);
        assert_eq!(ceilings.max_files, 40);
    }
}
