//! Per-request correlation identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier attached to every log line of one callback exchange.
///
/// Formatted as `<x-slack-request-timestamp>-<n>`. The timestamp is only a
/// hint; uniqueness comes from the counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTrace(String);

impl RequestTrace {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic request counter, shared by all in-flight requests of a server.
#[derive(Debug, Default)]
pub struct RequestCounter(AtomicU64);

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next counter value and compose a trace from it.
    pub fn next_trace(&self, timestamp_hint: &str) -> RequestTrace {
        let n = self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        RequestTrace(format!("{timestamp_hint}-{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_trace_format() {
        let counter = RequestCounter::new();

        assert_eq!(counter.next_trace("1531420618").as_str(), "1531420618-1");
        assert_eq!(counter.next_trace("1531420618").as_str(), "1531420618-2");
        assert_eq!(counter.next_trace("").to_string(), "-3");
    }

    #[test]
    fn test_counters_are_independent() {
        let a = RequestCounter::new();
        let b = RequestCounter::new();
        a.next_trace("t");
        a.next_trace("t");

        assert_eq!(b.next_trace("t").as_str(), "t-1");
    }

    #[test]
    fn test_concurrent_traces_are_distinct() {
        let counter = Arc::new(RequestCounter::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    (0..500)
                        .map(|_| counter.next_trace("1700000000"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for trace in handle.join().unwrap() {
                assert!(seen.insert(trace), "duplicate trace");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }
}
