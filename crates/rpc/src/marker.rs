//! Correlation markers for logged errors.
//!
//! A marker ties a generic user-facing message to the detailed log entry
//! written at the same moment. Markers have the form `E#` followed by ten
//! decimal digits and do not repeat within a process.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

const MARKER_MODULUS: u64 = 10_000_000_000;

/// Issues correlation markers.
#[derive(Debug)]
pub struct CorrelationMarkers {
    base: u64,
    counter: AtomicU64,
}

impl CorrelationMarkers {
    /// Starts at a random base so markers of different runs rarely collide.
    pub fn new() -> Self {
        Self::with_base(rand::thread_rng().gen_range(0..MARKER_MODULUS))
    }

    pub fn with_base(base: u64) -> Self {
        Self {
            base: base % MARKER_MODULUS,
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_marker(&self) -> String {
        let offset = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("E#{:010}", (self.base + offset) % MARKER_MODULUS)
    }
}

impl Default for CorrelationMarkers {
    fn default() -> Self {
        Self::new()
    }
}

/// True if `s` has the marker form.
pub fn is_marker(s: &str) -> bool {
    s.strip_prefix("E#")
        .map(|digits| digits.len() == 10 && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_marker_format() {
        let markers = CorrelationMarkers::with_base(42);
        assert_eq!(markers.next_marker(), "E#0000000042");
        assert_eq!(markers.next_marker(), "E#0000000043");
        assert!(is_marker(&CorrelationMarkers::new().next_marker()));
        assert!(!is_marker("E#123"));
    }

    #[test]
    fn test_markers_do_not_repeat() {
        let markers = CorrelationMarkers::new();
        let issued: HashSet<String> = (0..1000).map(|_| markers.next_marker()).collect();
        assert_eq!(issued.len(), 1000);
    }

    #[test]
    fn test_wraps_around() {
        let markers = CorrelationMarkers::with_base(MARKER_MODULUS - 1);
        assert_eq!(markers.next_marker(), "E#9999999999");
        assert_eq!(markers.next_marker(), "E#0000000000");
    }
}
