//! Duplicate scan suppression.
//!
//! Handheld and fixed scanners often fire several trigger events for a single
//! physical swipe. The filter drops a repeat of the last code seen within a
//! configurable window.

use crate::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupFilter {
    window_ms: u64,
    last_code: Option<String>,
    last_seen: Option<Timestamp>,
}

impl DedupFilter {
    /// Create a filter with the given window. A window of 0 accepts everything.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_code: None,
            last_seen: None,
        }
    }

    /// Returns `true` if the scan should be processed.
    ///
    /// An accepted scan becomes the new reference point. A rejected one does
    /// not, so a held trigger cannot extend the window indefinitely.
    pub fn check(&mut self, code: &str, now: Timestamp) -> bool {
        if self.is_duplicate(code, now) {
            return false;
        }
        self.last_code = Some(code.to_string());
        self.last_seen = Some(now);
        true
    }

    /// Check without recording.
    pub fn is_duplicate(&self, code: &str, now: Timestamp) -> bool {
        match (&self.last_code, self.last_seen) {
            (Some(last), Some(seen)) => last == code && now.saturating_sub(seen) < self.window_ms,
            _ => false,
        }
    }

    pub fn last_code(&self) -> Option<&str> {
        self.last_code.as_deref()
    }

    pub fn last_seen(&self) -> Option<Timestamp> {
        self.last_seen
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Forget the last scan.
    pub fn clear(&mut self) {
        self.last_code = None;
        self.last_seen = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_scan_accepted() {
        let mut filter = DedupFilter::new(600);
        assert!(filter.check("111", 1000));
        assert_eq!(filter.last_code(), Some("111"));
        assert_eq!(filter.last_seen(), Some(1000));
    }

    #[test]
    fn repeat_within_window_rejected() {
        let mut filter = DedupFilter::new(600);
        assert!(filter.check("111", 1000));
        assert!(!filter.check("111", 1599));
        assert!(filter.check("111", 1600));
    }

    #[test]
    fn rejected_scan_does_not_extend_window() {
        let mut filter = DedupFilter::new(600);
        assert!(filter.check("111", 0));
        assert!(!filter.check("111", 500));
        assert!(filter.check("111", 600));
    }

    #[test]
    fn different_code_always_accepted() {
        let mut filter = DedupFilter::new(600);
        assert!(filter.check("111", 1000));
        assert!(filter.check("222", 1001));
        assert!(filter.check("111", 1002));
    }

    #[test]
    fn zero_window_disables_suppression() {
        let mut filter = DedupFilter::new(0);
        assert!(filter.check("111", 5));
        assert!(filter.check("111", 5));
    }

    #[test]
    fn clear_forgets_last_scan() {
        let mut filter = DedupFilter::new(600);
        filter.check("111", 0);
        filter.clear();
        assert!(filter.check("111", 1));
    }
}
