//! Per-part size enforcement.

/// Tracks cumulative bytes observed for one part against the configured
/// maximum.
///
/// Once the running count exceeds the limit the guard is tripped and stays
/// tripped for the rest of the part; it never rewinds. [`SizeGuard::reset`]
/// must be called before starting the next part.
#[derive(Debug)]
pub struct SizeGuard {
    limit: u64,
    seen: u64,
    tripped: bool,
}

impl SizeGuard {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            seen: 0,
            tripped: false,
        }
    }

    /// Record `n` more bytes of the current part. Returns `true` while the
    /// part is still within the limit.
    pub fn observe(&mut self, n: usize) -> bool {
        self.seen = self.seen.saturating_add(n as u64);
        if self.seen > self.limit {
            self.tripped = true;
        }
        !self.tripped
    }

    /// Check a size declared upfront (e.g. a per-part `Content-Length`
    /// header) without consuming any bytes. Trips the guard if the declared
    /// size already exceeds the limit.
    pub fn precheck(&mut self, declared: u64) -> bool {
        if declared > self.limit {
            self.tripped = true;
        }
        !self.tripped
    }

    pub fn tripped(&self) -> bool {
        self.tripped
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Re-arm the guard for the next part.
    pub fn reset(&mut self) {
        self.seen = 0;
        self.tripped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_limit() {
        let mut guard = SizeGuard::new(100);
        assert!(guard.observe(60));
        assert!(guard.observe(40)); // exactly at the limit is fine
        assert!(!guard.tripped());
        assert_eq!(guard.seen(), 100);
    }

    #[test]
    fn trips_when_exceeded_and_stays_tripped() {
        let mut guard = SizeGuard::new(100);
        assert!(guard.observe(100));
        assert!(!guard.observe(1));
        assert!(guard.tripped());
        // Never resets mid-part, even for zero-length observations
        assert!(!guard.observe(0));
        assert!(guard.tripped());
    }

    #[test]
    fn precheck_rejects_oversized_declarations() {
        let mut guard = SizeGuard::new(1024);
        assert!(guard.precheck(1024));
        assert!(!guard.precheck(1025));
        assert!(guard.tripped());
    }

    #[test]
    fn reset_rearms_for_next_part() {
        let mut guard = SizeGuard::new(10);
        assert!(!guard.observe(11));
        guard.reset();
        assert!(!guard.tripped());
        assert!(guard.observe(10));
    }
}
