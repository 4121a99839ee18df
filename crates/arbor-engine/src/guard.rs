//! Single-slot in-flight guard for refresh loops.
//!
//! A pass claims the slot with a compare-and-swap; a second trigger while the
//! slot is held gets `None` and is dropped rather than queued. The slot is
//! released when the token drops, including on early return.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct InFlight {
    busy: AtomicBool,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `None` if a pass already holds it.
    pub fn try_begin(&self) -> Option<InFlightToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightToken { slot: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the slot.
#[derive(Debug)]
pub struct InFlightToken<'a> {
    slot: &'a AtomicBool,
}

impl Drop for InFlightToken<'_> {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_refused() {
        let guard = InFlight::new();
        let token = guard.try_begin();
        assert!(token.is_some());
        assert!(guard.is_busy());
        assert!(guard.try_begin().is_none());
    }

    #[test]
    fn test_drop_releases() {
        let guard = InFlight::new();
        {
            let _token = guard.try_begin().unwrap();
        }
        assert!(!guard.is_busy());
        assert!(guard.try_begin().is_some());
    }
}
