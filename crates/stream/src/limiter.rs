// Copyright 2025-2026 CEMAXECUTER LLC

/// One I byte and one Q byte per complex sample
pub const BYTES_PER_SAMPLE: u64 = 2;

/// Remaining byte budget of a transfer. `None` means unlimited.
///
/// Only ever counts down; once it reaches zero the transfer is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferLimiter {
    remaining: Option<u64>,
}

impl TransferLimiter {
    pub fn unlimited() -> Self {
        Self { remaining: None }
    }

    pub fn bytes(limit: u64) -> Self {
        Self {
            remaining: Some(limit),
        }
    }

    pub fn samples(count: u64) -> Self {
        Self::bytes(count.saturating_mul(BYTES_PER_SAMPLE))
    }

    pub fn from_bytes(limit: Option<u64>) -> Self {
        Self { remaining: limit }
    }

    /// Claim up to `want` bytes of the budget and return how many may move.
    pub fn take(&mut self, want: usize) -> usize {
        match self.remaining.as_mut() {
            None => want,
            Some(left) => {
                let granted = (*left).min(want as u64);
                *left -= granted;
                granted as usize
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_grants_everything() {
        let mut l = TransferLimiter::unlimited();
        assert_eq!(l.take(262_144), 262_144);
        assert!(!l.is_exhausted());
        assert_eq!(l.remaining(), None);
    }

    #[test]
    fn test_final_take_is_truncated() {
        let mut l = TransferLimiter::bytes(1000);
        let grants: Vec<usize> = (0..5).map(|_| l.take(256)).collect();
        assert_eq!(grants, vec![256, 256, 256, 232, 0]);
        assert!(l.is_exhausted());
    }

    #[test]
    fn test_samples_are_two_bytes() {
        let mut l = TransferLimiter::samples(100);
        assert_eq!(l.remaining(), Some(200));
        assert_eq!(l.take(500), 200);
        assert!(l.is_exhausted());
    }

    #[test]
    fn test_zero_limit_is_exhausted_immediately() {
        let mut l = TransferLimiter::bytes(0);
        assert!(l.is_exhausted());
        assert_eq!(l.take(16), 0);
    }
}
