//! Serial number allocation.
//!
//! Serials correlate replies to commands within one connection epoch.
//! Reseeding on every reconnect moves the sequence to a fresh random
//! origin, so a reply composed against the previous connection cannot
//! collide with a live serial on the new one.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hands out monotonically increasing serials from a random origin.
#[derive(Debug)]
pub(crate) struct SerialAllocator {
    next: AtomicI32,
}

impl SerialAllocator {
    /// Creates an allocator seeded at a random origin.
    pub fn new() -> Self {
        Self {
            next: AtomicI32::new(random_seed()),
        }
    }

    #[cfg(test)]
    pub fn with_seed(seed: i32) -> Self {
        Self {
            next: AtomicI32::new(seed),
        }
    }

    /// Returns the next serial. Wraps around on overflow; the pending set
    /// is always far smaller than the serial space, so a wrapped value
    /// cannot collide with a live one.
    pub fn next(&self) -> i32 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Moves the sequence to a new random origin.
    pub fn reseed(&self) {
        self.next.store(random_seed(), Ordering::Release);
    }

    #[cfg(test)]
    pub fn peek(&self) -> i32 {
        self.next.load(Ordering::Acquire)
    }
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn random_seed() -> i32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut mix = nanos ^ ((std::process::id() as u64) << 32) ^ 0x9E37_79B9_7F4A_7C15;
    // One splitmix64 round spreads the low-entropy inputs across the word.
    mix = (mix ^ (mix >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    mix = (mix ^ (mix >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    (mix ^ (mix >> 31)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serials_increment() {
        let alloc = SerialAllocator::with_seed(100);
        assert_eq!(alloc.next(), 100);
        assert_eq!(alloc.next(), 101);
        assert_eq!(alloc.next(), 102);
    }

    #[test]
    fn test_wraparound() {
        let alloc = SerialAllocator::with_seed(i32::MAX);
        assert_eq!(alloc.next(), i32::MAX);
        assert_eq!(alloc.next(), i32::MIN);
    }

    #[test]
    fn test_reseed_moves_origin() {
        let alloc = SerialAllocator::with_seed(5);
        alloc.next();
        let before = alloc.peek();
        alloc.reseed();
        // A fixed-origin continuation would sit at `before`; after a
        // reseed the odds of landing there are 1 in 2^32.
        assert_ne!(alloc.peek(), before);
    }
}
