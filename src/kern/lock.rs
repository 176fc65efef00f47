//! Locking Primitives
//!
//! A spin lock on one word. The word is 0 when free and holds the token of
//! the holder otherwise, so the holder can be identified without extra
//! state. Acquisition spins without backoff; the DMA path adds its own
//! with [`backoff_delay`].

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicU32, Ordering};

const FREE: u32 = 0;

/// Spin lock on a single word
#[repr(C)]
pub struct SpinWord {
    word: AtomicU32,
}

impl core::fmt::Debug for SpinWord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinWord")
            .field("holder", &self.holder())
            .finish()
    }
}

impl SpinWord {
    /// Create a new free lock
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(FREE),
        }
    }

    /// One compare-and-set attempt
    pub fn try_acquire(&self, token: NonZeroU32) -> bool {
        self.word
            .compare_exchange(FREE, token.get(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire the lock, calling `relax` between polls
    ///
    /// Not reentrant: a holder calling this again spins forever.
    pub fn acquire_with(&self, token: NonZeroU32, mut relax: impl FnMut()) {
        while !self.try_acquire(token) {
            while self.word.load(Ordering::Relaxed) != FREE {
                relax();
            }
        }
    }

    /// Release the lock only if `token` holds it
    pub fn release_if(&self, token: NonZeroU32) -> bool {
        self.word
            .compare_exchange(token.get(), FREE, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    /// Token of the current holder
    pub fn holder(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.word.load(Ordering::Acquire))
    }

    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::Relaxed) != FREE
    }
}

impl Default for SpinWord {
    fn default() -> Self {
        Self::new()
    }
}

/// Pseudo-random backoff derived from the cycle counter
///
/// Returns a multiple of 16 in `0..=240`.
pub const fn backoff_delay(cycles: u32) -> u32 {
    (cycles & 0xF) << 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn token(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn test_acquire_release() {
        let lock = SpinWord::new();
        assert!(!lock.is_locked());

        lock.acquire_with(token(3), core::hint::spin_loop);
        assert!(lock.is_locked());
        assert_eq!(lock.holder(), Some(token(3)));

        assert!(lock.release_if(token(3)));
        assert!(!lock.is_locked());
        assert_eq!(lock.holder(), None);
    }

    #[test]
    fn test_try_acquire_contended() {
        let lock = SpinWord::new();
        assert!(lock.try_acquire(token(1)));
        assert!(!lock.try_acquire(token(2)));
        assert!(!lock.try_acquire(token(1)));
        assert_eq!(lock.holder(), Some(token(1)));
    }

    #[test]
    fn test_release_if_checks_holder() {
        let lock = SpinWord::new();
        lock.acquire_with(token(5), core::hint::spin_loop);
        assert!(!lock.release_if(token(6)));
        assert!(lock.is_locked());
        assert!(lock.release_if(token(5)));
        assert!(!lock.is_locked());
        assert!(!lock.release_if(token(5)));
    }

    #[test]
    fn test_backoff_delay_range() {
        assert_eq!(backoff_delay(0), 0);
        assert_eq!(backoff_delay(0x1F), 0xF0);
        for cycles in 0..1000 {
            let delay = backoff_delay(cycles);
            assert!(delay <= 240);
            assert_eq!(delay % 16, 0);
        }
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = SpinWord::new();
        let inside = AtomicUsize::new(0);
        let total = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for t in 1..=4 {
                let lock = &lock;
                let inside = &inside;
                let total = &total;
                s.spawn(move || {
                    for _ in 0..200 {
                        lock.acquire_with(token(t), std::thread::yield_now);
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        assert!(lock.release_if(token(t)));
                    }
                });
            }
        });

        assert_eq!(total.load(Ordering::Relaxed), 800);
        assert!(!lock.is_locked());
    }
}
