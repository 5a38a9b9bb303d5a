//! Thread-safe sequence counter for status refresh requests.
//!
//! Every status refresh draws a number from this counter before it starts
//! querying the presentation application.  When the answer comes back, the
//! state store compares that number with the last one it applied and
//! discards answers that were overtaken by a newer refresh.  Two refreshes
//! in flight at the same time (a polling tick and a command) are therefore
//! ordered by when they *started*, which makes the race analysable.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing counter.
///
/// The first call to [`next`](Self::next) returns 1, so 0 can mean "nothing
/// applied yet".
///
/// # Examples
///
/// ```rust
/// use keyosc_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter; the first issued value is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number.
    ///
    /// `Relaxed` is enough: the numbers order requests, they do not publish
    /// memory.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the most recently issued value (0 if none).
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
