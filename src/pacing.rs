//! Admission pacing for batch submissions
//!
//! The [`Pacer`] enforces a minimum gap between successive pipeline admissions.
//! It is owned by the single admission loop, so waiting for the next slot never
//! touches shared state.

use std::time::Duration;
use tokio::time::Instant;

/// Minimum-interval gate between admissions
///
/// # Examples
///
/// ```
/// use replicate_dl::pacing::Pacer;
/// use std::time::Duration;
///
/// # async fn example() {
/// let mut pacer = Pacer::new(Duration::from_millis(250));
/// pacer.ready().await; // first admission is immediate
/// pacer.ready().await; // waits until 250ms after the first
/// # }
/// ```
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    next_slot: Option<Instant>,
}

impl Pacer {
    /// Create a pacer that spaces admissions at least `delay` apart
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: None,
        }
    }

    /// Configured minimum gap
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait for the next admission slot and claim it
    ///
    /// The first call returns immediately. If the returned future is dropped
    /// before completing (e.g. raced against cancellation in `select!`), the
    /// slot is not claimed.
    pub async fn ready(&mut self) {
        if let Some(at) = self.next_slot {
            tokio::time::sleep_until(at).await;
        }
        self.next_slot = Some(Instant::now() + self.delay);
    }
}
