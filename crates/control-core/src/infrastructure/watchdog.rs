//! Idle-timeout watchdog.
//!
//! A session races its request loop against [`watchdog`].  The request loop
//! pushes the shared [`Deadline`] forward each time it starts waiting for a
//! request; the watchdog sleeps until the deadline and, if it has not moved,
//! completes.  The session's `select!` then drops the request loop, which
//! abandons any read or write that was in flight.
//!
//! The watchdog never touches the socket.  Finishing is its only signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// A deadline shared between one writer (the request loop) and one reader
/// (the watchdog).
///
/// Stored as nanoseconds since a fixed origin so it fits in an atomic; no
/// lock is needed with a single writer.  Uses `tokio::time::Instant`, so it
/// follows paused/virtual time in tests.
#[derive(Debug)]
pub struct Deadline {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl Deadline {
    /// Creates a deadline `timeout` from now.
    ///
    /// A timeout too large to represent saturates to the furthest deadline
    /// the offset can hold (about 584 years).
    pub fn after(timeout: Duration) -> Self {
        let origin = Instant::now();
        let deadline = Self {
            origin,
            offset_nanos: AtomicU64::new(0),
        };
        deadline.set(Duration::ZERO, timeout);
        deadline
    }

    /// Moves the deadline to `now + timeout`, saturating like [`after`](Self::after).
    pub fn extend(&self, timeout: Duration) {
        self.set(Instant::now().saturating_duration_since(self.origin), timeout);
    }

    /// The current deadline.
    pub fn instant(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.instant() <= Instant::now()
    }

    /// Stores `elapsed + timeout` as an offset from the origin.  Never adds
    /// to an `Instant`, which panics on overflow.
    fn set(&self, elapsed: Duration, timeout: Duration) {
        let nanos = elapsed.saturating_add(timeout).as_nanos();
        let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
        self.offset_nanos.store(nanos, Ordering::Release);
    }
}

/// Completes once `deadline` has passed without being extended.
///
/// After each wake-up the deadline is read again: an extension that happened
/// while the timer was armed sends the watchdog back to sleep instead of
/// being lost.
pub async fn watchdog(deadline: &Deadline) {
    loop {
        let at = deadline.instant();
        if at <= Instant::now() {
            return;
        }
        sleep_until(at).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    // Paused time advances in whole timer ticks; allow a few ticks of slack.
    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed <= expected + Duration::from_millis(20),
            "expected ~{expected:?}, got {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_fires_at_deadline() {
        // Arrange
        let start = Instant::now();
        let deadline = Deadline::after(Duration::from_secs(3));

        // Act
        watchdog(&deadline).await;

        // Assert
        assert_elapsed(start, Duration::from_secs(3));
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extension_while_armed_is_honoured() {
        // Arrange: a 3 s deadline extended at t=2 s by another 3 s
        let start = Instant::now();
        let deadline = Deadline::after(Duration::from_secs(3));

        // Act
        tokio::join!(watchdog(&deadline), async {
            sleep(Duration::from_secs(2)).await;
            deadline.extend(Duration::from_secs(3));
        });

        // Assert: the watchdog slept past its first timer and fired at t=5 s
        assert_elapsed(start, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_extensions_keep_watchdog_asleep() {
        let start = Instant::now();
        let deadline = Deadline::after(Duration::from_secs(1));

        tokio::join!(watchdog(&deadline), async {
            for _ in 0..10 {
                sleep(Duration::from_millis(900)).await;
                deadline.extend(Duration::from_secs(1));
            }
        });

        // Last extension at t=9 s, plus one second.
        assert_elapsed(start, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_returns_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        let start = Instant::now();
        watchdog(&deadline).await;
        assert_elapsed(start, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_instant_tracks_extend() {
        let deadline = Deadline::after(Duration::from_secs(60));
        sleep(Duration::from_secs(10)).await;
        deadline.extend(Duration::from_secs(60));
        assert_eq!(deadline.instant() - Instant::now(), Duration::from_secs(60));
        assert!(!deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_saturates_instead_of_overflowing() {
        // Arrange
        let deadline = Deadline::after(Duration::MAX);
        let saturated = deadline.instant();

        // Act
        sleep(Duration::from_secs(10)).await;
        deadline.extend(Duration::from_secs(u64::MAX));

        // Assert: still saturated at the furthest representable deadline
        assert_eq!(deadline.instant(), saturated);
        assert!(saturated - Instant::now() > Duration::from_secs(500 * 365 * 24 * 3600));
        assert!(!deadline.is_expired());
    }
}
