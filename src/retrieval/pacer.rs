//! Process-wide pacing of outbound E-utilities requests.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes outbound requests so that consecutive dispatches are spaced by
/// at least the configured minimum interval, NCBI's politeness requirement.
///
/// `acquire` reserves the next dispatch slot under a short critical section
/// and then sleeps outside the lock until that slot arrives. First come,
/// first served by lock order; a caller cancelled mid-sleep wastes its slot
/// but leaves the watermark intact, so cancellation can never burst the
/// upstream service or wedge the lock.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until this caller's dispatch slot. Cannot fail, only delay.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
