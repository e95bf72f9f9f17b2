//! Randomized timer source.
//!
//! Each waiting role obtains a fresh handle (a `tokio::time::Sleep` future)
//! every time it enters a waiting state, so a handle from a prior role can
//! never fire into the next one — there is nothing to drop, the old
//! future is simply never polled again once its owning loop returns.

use rand::Rng;
use tokio::time::{sleep, Sleep};

use crate::config::{LONG_TIMER_MIN, LONG_TIMER_MAX, SHORT_TIMER};

/// Heartbeat / vote-retry interval: fixed at 2s.
pub fn short_timer() -> Sleep {
    sleep(SHORT_TIMER)
}

/// Election timeout / election-term deadline: uniform in [5s, 10s).
pub fn long_timer() -> Sleep {
    sleep(long_timer_duration())
}

fn long_timer_duration() -> std::time::Duration {
    let min = LONG_TIMER_MIN.as_millis() as u64;
    let max = LONG_TIMER_MAX.as_millis() as u64;
    let millis = rand::thread_rng().gen_range(min..max);
    std::time::Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_timer_duration_stays_in_bounds() {
        for _ in 0..1000 {
            let d = long_timer_duration();
            assert!(d >= LONG_TIMER_MIN);
            assert!(d < LONG_TIMER_MAX);
        }
    }
}
