//! Cancellable timers on an explicit logical clock.
//!
//! Time is a `Duration` since the engine started. Nothing here sleeps: the
//! owner passes the current time in and gets back whatever became due, so
//! tests can drive time without real delays.

use std::time::Duration;

/// One-shot cancellable deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    due: Option<Duration>,
}

impl Deadline {
    pub const fn new() -> Self {
        Self { due: None }
    }

    /// Arms (or re-arms) the deadline `after` from `now`.
    pub fn arm(&mut self, now: Duration, after: Duration) {
        self.due = Some(now + after);
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub const fn is_armed(&self) -> bool {
        self.due.is_some()
    }

    /// Disarms and returns true once `now` has reached the due time.
    pub fn fire_if_due(&mut self, now: Duration) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// One period elapsed; carries the remaining count.
    Tick(u32),
    /// The count reached zero. The countdown is stopped.
    Expired,
}

/// Periodic countdown from a fixed seed down to zero.
#[derive(Debug, Clone)]
pub struct Countdown {
    seed: u32,
    remaining: u32,
    period: Duration,
    next_tick: Option<Duration>,
}

impl Countdown {
    pub const fn new(seed: u32, period: Duration) -> Self {
        Self {
            seed,
            remaining: seed,
            period,
            next_tick: None,
        }
    }

    pub fn start(&mut self, now: Duration) {
        self.remaining = self.seed;
        self.next_tick = Some(if self.seed == 0 { now } else { now + self.period });
    }

    /// Stops the countdown. No event is produced after this returns.
    pub fn cancel(&mut self) {
        self.next_tick = None;
    }

    /// Stops and restores the seed value for the next cycle.
    pub fn reset(&mut self) {
        self.cancel();
        self.remaining = self.seed;
    }

    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns at most one due event. Callers loop until `None` so that
    /// ticks are handled strictly one after another.
    pub fn poll(&mut self, now: Duration) -> Option<CountdownEvent> {
        let due = self.next_tick?;
        if now < due {
            return None;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.next_tick = None;
            Some(CountdownEvent::Expired)
        } else {
            // Schedule from the previous due time so late polls catch up tick by tick.
            self.next_tick = Some(due + self.period);
            Some(CountdownEvent::Tick(self.remaining))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_deadline_fires_once() {
        let mut deadline = Deadline::new();
        deadline.arm(Duration::ZERO, 3 * SEC);
        assert!(!deadline.fire_if_due(2 * SEC));
        assert!(deadline.fire_if_due(3 * SEC));
        assert!(!deadline.fire_if_due(4 * SEC));
        assert!(!deadline.is_armed());
    }

    #[test]
    fn test_deadline_rearm_extends() {
        let mut deadline = Deadline::new();
        deadline.arm(Duration::ZERO, 3 * SEC);
        deadline.arm(2 * SEC, 3 * SEC);
        assert!(!deadline.fire_if_due(4 * SEC));
        assert!(deadline.fire_if_due(5 * SEC));
    }

    #[test]
    fn test_countdown_ticks_in_order() {
        let mut countdown = Countdown::new(3, SEC);
        countdown.start(Duration::ZERO);
        assert_eq!(countdown.poll(Duration::from_millis(500)), None);

        // A late poll still yields every tick, one per call.
        let now = 10 * SEC;
        assert_eq!(countdown.poll(now), Some(CountdownEvent::Tick(2)));
        assert_eq!(countdown.poll(now), Some(CountdownEvent::Tick(1)));
        assert_eq!(countdown.poll(now), Some(CountdownEvent::Expired));
        assert_eq!(countdown.poll(now), None);
    }

    #[test]
    fn test_countdown_cancel_stops_ticks() {
        let mut countdown = Countdown::new(5, SEC);
        countdown.start(Duration::ZERO);
        assert_eq!(countdown.poll(SEC), Some(CountdownEvent::Tick(4)));
        countdown.cancel();
        assert_eq!(countdown.poll(30 * SEC), None);
        assert_eq!(countdown.remaining(), 4);

        countdown.reset();
        assert_eq!(countdown.remaining(), 5);
    }

    #[test]
    fn test_zero_seed_expires_immediately() {
        let mut countdown = Countdown::new(0, SEC);
        countdown.start(2 * SEC);
        assert_eq!(countdown.poll(2 * SEC), Some(CountdownEvent::Expired));
    }
}
