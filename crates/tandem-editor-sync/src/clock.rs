//! Timestamps owned by one session channel.
//!
//! The clock never reads the time itself. Every method takes `now`, so the
//! channel decides where time comes from (tokio's clock, which tests pause).

use std::time::Duration;

use web_time::Instant;

/// Heartbeat, silence-window and language timestamps of a session channel.
#[derive(Debug, Clone)]
pub struct SessionClock {
    last_local_edit_at: Option<Instant>,
    last_language_change_at: Option<Instant>,
    last_pong_at: Instant,
    last_reconnect_at: Instant,
    reconnect_attempts: u32,
}

impl SessionClock {
    /// A fresh clock. The connection counts as alive and just (re)connected at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            last_local_edit_at: None,
            last_language_change_at: None,
            last_pong_at: now,
            last_reconnect_at: now,
            reconnect_attempts: 0,
        }
    }

    pub fn record_local_edit(&mut self, now: Instant) {
        self.last_local_edit_at = Some(now);
    }

    pub fn record_language_change(&mut self, now: Instant) {
        self.last_language_change_at = Some(now);
    }

    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong_at = now;
    }

    pub fn last_local_edit_at(&self) -> Option<Instant> {
        self.last_local_edit_at
    }

    pub fn last_language_change_at(&self) -> Option<Instant> {
        self.last_language_change_at
    }

    pub fn last_pong_at(&self) -> Instant {
        self.last_pong_at
    }

    /// Whether inbound payloads may be released: more than `window` since the
    /// last local edit, or no local edit at all.
    pub fn silence_elapsed(&self, now: Instant, window: Duration) -> bool {
        self.last_local_edit_at
            .is_none_or(|at| now.saturating_duration_since(at) > window)
    }

    /// No pong for longer than `threshold`.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_pong_at) > threshold
    }

    /// Stale, and the last reconnect is more than `cooldown` ago.
    ///
    /// The two timers are independent: a slow network that keeps missing the
    /// threshold still only reconnects once per cooldown.
    pub fn should_reconnect(&self, now: Instant, threshold: Duration, cooldown: Duration) -> bool {
        self.is_stale(now, threshold)
            && now.saturating_duration_since(self.last_reconnect_at) > cooldown
    }

    pub fn record_reconnect(&mut self, now: Instant) {
        self.last_reconnect_at = now;
        self.reconnect_attempts += 1;
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_millis(3000);
    const COOLDOWN: Duration = Duration::from_millis(6000);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_silence_without_edits() {
        let t0 = Instant::now();
        let clock = SessionClock::new(t0);
        assert!(clock.silence_elapsed(t0, ms(1500)));
    }

    #[test]
    fn test_silence_window_is_strict() {
        let t0 = Instant::now();
        let mut clock = SessionClock::new(t0);
        clock.record_local_edit(t0);
        assert!(!clock.silence_elapsed(t0 + ms(1000), ms(1500)));
        assert!(!clock.silence_elapsed(t0 + ms(1500), ms(1500)));
        assert!(clock.silence_elapsed(t0 + ms(1501), ms(1500)));

        clock.record_local_edit(t0 + ms(1400));
        assert!(!clock.silence_elapsed(t0 + ms(2000), ms(1500)));
    }

    #[test]
    fn test_pong_keeps_connection_fresh() {
        let t0 = Instant::now();
        let mut clock = SessionClock::new(t0);
        clock.record_pong(t0 + ms(2500));
        assert!(!clock.is_stale(t0 + ms(5000), THRESHOLD));
        assert!(clock.is_stale(t0 + ms(5501), THRESHOLD));
    }

    #[test]
    fn test_one_reconnect_per_cooldown() {
        let t0 = Instant::now();
        let mut clock = SessionClock::new(t0);

        // Stale, but the channel only just connected.
        assert!(!clock.should_reconnect(t0 + ms(4000), THRESHOLD, COOLDOWN));
        assert!(clock.should_reconnect(t0 + ms(7000), THRESHOLD, COOLDOWN));
        clock.record_reconnect(t0 + ms(7000));

        // Still stale on every tick inside the cooldown.
        for tick in 8..=13 {
            assert!(clock.is_stale(t0 + ms(tick * 1000), THRESHOLD));
            assert!(!clock.should_reconnect(t0 + ms(tick * 1000), THRESHOLD, COOLDOWN));
        }
        assert!(clock.should_reconnect(t0 + ms(14_000), THRESHOLD, COOLDOWN));
        assert_eq!(clock.reconnect_attempts(), 1);
    }

    #[test]
    fn test_fresh_connection_never_reconnects() {
        let t0 = Instant::now();
        let mut clock = SessionClock::new(t0);
        clock.record_pong(t0 + ms(9000));
        assert!(!clock.should_reconnect(t0 + ms(10_000), THRESHOLD, COOLDOWN));
    }
}
