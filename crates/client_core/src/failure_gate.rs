//! Suppression of repeated identical failure notifications.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct FailureGateOptions {
    /// Every `threshold`-th consecutive identical failure is surfaced again.
    pub threshold: u32,
    /// Failures further apart than this count as a new streak.
    pub window: Duration,
}

impl Default for FailureGateOptions {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailureGate {
    options: FailureGateOptions,
    last_key: Option<String>,
    last_seen: Option<Instant>,
    consecutive: u32,
}

impl FailureGate {
    pub fn new(options: FailureGateOptions) -> Self {
        Self {
            options,
            last_key: None,
            last_seen: None,
            consecutive: 0,
        }
    }

    pub fn should_notify(&mut self, key: &str) -> bool {
        self.should_notify_at(key, Instant::now())
    }

    /// Records a failure and reports whether it deserves a notification: the
    /// first of a streak does, and so does every `threshold`-th repeat.
    pub fn should_notify_at(&mut self, key: &str, now: Instant) -> bool {
        let continues_streak = self.last_key.as_deref() == Some(key)
            && self
                .last_seen
                .is_some_and(|seen| now.saturating_duration_since(seen) <= self.options.window);

        if continues_streak {
            self.consecutive += 1;
        } else {
            self.last_key = Some(key.to_string());
            self.consecutive = 1;
        }
        self.last_seen = Some(now);

        let threshold = self.options.threshold.max(1);
        self.consecutive == 1 || self.consecutive % threshold == 0
    }

    pub fn record_success(&mut self) {
        self.last_key = None;
        self.last_seen = None;
        self.consecutive = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }
}

impl Default for FailureGate {
    fn default() -> Self {
        Self::new(FailureGateOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_and_every_threshold_repeat_notify() {
        let mut gate = FailureGate::new(FailureGateOptions {
            threshold: 3,
            window: Duration::from_secs(60),
        });
        let now = Instant::now();
        let decisions: Vec<bool> = (0..7)
            .map(|n| gate.should_notify_at("events down", now + Duration::from_secs(n)))
            .collect();
        assert_eq!(
            decisions,
            vec![true, false, true, false, false, true, false]
        );
    }

    #[test]
    fn different_error_starts_a_new_streak() {
        let mut gate = FailureGate::default();
        let now = Instant::now();
        assert!(gate.should_notify_at("a", now));
        assert!(!gate.should_notify_at("a", now));
        assert!(gate.should_notify_at("b", now));
        assert_eq!(gate.consecutive_failures(), 1);
    }

    #[test]
    fn quiet_gap_longer_than_window_resets() {
        let mut gate = FailureGate::new(FailureGateOptions {
            threshold: 10,
            window: Duration::from_secs(5),
        });
        let now = Instant::now();
        assert!(gate.should_notify_at("a", now));
        assert!(!gate.should_notify_at("a", now + Duration::from_secs(4)));
        assert!(gate.should_notify_at("a", now + Duration::from_secs(20)));
    }

    #[test]
    fn success_resets_the_streak() {
        let mut gate = FailureGate::default();
        assert!(gate.should_notify("a"));
        assert!(!gate.should_notify("a"));
        gate.record_success();
        assert!(gate.should_notify("a"));
    }
}
