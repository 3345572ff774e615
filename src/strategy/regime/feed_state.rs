//! Feed readiness tracking
//!
//! Readiness is an explicit state machine driven by events the classifier
//! observes, instead of sleeping until a buffer happens to fill:
//!
//! ```text
//!   Subscribed           ReadingOk
//!  ───────────▶ NotReady ─────────▶ Ready
//!                  ▲  ◀───────────    │
//!                  │    NotReady      │ TimeframeChanged / HandleInvalidated /
//!       Subscribed │                  │ SubscriptionFailed / Released
//!                  └──── Stale ◀──────┘
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Readiness of the classifier's indicator handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Handles held, data still warming up
    NotReady,
    Ready,
    /// Handles invalid, must be re-acquired before reading
    Stale,
}

/// Observations that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    Subscribed,
    ReadingOk,
    NotReady,
    HandleInvalidated,
    SubscriptionFailed,
    TimeframeChanged,
    Released,
}

impl FeedState {
    pub fn on(self, event: FeedEvent) -> FeedState {
        match (self, event) {
            (_, FeedEvent::TimeframeChanged)
            | (_, FeedEvent::HandleInvalidated)
            | (_, FeedEvent::SubscriptionFailed)
            | (_, FeedEvent::Released) => FeedState::Stale,
            (_, FeedEvent::Subscribed) => FeedState::NotReady,
            // A good reading cannot revive a stale handle; only a subscribe can
            (FeedState::Stale, _) => FeedState::Stale,
            (_, FeedEvent::ReadingOk) => FeedState::Ready,
            (_, FeedEvent::NotReady) => FeedState::NotReady,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FeedState::Ready)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, FeedState::Stale)
    }
}

/// Lets a given log key through at most once per window
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    last: HashMap<String, Instant>,
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    pub fn allow(&mut self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub fn allow_at(&mut self, key: &str, now: Instant) -> bool {
        match self.last.get(key) {
            Some(&previous) if now.saturating_duration_since(previous) < self.window => false,
            _ => {
                self.last.insert(key.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_sequence() {
        let state = FeedState::Stale
            .on(FeedEvent::Subscribed)
            .on(FeedEvent::NotReady);
        assert_eq!(state, FeedState::NotReady);
        assert_eq!(state.on(FeedEvent::ReadingOk), FeedState::Ready);
    }

    #[test]
    fn test_timeframe_change_makes_stale_until_subscribe() {
        let state = FeedState::Ready.on(FeedEvent::TimeframeChanged);
        assert!(state.is_stale());
        // Readings do not revive a stale handle
        assert!(state.on(FeedEvent::ReadingOk).is_stale());
        assert_eq!(state.on(FeedEvent::Subscribed), FeedState::NotReady);
    }

    #[test]
    fn test_failures_and_release_go_stale() {
        assert!(FeedState::NotReady.on(FeedEvent::SubscriptionFailed).is_stale());
        assert!(FeedState::Ready.on(FeedEvent::HandleInvalidated).is_stale());
        assert!(FeedState::Ready.on(FeedEvent::Released).is_stale());
    }

    #[test]
    fn test_throttle_window() {
        let mut throttle = LogThrottle::new(Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(throttle.allow_at("adx H1", t0));
        assert!(!throttle.allow_at("adx H1", t0 + Duration::from_secs(30)));
        // Independent keys do not share a window
        assert!(throttle.allow_at("atr H1", t0 + Duration::from_secs(30)));
        assert!(throttle.allow_at("adx H1", t0 + Duration::from_secs(61)));
    }
}
