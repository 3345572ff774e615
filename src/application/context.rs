//! Per-instrument state carried between engine cycles

use chrono::{DateTime, Duration, Utc};

use crate::domain::{KeyLevel, MarketRegime, RegimeSnapshot};
use crate::ports::KeyLevelProvider;

/// Configured seconds as a duration, saturating at the largest one chrono holds
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Regime transition observed between two cycles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeChange {
    pub from: MarketRegime,
    pub to: MarketRegime,
    pub confidence: f64,
}

/// Everything one instrument remembers across cycles. Nothing here is
/// shared with other instruments.
#[derive(Debug, Clone)]
pub struct InstrumentContext {
    symbol: String,
    previous: Option<RegimeSnapshot>,
    cooldown_until: Option<DateTime<Utc>>,
    levels: Vec<KeyLevel>,
    levels_refreshed: Option<DateTime<Utc>>,
    signal_cooldown: Duration,
    level_refresh: Duration,
}

impl InstrumentContext {
    pub fn new(symbol: impl Into<String>, signal_cooldown_secs: u64, level_refresh_secs: u64) -> Self {
        Self {
            symbol: symbol.into(),
            previous: None,
            cooldown_until: None,
            levels: Vec::new(),
            levels_refreshed: None,
            signal_cooldown: seconds(signal_cooldown_secs),
            level_refresh: seconds(level_refresh_secs),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Remember `snapshot` and report a regime transition, if any.
    /// The first snapshot is never a change.
    pub fn observe(&mut self, snapshot: &RegimeSnapshot) -> Option<RegimeChange> {
        let change = self
            .previous
            .filter(|prev| prev.regime != snapshot.regime)
            .map(|prev| RegimeChange {
                from: prev.regime,
                to: snapshot.regime,
                confidence: snapshot.confidence,
            });
        self.previous = Some(*snapshot);
        change
    }

    pub fn previous(&self) -> Option<&RegimeSnapshot> {
        self.previous.as_ref()
    }

    pub fn start_cooldown(&mut self, now: DateTime<Utc>) {
        let until = now
            .checked_add_signed(self.signal_cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.cooldown_until = Some(until);
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Cached key levels, re-read from `provider` once the refresh interval passed
    pub fn levels(&mut self, now: DateTime<Utc>, provider: &dyn KeyLevelProvider) -> &[KeyLevel] {
        let due = self
            .levels_refreshed
            .map_or(true, |at| now - at >= self.level_refresh);
        if due {
            self.levels = provider.key_levels(&self.symbol);
            self.levels_refreshed = Some(now);
            tracing::debug!("{} key levels refreshed: {} levels", self.symbol, self.levels.len());
        }
        &self.levels
    }
}
