use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Chart timeframe, ordered by bar duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    /// Every supported timeframe, shortest first
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    /// Bar length in minutes (a month is counted as 30 days)
    pub fn minutes(&self) -> u64 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1_440,
            Self::W1 => 10_080,
            Self::MN1 => 43_200,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.minutes() * 60)
    }

    pub fn seconds(&self) -> i64 {
        (self.minutes() * 60) as i64
    }

    /// Daily bars or slower
    pub fn is_daily_or_slower(&self) -> bool {
        *self >= Self::D1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::W1 => "W1",
            Self::MN1 => "MN1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown timeframe '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_duration() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].minutes() < pair[1].minutes());
        }
    }

    #[test]
    fn test_parse_round_trip() {
        assert_eq!("h4".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!("MN1".parse::<Timeframe>().unwrap(), Timeframe::MN1);
        assert!("H2".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_daily_or_slower() {
        assert!(!Timeframe::H4.is_daily_or_slower());
        assert!(Timeframe::D1.is_daily_or_slower());
        assert!(Timeframe::W1.is_daily_or_slower());
    }
}
