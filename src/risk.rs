//! Risk bands and alert levels for predicted hydrate likelihood

use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this a prediction is low risk
pub const MEDIUM_THRESHOLD: f64 = 2.0;
/// Strictly above this a prediction is high risk
pub const HIGH_THRESHOLD: f64 = 5.0;
/// Strictly above this a prediction is critical
pub const CRITICAL_THRESHOLD: f64 = 7.0;

/// Band a single prediction falls into
///
/// `Critical` is the upper part of the high band, so
/// [`RiskBand::is_high`] is true for it as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    pub const ALL: [RiskBand; 4] = [
        RiskBand::Low,
        RiskBand::Medium,
        RiskBand::High,
        RiskBand::Critical,
    ];

    /// # Examples
    /// ```
    /// use hydrate_alert::risk::RiskBand;
    ///
    /// assert_eq!(RiskBand::classify(1.9), RiskBand::Low);
    /// assert_eq!(RiskBand::classify(5.0), RiskBand::Medium);
    /// assert_eq!(RiskBand::classify(7.5), RiskBand::Critical);
    /// assert!(RiskBand::classify(7.5).is_high());
    /// ```
    pub fn classify(value: f64) -> RiskBand {
        if value > CRITICAL_THRESHOLD {
            RiskBand::Critical
        } else if value > HIGH_THRESHOLD {
            RiskBand::High
        } else if value >= MEDIUM_THRESHOLD {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }

    pub fn is_high(self) -> bool {
        matches!(self, RiskBand::High | RiskBand::Critical)
    }

    pub fn is_critical(self) -> bool {
        self == RiskBand::Critical
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskBand::Low => "Low",
            RiskBand::Medium => "Medium",
            RiskBand::High => "High",
            RiskBand::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dataset-wide alert derived from the highest prediction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn from_max(max: f64) -> AlertLevel {
        if max > CRITICAL_THRESHOLD {
            AlertLevel::Critical
        } else if max > HIGH_THRESHOLD {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AlertLevel::Critical => "CRITICAL: Very high hydrate formation risk detected!",
            AlertLevel::Warning => "WARNING: High hydrate formation risk detected!",
            AlertLevel::Normal => "Hydrate formation risk is within acceptable limits",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries() {
        assert_eq!(RiskBand::classify(-1.0), RiskBand::Low);
        assert_eq!(RiskBand::classify(1.999), RiskBand::Low);
        assert_eq!(RiskBand::classify(2.0), RiskBand::Medium);
        assert_eq!(RiskBand::classify(5.0), RiskBand::Medium);
        assert_eq!(RiskBand::classify(5.0001), RiskBand::High);
        assert_eq!(RiskBand::classify(7.0), RiskBand::High);
        assert_eq!(RiskBand::classify(7.0001), RiskBand::Critical);
    }

    #[test]
    fn critical_is_also_high() {
        let band = RiskBand::classify(9.0);
        assert!(band.is_high());
        assert!(band.is_critical());
        assert!(!RiskBand::classify(6.0).is_critical());
        assert!(!RiskBand::Medium.is_high());
    }

    #[test]
    fn alert_levels() {
        assert_eq!(AlertLevel::from_max(7.2), AlertLevel::Critical);
        assert_eq!(AlertLevel::from_max(7.0), AlertLevel::Warning);
        assert_eq!(AlertLevel::from_max(5.0), AlertLevel::Normal);
        assert!(AlertLevel::Critical.to_string().starts_with("CRITICAL"));
    }
}
