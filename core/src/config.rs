//! Detection parameters.
//!
//! RULE: the engine never reads the process environment.
//! Settings are resolved once by the caller (defaults, then settings
//! file, then environment) and handed to `WatchEngine::new`.

use crate::{
    error::{ConfigError, WatchResult},
    record::parse_amount_str,
    types::{Amount, Timestamp},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};

// ── Setting keys ─────────────────────────────────────────────────────────────

pub const LARGE_AMOUNT_THRESHOLD: &str = "LARGE_AMOUNT_THRESHOLD";
pub const TRANSFER_DAYS_WINDOW: &str = "TRANSFER_DAYS_WINDOW";
pub const TRANSFER_AMOUNT_TOLERANCE: &str = "TRANSFER_AMOUNT_TOLERANCE";
pub const STRUCTURING_CEILING: &str = "STRUCTURING_CEILING";
pub const STRUCTURING_MIN_RECORDS: &str = "STRUCTURING_MIN_RECORDS";

pub const SETTING_KEYS: [&str; 5] = [
    LARGE_AMOUNT_THRESHOLD,
    TRANSFER_DAYS_WINDOW,
    TRANSFER_AMOUNT_TOLERANCE,
    STRUCTURING_CEILING,
    STRUCTURING_MIN_RECORDS,
];

// ── Defaults ─────────────────────────────────────────────────────────────────

const DEFAULT_THRESHOLD: i64 = 1_000_000;
const DEFAULT_WINDOW_DAYS: u32 = 3;
const DEFAULT_TOLERANCE: i64 = 500;
const DEFAULT_MIN_RECORDS: usize = 2;

/// Whether a cumulative sum exactly equal to the threshold still counts
/// as structuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ceiling {
    /// Qualifying interval is `[threshold - tolerance, threshold)`.
    #[default]
    Exclusive,
    /// Qualifying interval is `[threshold - tolerance, threshold]`.
    Inclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuringPolicy {
    pub ceiling: Ceiling,
    /// Fewest records a qualifying window may hold.
    pub min_records: usize,
}

impl Default for StructuringPolicy {
    fn default() -> Self {
        Self {
            ceiling: Ceiling::Exclusive,
            min_records: DEFAULT_MIN_RECORDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub large_amount_threshold: Amount,
    /// Inclusive calendar-day span of one structuring window.
    pub transfer_days_window: u32,
    /// Shortfall below the threshold still treated as a near miss.
    pub transfer_amount_tolerance: Amount,
    #[serde(default)]
    pub structuring: StructuringPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            large_amount_threshold: Decimal::new(DEFAULT_THRESHOLD, 0),
            transfer_days_window: DEFAULT_WINDOW_DAYS,
            transfer_amount_tolerance: Decimal::new(DEFAULT_TOLERANCE, 0),
            structuring: StructuringPolicy::default(),
        }
    }
}

impl DetectionConfig {
    /// Build and validate a configuration with the default structuring policy.
    pub fn new(
        large_amount_threshold: Amount,
        transfer_days_window: u32,
        transfer_amount_tolerance: Amount,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            large_amount_threshold,
            transfer_days_window,
            transfer_amount_tolerance,
            structuring: StructuringPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_policy(mut self, policy: StructuringPolicy) -> Result<Self, ConfigError> {
        self.structuring = policy;
        self.validate()?;
        Ok(self)
    }

    /// Check every parameter invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.large_amount_threshold <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveThreshold {
                value: self.large_amount_threshold.to_string(),
            });
        }
        if self.transfer_days_window == 0 {
            return Err(ConfigError::EmptyWindow { value: 0 });
        }
        if self.transfer_amount_tolerance < Decimal::ZERO {
            return Err(ConfigError::NegativeTolerance {
                value: self.transfer_amount_tolerance.to_string(),
            });
        }
        if self.structuring.min_records < DEFAULT_MIN_RECORDS {
            return Err(ConfigError::MinRecordsTooSmall {
                value: self.structuring.min_records,
            });
        }
        Ok(())
    }

    /// Lower bound of the structuring band.
    pub fn structuring_floor(&self) -> Amount {
        self.large_amount_threshold - self.transfer_amount_tolerance
    }

    /// True when a single transfer must be flagged as large.
    pub fn is_large(&self, amount: Amount) -> bool {
        amount >= self.large_amount_threshold
    }

    /// True when a cumulative sum lies inside the structuring band.
    pub fn in_structuring_band(&self, sum: Amount) -> bool {
        sum >= self.structuring_floor() && !self.over_ceiling(sum)
    }

    /// True when a cumulative sum is past the top of the band.
    pub fn over_ceiling(&self, sum: Amount) -> bool {
        match self.structuring.ceiling {
            Ceiling::Exclusive => sum >= self.large_amount_threshold,
            Ceiling::Inclusive => sum > self.large_amount_threshold,
        }
    }

    /// True when `earlier` still falls inside a window led by `latest`.
    pub fn within_window(&self, earlier: Timestamp, latest: Timestamp) -> bool {
        let span = (latest.date() - earlier.date()).num_days();
        span < i64::from(self.transfer_days_window)
    }

    /// Overlay settings from any key lookup, then validate.
    ///
    /// Keys are the `SETTING_KEYS` names. The runner passes
    /// `std::env::var`; `load` passes a settings-file map.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(LARGE_AMOUNT_THRESHOLD) {
            self.large_amount_threshold = parse_setting_amount(LARGE_AMOUNT_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(TRANSFER_DAYS_WINDOW) {
            let days: i64 = raw.trim().parse().map_err(|_| invalid(TRANSFER_DAYS_WINDOW, &raw))?;
            if days < 1 {
                return Err(ConfigError::EmptyWindow { value: days });
            }
            self.transfer_days_window =
                u32::try_from(days).map_err(|_| invalid(TRANSFER_DAYS_WINDOW, &raw))?;
        }
        if let Some(raw) = lookup(TRANSFER_AMOUNT_TOLERANCE) {
            self.transfer_amount_tolerance =
                parse_setting_amount(TRANSFER_AMOUNT_TOLERANCE, &raw)?;
        }
        if let Some(raw) = lookup(STRUCTURING_CEILING) {
            self.structuring.ceiling = match raw.trim().to_ascii_lowercase().as_str() {
                "exclusive" => Ceiling::Exclusive,
                "inclusive" => Ceiling::Inclusive,
                _ => return Err(invalid(STRUCTURING_CEILING, &raw)),
            };
        }
        if let Some(raw) = lookup(STRUCTURING_MIN_RECORDS) {
            self.structuring.min_records =
                raw.trim().parse().map_err(|_| invalid(STRUCTURING_MIN_RECORDS, &raw))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Load a settings JSON file keyed by setting name, e.g.
    /// `{"LARGE_AMOUNT_THRESHOLD": 1000000, "TRANSFER_DAYS_WINDOW": 3}`.
    /// Unknown keys are ignored; missing keys keep `base` values.
    pub fn load(base: Self, path: &Path) -> WatchResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let file: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;
        let config = base.overlay(|key| file.get(key).and_then(setting_text))?;
        log::debug!("Loaded detection settings from {}", path.display());
        Ok(config)
    }
}

fn setting_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_setting_amount(key: &str, raw: &str) -> Result<Amount, ConfigError> {
    parse_amount_str(raw).ok_or_else(|| invalid(key, raw))
}

fn invalid(key: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        key: key.to_string(),
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    #[test]
    fn defaults_match_dashboard_settings() {
        let config = DetectionConfig::default();
        assert_eq!(config.large_amount_threshold, Decimal::new(1_000_000, 0));
        assert_eq!(config.transfer_days_window, 3);
        assert_eq!(config.transfer_amount_tolerance, Decimal::new(500, 0));
        assert_eq!(config.structuring.ceiling, Ceiling::Exclusive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(matches!(
            DetectionConfig::new(Decimal::ZERO, 3, Decimal::ONE),
            Err(ConfigError::NonPositiveThreshold { .. })
        ));
        assert!(matches!(
            DetectionConfig::new(Decimal::ONE, 0, Decimal::ONE),
            Err(ConfigError::EmptyWindow { .. })
        ));
        assert!(matches!(
            DetectionConfig::new(Decimal::ONE, 1, Decimal::NEGATIVE_ONE),
            Err(ConfigError::NegativeTolerance { .. })
        ));
        let policy = StructuringPolicy { ceiling: Ceiling::Exclusive, min_records: 1 };
        assert!(matches!(
            DetectionConfig::default().with_policy(policy),
            Err(ConfigError::MinRecordsTooSmall { value: 1 })
        ));
    }

    #[test]
    fn band_is_open_at_the_top_by_default() {
        let config = DetectionConfig::new(Decimal::new(50_000, 0), 3, Decimal::new(1_000, 0)).unwrap();
        assert!(config.in_structuring_band(Decimal::new(49_000, 0)));
        assert!(config.in_structuring_band(Decimal::new(49_999, 0)));
        assert!(!config.in_structuring_band(Decimal::new(50_000, 0)));
        assert!(!config.in_structuring_band(Decimal::new(48_999, 0)));

        let inclusive = config
            .with_policy(StructuringPolicy { ceiling: Ceiling::Inclusive, min_records: 2 })
            .unwrap();
        assert!(inclusive.in_structuring_band(Decimal::new(50_000, 0)));
    }

    #[test]
    fn window_counts_calendar_days_inclusively() {
        let config = DetectionConfig::new(Decimal::ONE_HUNDRED, 3, Decimal::ONE).unwrap();
        assert!(config.within_window(day(1), day(3)));
        assert!(!config.within_window(day(1), day(4)));

        let single_day = DetectionConfig::new(Decimal::ONE_HUNDRED, 1, Decimal::ONE).unwrap();
        assert!(single_day.within_window(day(5), day(5)));
        assert!(!single_day.within_window(day(4), day(5)));
    }

    #[test]
    fn overlay_reads_lookup_values() {
        let env: HashMap<&str, &str> = [
            (LARGE_AMOUNT_THRESHOLD, "2,000,000"),
            (TRANSFER_DAYS_WINDOW, "7"),
            (STRUCTURING_CEILING, "Inclusive"),
        ]
        .into_iter()
        .collect();
        let config = DetectionConfig::default()
            .overlay(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.large_amount_threshold, Decimal::new(2_000_000, 0));
        assert_eq!(config.transfer_days_window, 7);
        assert_eq!(config.transfer_amount_tolerance, Decimal::new(500, 0));
        assert_eq!(config.structuring.ceiling, Ceiling::Inclusive);
    }

    #[test]
    fn overlay_reports_bad_values() {
        let err = DetectionConfig::default()
            .overlay(|key| (key == TRANSFER_DAYS_WINDOW).then(|| "three".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidSetting {
                key: TRANSFER_DAYS_WINDOW.into(),
                value: "three".into()
            }
        );

        let err = DetectionConfig::default()
            .overlay(|key| (key == TRANSFER_DAYS_WINDOW).then(|| "0".to_string()))
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyWindow { value: 0 });
    }
}
