use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::database::option::OptionRow;

/// A parsed set of HTTP status codes, written as comma-separated codes and
/// `low-high` ranges, e.g. "429,500-504".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusCodeSet {
    ranges: Vec<(u16, u16)>,
}

impl StatusCodeSet {
    pub fn parse(spec: &str) -> StatusCodeSet {
        let mut ranges = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((low, high)) = part.split_once('-') {
                if let (Ok(low), Ok(high)) = (low.trim().parse(), high.trim().parse()) {
                    if low <= high {
                        ranges.push((low, high));
                    }
                }
            } else if let Ok(code) = part.parse() {
                ranges.push((code, code));
            }
        }
        StatusCodeSet { ranges }
    }

    pub fn contains(&self, status: u16) -> bool {
        self.ranges
            .iter()
            .any(|(low, high)| status >= *low && status <= *high)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Runtime knobs loaded from the `options` table. Reads take the snapshot
/// lock briefly; writes come only from option reloads.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Public model name -> dollars per million tokens.
    pub model_prices: HashMap<String, f64>,
    pub quota_remind_threshold: i64,
    pub enable_free_model_pre_consume: bool,
    pub pre_consumed_tokens: i64,
    pub automatic_disable_status_codes: StatusCodeSet,
    pub automatic_retry_status_codes: StatusCodeSet,
    pub retry_times: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            model_prices: HashMap::new(),
            quota_remind_threshold: 100_000,
            enable_free_model_pre_consume: false,
            pre_consumed_tokens: 500,
            automatic_disable_status_codes: StatusCodeSet::parse("401,403"),
            automatic_retry_status_codes: StatusCodeSet::parse("429,500,502,503,504"),
            retry_times: 3,
        }
    }
}

static SETTINGS: Lazy<RwLock<Settings>> = Lazy::new(|| RwLock::new(Settings::default()));

pub fn snapshot() -> Settings {
    SETTINGS.read().unwrap().clone()
}

pub fn model_price(model_name: &str) -> Option<f64> {
    SETTINGS
        .read()
        .unwrap()
        .model_prices
        .get(model_name)
        .copied()
}

/// Loads every option row and applies the keys the core understands.
pub fn load_from_database() {
    let rows = match OptionRow::load_all() {
        Ok(rows) => rows,
        Err(e) => {
            warn!("failed to load options, keeping defaults: {:?}", e);
            return;
        }
    };
    let mut settings = SETTINGS.write().unwrap();
    for row in &rows {
        apply_option(&mut settings, &row.key, &row.value);
    }
    info!(
        "loaded {} option rows, {} model prices",
        rows.len(),
        settings.model_prices.len()
    );
}

fn apply_option(settings: &mut Settings, key: &str, value: &str) {
    match key {
        "ModelPrice" => match serde_json::from_str::<HashMap<String, f64>>(value) {
            Ok(prices) => settings.model_prices = prices,
            Err(e) => warn!("ignoring malformed ModelPrice option: {}", e),
        },
        "QuotaRemindThreshold" => {
            if let Ok(threshold) = value.parse() {
                settings.quota_remind_threshold = threshold;
            }
        }
        "EnableFreeModelPreConsume" => {
            settings.enable_free_model_pre_consume = value == "true";
        }
        "PreConsumedTokens" => {
            if let Ok(tokens) = value.parse() {
                settings.pre_consumed_tokens = tokens;
            }
        }
        "AutomaticDisableStatusCodes" => {
            settings.automatic_disable_status_codes = StatusCodeSet::parse(value);
        }
        "AutomaticRetryStatusCodes" => {
            settings.automatic_retry_status_codes = StatusCodeSet::parse(value);
        }
        "RetryTimes" => {
            if let Ok(times) = value.parse() {
                settings.retry_times = times;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_ranges() {
        let set = StatusCodeSet::parse("429, 500-504");
        assert!(set.contains(429));
        assert!(set.contains(500));
        assert!(set.contains(502));
        assert!(set.contains(504));
        assert!(!set.contains(505));
        assert!(!set.contains(200));
    }

    #[test]
    fn malformed_parts_are_skipped() {
        let set = StatusCodeSet::parse("abc, 503-500, 404");
        assert!(set.contains(404));
        assert!(!set.contains(500));
        assert!(!set.contains(503));
    }

    #[test]
    fn empty_spec_matches_nothing() {
        let set = StatusCodeSet::parse("");
        assert!(set.is_empty());
        assert!(!set.contains(500));
    }

    #[test]
    fn options_apply_to_snapshot() {
        let mut settings = Settings::default();
        apply_option(&mut settings, "ModelPrice", r#"{"gpt-x": 1.0}"#);
        apply_option(&mut settings, "QuotaRemindThreshold", "250000");
        apply_option(&mut settings, "EnableFreeModelPreConsume", "true");
        apply_option(&mut settings, "AutomaticRetryStatusCodes", "502");
        assert_eq!(settings.model_prices.get("gpt-x"), Some(&1.0));
        assert_eq!(settings.quota_remind_threshold, 250_000);
        assert!(settings.enable_free_model_pre_consume);
        assert!(settings.automatic_retry_status_codes.contains(502));
        assert!(!settings.automatic_retry_status_codes.contains(429));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut settings = Settings::default();
        apply_option(&mut settings, "SomeFutureKnob", "whatever");
        assert_eq!(settings.quota_remind_threshold, 100_000);
    }
}
