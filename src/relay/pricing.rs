use crate::relay::error::RelayError;
use crate::relay::info::{PriceData, RelayInfo};
use crate::service::settings::{self, Settings};
use crate::utils::billing::calc_quota_from_tokens;

/// Resolves the price record for the requested model and derives the
/// pre-consume estimate:
///   pre_consumed_tokens = max(prompt_tokens, PreConsumedTokens) + max_tokens
/// An unpriced model fails unless the user opted into unpriced models, in
/// which case it relays for free.
pub fn model_price_helper(
    info: &mut RelayInfo,
    prompt_tokens: i64,
    max_tokens: i64,
) -> Result<PriceData, RelayError> {
    let settings = settings::snapshot();
    let price_data = resolve_price(
        &settings,
        &info.origin_model_name,
        info.accept_unset_model_price,
        prompt_tokens,
        max_tokens,
    )?;
    info.price_data = price_data.clone();
    Ok(price_data)
}

fn resolve_price(
    settings: &Settings,
    model_name: &str,
    accept_unset_model_price: bool,
    prompt_tokens: i64,
    max_tokens: i64,
) -> Result<PriceData, RelayError> {
    let model_price = match settings.model_prices.get(model_name) {
        Some(price) => *price,
        None => {
            if !accept_unset_model_price {
                return Err(RelayError::model_not_priced(model_name));
            }
            0.0
        }
    };
    let free_model = model_price == 0.0;

    let mut pre_consumed_tokens = prompt_tokens.max(settings.pre_consumed_tokens);
    if max_tokens > 0 {
        pre_consumed_tokens += max_tokens;
    }
    let mut quota_to_pre_consume = calc_quota_from_tokens(pre_consumed_tokens, model_price);

    if free_model && !settings.enable_free_model_pre_consume {
        quota_to_pre_consume = 0;
    }

    Ok(PriceData {
        model_price,
        use_price: true,
        free_model,
        group_ratio: 1.0,
        quota_to_pre_consume,
        cache_ratio: 1.0,
        image_ratio: 1.0,
        audio_ratio: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_with_price(model: &str, price: f64) -> Settings {
        let mut prices = HashMap::new();
        prices.insert(model.to_string(), price);
        Settings {
            model_prices: prices,
            pre_consumed_tokens: 500,
            enable_free_model_pre_consume: false,
            ..Settings::default()
        }
    }

    #[test]
    fn priced_model_pre_consumes_estimate() {
        let settings = settings_with_price("gpt-x", 1.0);
        // prompt below the floor: floor wins; plus max_tokens.
        let price = resolve_price(&settings, "gpt-x", false, 100, 1000).unwrap();
        assert!(!price.free_model);
        // (max(100, 500) + 1000) tokens at $1/1M * 500000 = 750
        assert_eq!(price.quota_to_pre_consume, 750);
    }

    #[test]
    fn prompt_above_floor_is_used() {
        let settings = settings_with_price("gpt-x", 1.0);
        let price = resolve_price(&settings, "gpt-x", false, 2000, 0).unwrap();
        assert_eq!(price.quota_to_pre_consume, 1000);
    }

    #[test]
    fn unpriced_model_fails_without_opt_in() {
        let settings = settings_with_price("gpt-x", 1.0);
        let err = resolve_price(&settings, "unknown-model", false, 10, 0).unwrap_err();
        assert!(err.message.contains("unknown-model"));
    }

    #[test]
    fn unpriced_model_is_free_with_opt_in() {
        let settings = settings_with_price("gpt-x", 1.0);
        let price = resolve_price(&settings, "unknown-model", true, 10, 0).unwrap();
        assert!(price.free_model);
        assert_eq!(price.model_price, 0.0);
        assert_eq!(price.quota_to_pre_consume, 0);
    }

    #[test]
    fn free_model_pre_consume_knob() {
        let mut settings = settings_with_price("free-model", 0.0);
        let price = resolve_price(&settings, "free-model", false, 10, 0).unwrap();
        assert_eq!(price.quota_to_pre_consume, 0);

        // With the knob on, free models still pre-consume 0 because the
        // quota formula zeroes on a zero price.
        settings.enable_free_model_pre_consume = true;
        let price = resolve_price(&settings, "free-model", false, 10, 0).unwrap();
        assert_eq!(price.quota_to_pre_consume, 0);
    }
}
