use serde_json::json;
use tracing::{error, info as log_info, warn};

use crate::database::channel::Channel;
use crate::database::log::{ConsumeLog, RecordConsumeLogParams};
use crate::database::token::Token;
use crate::database::user::User;
use crate::relay::error::RelayError;
use crate::relay::info::RelayInfo;
use crate::service::notify::{get_notify_manager, QuotaCheck};
use crate::utils::billing::{calc_quota_from_tokens, UsageInfo};

/// PRE_CHARGE: reserve the estimate on the token's remaining quota before the
/// upstream call. The user balance is never touched here; it moves only by
/// delta at reconciliation. Playground-flagged requests skip the step
/// entirely, and unlimited tokens are never debited.
pub fn pre_consume_quota(info: &mut RelayInfo, quota: i64) -> Result<(), RelayError> {
    info.final_pre_consumed_quota = 0;
    if quota <= 0 || info.is_playground {
        return Ok(());
    }

    // Cheap rejection off the auth-time balance snapshot; storage stays
    // untouched until reconciliation.
    if info.user_quota < quota {
        return Err(RelayError::insufficient_quota(format!(
            "user quota is not enough, user quota: {}, need quota: {}",
            info.user_quota, quota
        )));
    }

    if info.token_unlimited {
        return Ok(());
    }

    let affected = Token::decrease_quota(info.token_id, &info.token_key, quota)
        .map_err(|e| RelayError::internal(format!("token pre-charge failed: {:?}", e)))?;
    if affected == 0 {
        return Err(RelayError::insufficient_quota(format!(
            "token quota is not enough, need quota: {}",
            quota
        )));
    }

    info.final_pre_consumed_quota = quota;
    Ok(())
}

/// Returns the full pre-charge, symmetric to `pre_consume_quota`. Used before
/// a retry on another channel and on failed requests. A non-zero amount
/// implies the token was actually debited, so no playground/unlimited gating
/// is needed here.
pub fn refund_pre_consumed(info: &mut RelayInfo) {
    let quota = info.final_pre_consumed_quota;
    if quota <= 0 {
        return;
    }
    if let Err(e) = Token::increase_quota(info.token_id, &info.token_key, quota) {
        error!("failed to refund token {} pre-charge: {:?}", info.token_id, e);
    }
    info.final_pre_consumed_quota = 0;
}

/// Reconciles the ledgers by delta: positive debits, negative credits. When
/// `notify` is set and anything actually moved, a threshold check is queued on
/// the detached worker. Ledger failures are logged, never surfaced.
pub fn post_consume_quota(info: &RelayInfo, quota_delta: i64, pre_consumed: i64, notify: bool) {
    if quota_delta > 0 {
        match User::decrease_quota(info.user_id, quota_delta) {
            Ok(0) => warn!(
                "user {} balance could not cover post-charge delta {}",
                info.user_id, quota_delta
            ),
            Ok(_) => {}
            Err(e) => error!("user {} post-charge debit failed: {:?}", info.user_id, e),
        }
    } else if quota_delta < 0 {
        if let Err(e) = User::increase_quota(info.user_id, -quota_delta, false) {
            error!("user {} post-charge credit failed: {:?}", info.user_id, e);
        }
    }

    if !info.is_playground && !info.token_unlimited && quota_delta != 0 {
        let result = if quota_delta > 0 {
            Token::decrease_quota(info.token_id, &info.token_key, quota_delta)
        } else {
            Token::increase_quota(info.token_id, &info.token_key, -quota_delta)
        };
        if let Err(e) = result {
            error!("token {} post-charge failed: {:?}", info.token_id, e);
        }
    }

    if notify && (quota_delta + pre_consumed) != 0 {
        get_notify_manager().enqueue(QuotaCheck {
            user_id: info.user_id,
            user_quota: info.user_quota,
            consumed_quota: quota_delta + pre_consumed,
            notify_type: info.notify_type.clone(),
            user_threshold: info.quota_warning_threshold,
        });
    }
}

/// POST_CHARGE + LOG. Computes the real charge from accumulated usage,
/// reconciles the ledgers by delta against the pre-charge, bumps the stats
/// counters and writes exactly one consumption log row. Infallible from the
/// dispatcher's point of view.
pub fn finalize_request(info: &RelayInfo, usage: &UsageInfo) {
    let model_price = info.price_data.model_price;
    let total_tokens = usage.billable_tokens();
    let mut quota = calc_quota_from_tokens(total_tokens, model_price);
    let mut content = format!("price {:.6} $ / 1M tokens", model_price);

    if total_tokens == 0 {
        // A stream that closed without tokens is a known upstream-timeout
        // pathology: charge nothing, refund the whole pre-charge, still log.
        quota = 0;
        content.push_str(" (possibly upstream timeout)");
        error!(
            "total tokens is 0, cannot consume quota, user {} channel {} token {} model {}, pre-consumed {}",
            info.user_id,
            info.channel_id,
            info.token_id,
            info.origin_model_name,
            info.final_pre_consumed_quota
        );
    } else {
        if let Err(e) = User::update_used_quota_and_request_count(info.user_id, quota) {
            error!("failed to update user {} usage stats: {:?}", info.user_id, e);
        }
        if let Err(e) = Channel::update_used_quota(info.channel_id, quota) {
            error!(
                "failed to update channel {} used quota: {:?}",
                info.channel_id, e
            );
        }
    }

    let quota_delta = quota - info.final_pre_consumed_quota;
    if quota_delta > 0 {
        log_info!(
            "charging {} beyond pre-charge (real {}, pre-charged {})",
            quota_delta,
            quota,
            info.final_pre_consumed_quota
        );
    } else if quota_delta < 0 {
        log_info!(
            "returning {} of pre-charge (real {}, pre-charged {})",
            -quota_delta,
            quota,
            info.final_pre_consumed_quota
        );
    }
    if quota_delta != 0 {
        post_consume_quota(info, quota_delta, info.final_pre_consumed_quota, true);
    }

    let other = json!({
        "model_price": model_price,
        "use_price": info.price_data.use_price,
        "group_ratio": info.price_data.group_ratio,
        "cache_ratio": info.price_data.cache_ratio,
        "image_ratio": info.price_data.image_ratio,
        "audio_ratio": info.price_data.audio_ratio,
        "billing_source": info.billing_source,
        "cache_tokens": usage.cached_tokens,
        "reasoning_tokens": usage.reasoning_tokens,
        "audio_input_tokens": usage.prompt_audio_tokens,
        "audio_output_tokens": usage.completion_audio_tokens,
    });
    // Always the public model name; the remapped one never reaches the log.
    let record = RecordConsumeLogParams {
        user_id: info.user_id,
        channel_id: info.channel_id,
        token_id: info.token_id,
        model_name: info.origin_model_name.clone(),
        token_name: info.token_name.clone(),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        quota,
        content,
        use_time_seconds: info.elapsed_seconds(),
        is_stream: info.is_stream,
        group_name: info.using_group.clone(),
        other: Some(other.to_string()),
    };
    if let Err(e) = ConsumeLog::record(record) {
        error!("failed to write consume log: {:?}", e);
    }
}
