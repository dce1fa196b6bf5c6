use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    constants::HEADER_WEBHOOK_SECRET,
    error::{AppError, Result},
    services::telegram_bot::StartCommand,
};

use super::AppState;

/// POST /telegram/webhook
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    check_webhook_secret(&headers, state.config.telegram_webhook_secret.as_deref())?;

    let update: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::Validation("update must be valid JSON".to_string()))?;

    if let Some(command) = StartCommand::from_update(&update) {
        match state.bot.clone() {
            Some(bot) => {
                tokio::spawn(async move {
                    if let Err(e) = bot.send_welcome(&command).await {
                        tracing::warn!(chat_id = command.chat_id, "failed to answer /start: {}", e);
                    }
                });
            }
            None => tracing::debug!("bot token not configured; /start left unanswered"),
        }
    }

    // Telegram retries anything that is not a 2xx, so accepted updates always succeed.
    Ok(Json(json!({ "ok": true })))
}

fn check_webhook_secret(headers: &HeaderMap, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(HEADER_WEBHOOK_SECRET)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
        return Err(AppError::Unauthorized("webhook secret mismatch".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn secret_is_optional_when_not_configured() {
        assert!(check_webhook_secret(&HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn secret_must_match_when_configured() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            check_webhook_secret(&headers, Some("s3cret")),
            Err(AppError::Unauthorized(_))
        ));

        headers.insert(HEADER_WEBHOOK_SECRET, HeaderValue::from_static("wrong"));
        assert!(check_webhook_secret(&headers, Some("s3cret")).is_err());

        headers.insert(HEADER_WEBHOOK_SECRET, HeaderValue::from_static("s3cret"));
        assert!(check_webhook_secret(&headers, Some("s3cret")).is_ok());
    }
}
