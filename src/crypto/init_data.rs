//! Telegram Mini App init data.
//!
//! The client forwards the raw `initData` query string. Its `hash` field is
//! `HMAC_SHA256(key = HMAC_SHA256("WebAppData", bot_token), data_check_string)`
//! where `data_check_string` is every other field as `key=value`, sorted by
//! key and joined with `\n`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::{
    constants::INIT_DATA_KEY,
    error::{AppError, Result},
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitData {
    fields: BTreeMap<String, String>,
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InitDataUser {
    id: i64,
}

impl InitData {
    pub fn parse(raw: &str) -> Self {
        let mut data = InitData::default();
        for (key, value) in url::form_urlencoded::parse(raw.trim().as_bytes()) {
            if key == "hash" {
                data.hash = Some(value.into_owned());
            } else {
                data.fields.insert(key.into_owned(), value.into_owned());
            }
        }
        data
    }

    pub fn data_check_string(&self) -> String {
        self.fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Telegram user id embedded in the JSON `user` field.
    pub fn user_id(&self) -> Option<i64> {
        let user: InitDataUser = serde_json::from_str(self.fields.get("user")?).ok()?;
        Some(user.id).filter(|id| *id > 0)
    }

    pub fn auth_date(&self) -> Option<i64> {
        self.fields.get("auth_date")?.trim().parse().ok()
    }

    /// Checks the `hash` field against `bot_token` and, when `max_age_secs`
    /// is set, rejects data whose `auth_date` is older than that.
    pub fn verify(&self, bot_token: &str, max_age_secs: Option<i64>, now: i64) -> Result<()> {
        let hash = self.hash.as_deref().ok_or(AppError::SignatureInvalid)?;
        let expected = hex::decode(hash.trim()).map_err(|_| AppError::SignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(&secret_key(bot_token)?)
            .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
        mac.update(self.data_check_string().as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| AppError::SignatureInvalid)?;

        if let Some(max_age) = max_age_secs {
            let auth_date = self.auth_date().ok_or(AppError::SignatureInvalid)?;
            if now.saturating_sub(auth_date) > max_age {
                tracing::debug!(auth_date, max_age, "init data expired");
                return Err(AppError::SignatureInvalid);
            }
        }
        Ok(())
    }
}

fn secret_key(bot_token: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(INIT_DATA_KEY)
        .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(bot_token.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Hex signature for a data check string, as Telegram computes it.
pub fn sign(data_check_string: &str, bot_token: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(&secret_key(bot_token)?)
        .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(data_check_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}


#[cfg(test)]
mod tests {
    use super::testing::signed_init_data;
    use super::*;

    const TOKEN: &str = "123456:TEST-TOKEN";
    const USER: &str = r#"{"id":777,"first_name":"Ada"}"#;

    #[test]
    fn data_check_string_sorts_fields_and_skips_hash() {
        let data = InitData::parse("user=%7B%7D&auth_date=100&query_id=q1&hash=abcd");
        assert_eq!(data.data_check_string(), "auth_date=100\nquery_id=q1\nuser={}");
    }

    #[test]
    fn user_id_is_read_from_user_json() {
        let raw = signed_init_data(&[("auth_date", "100"), ("user", USER)], TOKEN);
        let data = InitData::parse(&raw);
        assert_eq!(data.user_id(), Some(777));
        assert_eq!(data.auth_date(), Some(100));
    }

    #[test]
    fn valid_signature_verifies() {
        let raw = signed_init_data(&[("auth_date", "100"), ("user", USER)], TOKEN);
        assert!(InitData::parse(&raw).verify(TOKEN, None, 100).is_ok());
    }

    #[test]
    fn wrong_token_is_rejected() {
        let raw = signed_init_data(&[("auth_date", "100"), ("user", USER)], TOKEN);
        let result = InitData::parse(&raw).verify("other-token", None, 100);
        assert!(matches!(result, Err(AppError::SignatureInvalid)));
    }

    #[test]
    fn tampered_user_is_rejected() {
        let raw = signed_init_data(&[("auth_date", "100"), ("user", USER)], TOKEN);
        let tampered = raw.replace("%3A777", "%3A778");
        assert_ne!(tampered, raw);
        let result = InitData::parse(&tampered).verify(TOKEN, None, 100);
        assert!(matches!(result, Err(AppError::SignatureInvalid)));
    }

    #[test]
    fn missing_or_malformed_hash_is_rejected() {
        let data = InitData::parse("auth_date=100&user=%7B%22id%22%3A1%7D");
        assert!(matches!(data.verify(TOKEN, None, 100), Err(AppError::SignatureInvalid)));

        let data = InitData::parse("auth_date=100&hash=not-hex");
        assert!(matches!(data.verify(TOKEN, None, 100), Err(AppError::SignatureInvalid)));
    }

    #[test]
    fn stale_auth_date_is_rejected_when_max_age_set() {
        let raw = signed_init_data(&[("auth_date", "1000"), ("user", USER)], TOKEN);
        let data = InitData::parse(&raw);
        assert!(data.verify(TOKEN, Some(60), 1050).is_ok());
        assert!(matches!(
            data.verify(TOKEN, Some(60), 2000),
            Err(AppError::SignatureInvalid)
        ));
    }
}
