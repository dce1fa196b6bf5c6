use axum::http::HeaderMap;
use chrono::Utc;

use crate::{
    config::Config,
    constants::HEADER_INIT_DATA,
    crypto::init_data::InitData,
    error::{AppError, Result},
    models::{Identity, SyncRequest},
};

/// Identity keys carried in the query string.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IdentityQuery {
    pub telegram_id: Option<String>,
    pub wallet_address: Option<String>,
}

impl IdentityQuery {
    pub fn from_raw(raw: Option<&str>) -> Self {
        let mut query = IdentityQuery::default();
        let Some(raw) = raw else { return query };
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "telegramId" | "telegram_id" | "userId" | "user_id" => {
                    query.telegram_id = Some(value.into_owned())
                }
                "walletAddress" | "wallet_address" | "wallet" => {
                    query.wallet_address = Some(value.into_owned())
                }
                _ => {}
            }
        }
        query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Body,
    Query,
    InitData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    /// Other identity kind submitted alongside, to be linked to the profile.
    pub link: Option<Identity>,
    pub source: IdentitySource,
}

/// Resolves the identity of a request: body first, then query string, then
/// the `X-Telegram-Init-Data` header.
///
/// The header is verified against the bot token when one is configured;
/// without a token it is accepted as-is.
pub fn resolve_identity(
    body: &SyncRequest,
    query: &IdentityQuery,
    headers: &HeaderMap,
    config: &Config,
) -> Result<ResolvedIdentity> {
    let body_telegram = body.telegram_id.as_ref().and_then(Identity::telegram_from_json);
    let body_wallet = body.wallet_address.as_ref().and_then(Identity::wallet_from_json);
    if let Some(resolved) = first_with_link(body_telegram, body_wallet, IdentitySource::Body) {
        return Ok(resolved);
    }

    let query_telegram = query
        .telegram_id
        .as_deref()
        .and_then(Identity::telegram_from_str);
    let query_wallet = query
        .wallet_address
        .as_deref()
        .and_then(Identity::wallet_from_str);
    if let Some(resolved) = first_with_link(query_telegram, query_wallet, IdentitySource::Query) {
        return Ok(resolved);
    }

    let Some(raw) = headers.get(HEADER_INIT_DATA) else {
        return Err(AppError::IdentityRequired);
    };
    let raw = raw
        .to_str()
        .map_err(|_| AppError::Validation("init data header is not valid text".to_string()))?;
    let init_data = InitData::parse(raw);

    match config.telegram_bot_token.as_deref() {
        Some(token) => {
            init_data.verify(token, config.init_data_max_age_secs, Utc::now().timestamp())?
        }
        None => tracing::debug!("accepting unverified init data; no bot token configured"),
    }

    let identity = init_data
        .user_id()
        .map(Identity::Telegram)
        .ok_or(AppError::IdentityRequired)?;
    Ok(ResolvedIdentity {
        identity,
        link: None,
        source: IdentitySource::InitData,
    })
}

fn first_with_link(
    telegram: Option<Identity>,
    wallet: Option<Identity>,
    source: IdentitySource,
) -> Option<ResolvedIdentity> {
    match (telegram, wallet) {
        (Some(identity), link) => Some(ResolvedIdentity {
            identity,
            link,
            source,
        }),
        (None, Some(identity)) => Some(ResolvedIdentity {
            identity,
            link: None,
            source,
        }),
        (None, None) => None,
    }
}
