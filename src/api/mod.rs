// src/api/mod.rs

pub mod events;
pub mod health;
pub mod identity;
pub mod player;
pub mod telegram;

use axum::body::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::services::{EventLog, TelegramBot};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub events: EventLog,
    pub bot: Option<TelegramBot>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Result<Self> {
        let bot = config
            .telegram_bot_token
            .clone()
            .map(|token| TelegramBot::new(token, config.webapp_url.clone()))
            .transpose()?;

        Ok(Self {
            events: EventLog::new(Arc::new(db.clone())),
            db,
            config,
            bot,
        })
    }
}

/// Parses a request body that must be a JSON object. An empty body is
/// treated as `{}`.
pub fn parse_object_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| AppError::Validation("body must be valid JSON".to_string()))?;
    if !value.is_object() {
        return Err(AppError::Validation("body must be a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| AppError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncRequest;

    #[test]
    fn empty_body_is_an_empty_request() {
        let req: SyncRequest = parse_object_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(req.telegram_id.is_none());
        assert!(req.resources.is_none());
    }

    #[test]
    fn non_object_body_is_rejected() {
        let result: Result<SyncRequest> = parse_object_body(&Bytes::from_static(b"[1,2]"));
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result: Result<SyncRequest> = parse_object_body(&Bytes::from_static(b"{oops"));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
