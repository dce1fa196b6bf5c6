use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::{
    constants::MAX_DISPLAY_NAME_CHARS,
    error::{AppError, Result},
    services::reconciler::normalize_resources,
};

/// Resource name to amount, always holding every known resource.
pub type Resources = BTreeMap<String, f64>;

// ==================== IDENTITY ====================
/// External key a profile is looked up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Telegram(i64),
    Wallet(String),
}

const MAX_WALLET_CHARS: usize = 128;

impl Identity {
    /// Parses a path segment or query value: all digits is a Telegram id,
    /// anything else non-empty is a wallet address.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            return Self::telegram_from_str(value);
        }
        Self::wallet_from_str(value)
    }

    pub fn telegram_from_str(raw: &str) -> Option<Self> {
        raw.trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(Identity::Telegram)
    }

    pub fn wallet_from_str(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty()
            || value.chars().count() > MAX_WALLET_CHARS
            || value.chars().any(char::is_whitespace)
        {
            return None;
        }
        Some(Identity::Wallet(value.to_string()))
    }

    /// Telegram id submitted as a JSON number or numeric string.
    pub fn telegram_from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().filter(|id| *id > 0).map(Identity::Telegram),
            Value::String(s) => Self::telegram_from_str(s),
            _ => None,
        }
    }

    pub fn wallet_from_json(value: &Value) -> Option<Self> {
        value.as_str().and_then(Self::wallet_from_str)
    }

    pub fn is_same_kind(&self, other: &Identity) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Telegram(id) => write!(f, "telegram:{id}"),
            Identity::Wallet(address) => write!(f, "wallet:{address}"),
        }
    }
}

// ==================== PLAYER ROW ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Player {
    pub id: i64,
    pub telegram_id: Option<i64>,
    pub wallet_address: Option<String>,
    pub display_name: String,
    pub level: i64,
    pub experience: i64,
    pub resources: Value,
    pub progress: Value,
    pub stats: Value,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Player {
    /// Mutable game state of this row, resources normalized to the known set.
    pub fn state(&self) -> PlayerState {
        PlayerState {
            display_name: self.display_name.clone(),
            level: self.level,
            experience: self.experience,
            resources: normalize_resources(&object_or_empty(&self.resources)),
            progress: object_or_empty(&self.progress),
            stats: object_or_empty(&self.stats),
        }
    }
}

fn object_or_empty(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// The fields a sync reconciles; identity and timestamps live on the row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub display_name: String,
    pub level: i64,
    pub experience: i64,
    pub resources: Resources,
    pub progress: Map<String, Value>,
    pub stats: Map<String, Value>,
}

// ==================== API TYPES ====================
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    pub id: i64,
    pub telegram_id: Option<i64>,
    pub wallet_address: Option<String>,
    pub display_name: String,
    pub level: i64,
    pub experience: i64,
    pub resources: Resources,
    pub progress: Map<String, Value>,
    pub stats: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Player> for PlayerDto {
    fn from(player: Player) -> Self {
        let state = player.state();
        Self {
            id: player.id,
            telegram_id: player.telegram_id,
            wallet_address: player.wallet_address,
            display_name: state.display_name,
            level: state.level,
            experience: state.experience,
            resources: state.resources,
            progress: state.progress,
            stats: state.stats,
            created_at: player.created_at,
            last_seen_at: player.last_seen_at,
            updated_at: player.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlayerResponse {
    pub player: PlayerDto,
}

/// Raw sync body. Every field stays loosely typed until [`PartialProfile::from_request`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(alias = "telegram_id", alias = "userId", alias = "user_id")]
    pub telegram_id: Option<Value>,
    #[serde(alias = "wallet_address", alias = "wallet")]
    pub wallet_address: Option<Value>,
    #[serde(alias = "display_name")]
    pub display_name: Option<Value>,
    pub level: Option<Value>,
    #[serde(alias = "xp")]
    pub experience: Option<Value>,
    pub resources: Option<Value>,
    pub progress: Option<Value>,
    pub stats: Option<Value>,
}

/// Validated sync payload; `None` means the client did not submit the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialProfile {
    pub display_name: Option<String>,
    pub level: Option<i64>,
    pub experience: Option<i64>,
    pub resources: Option<Map<String, Value>>,
    pub progress: Option<Map<String, Value>>,
    pub stats: Option<Map<String, Value>>,
}

impl PartialProfile {
    pub fn from_request(req: &SyncRequest) -> Result<Self> {
        Ok(Self {
            display_name: req
                .display_name
                .as_ref()
                .map(parse_display_name)
                .transpose()?
                .flatten(),
            level: req
                .level
                .as_ref()
                .map(|v| parse_integer("level", v))
                .transpose()?,
            experience: req
                .experience
                .as_ref()
                .map(|v| parse_integer("experience", v))
                .transpose()?,
            resources: req
                .resources
                .as_ref()
                .map(|v| parse_object("resources", v))
                .transpose()?,
            progress: req
                .progress
                .as_ref()
                .map(|v| parse_object("progress", v))
                .transpose()?,
            stats: req
                .stats
                .as_ref()
                .map(|v| parse_object("stats", v))
                .transpose()?,
        })
    }
}

// Blank names count as "not submitted".
fn parse_display_name(value: &Value) -> Result<Option<String>> {
    let raw = value
        .as_str()
        .ok_or_else(|| AppError::Validation("displayName must be a string".to_string()))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.chars().take(MAX_DISPLAY_NAME_CHARS).collect()))
}

fn parse_integer(field: &str, value: &Value) -> Result<i64> {
    let Value::Number(n) = value else {
        return Err(AppError::Validation(format!("{field} must be a number")));
    };
    n.as_i64()
        .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
        .ok_or_else(|| AppError::Validation(format!("{field} is out of range")))
}

fn parse_object(field: &str, value: &Value) -> Result<Map<String, Value>> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| AppError::Validation(format!("{field} must be an object")))
}
