use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::{
    constants::MAX_EVENT_TYPE_CHARS,
    error::{AppError, Result},
};

// ==================== EVENT ====================
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub player_id: i64,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GameEvent {
    pub id: i64,
    pub player_id: i64,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[serde(alias = "profile_id", alias = "playerId")]
    pub profile_id: Option<Value>,
    #[serde(rename = "type", alias = "eventType")]
    pub event_type: Option<Value>,
    pub payload: Option<Value>,
}

impl CreateEventRequest {
    pub fn into_new_event(self) -> Result<NewEvent> {
        let player_id = match &self.profile_id {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Validation("profileId is required".to_string()))?;

        let event_type = self
            .event_type
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("type is required".to_string()))?;
        if event_type.chars().count() > MAX_EVENT_TYPE_CHARS {
            return Err(AppError::Validation(format!(
                "type exceeds {MAX_EVENT_TYPE_CHARS} characters"
            )));
        }

        Ok(NewEvent {
            player_id,
            event_type: event_type.to_string(),
            payload: self.payload.unwrap_or_else(|| Value::Object(Default::default())),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventResponse {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> CreateEventRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn builds_event_with_default_payload() {
        let event = request(json!({"profileId": 5, "type": "tap"}))
            .into_new_event()
            .unwrap();
        assert_eq!(event.player_id, 5);
        assert_eq!(event.event_type, "tap");
        assert_eq!(event.payload, json!({}));
    }

    #[test]
    fn accepts_string_profile_id() {
        let event = request(json!({"profileId": "12", "type": "quest", "payload": {"id": 3}}))
            .into_new_event()
            .unwrap();
        assert_eq!(event.player_id, 12);
        assert_eq!(event.payload, json!({"id": 3}));
    }

    #[test]
    fn missing_profile_id_or_type_is_rejected() {
        assert!(matches!(
            request(json!({"type": "tap"})).into_new_event(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            request(json!({"profileId": 1, "type": "  "})).into_new_event(),
            Err(AppError::Validation(_))
        ));
    }
}
