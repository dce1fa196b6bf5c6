use serde_json::{json, Value};
use std::time::Duration;

use crate::{
    constants::TELEGRAM_API_BASE,
    error::{AppError, Result},
};

/// `/start` message pulled out of a webhook update.
#[derive(Debug, Clone, PartialEq)]
pub struct StartCommand {
    pub chat_id: i64,
    pub first_name: Option<String>,
}

impl StartCommand {
    /// Returns the command if `update` is a text message starting with `/start`.
    pub fn from_update(update: &Value) -> Option<Self> {
        let message = update.get("message")?;
        let text = message.get("text")?.as_str()?.trim();
        let command = text.split_whitespace().next()?;
        // Group chats address the bot as `/start@BotName`.
        if command != "/start" && !command.starts_with("/start@") {
            return None;
        }
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let first_name = message
            .get("from")
            .and_then(|from| from.get("first_name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            chat_id,
            first_name,
        })
    }
}

/// Telegram Bot API client used to answer webhook updates
#[derive(Debug, Clone)]
pub struct TelegramBot {
    token: String,
    webapp_url: Option<String>,
    client: reqwest::Client,
}

impl TelegramBot {
    pub fn new(token: String, webapp_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Telegram HTTP client init failed: {}", e)))?;
        Ok(Self {
            token,
            webapp_url,
            client,
        })
    }

    pub async fn send_welcome(&self, command: &StartCommand) -> Result<()> {
        let payload = welcome_message(command, self.webapp_url.as_deref());
        self.call("sendMessage", &payload).await
    }

    async fn call(&self, method: &str, payload: &Value) -> Result<()> {
        let url = format!("{}/bot{}/{}", TELEGRAM_API_BASE, self.token, method);
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Telegram {method} failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Telegram {method} returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

fn welcome_message(command: &StartCommand, webapp_url: Option<&str>) -> Value {
    let greeting = match command.first_name.as_deref() {
        Some(name) => format!("Welcome to Metaville, {name}!"),
        None => "Welcome to Metaville!".to_string(),
    };

    let mut payload = json!({
        "chat_id": command.chat_id,
        "text": greeting,
    });
    if let Some(url) = webapp_url {
        payload["reply_markup"] = json!({
            "inline_keyboard": [[{ "text": "Play", "web_app": { "url": url } }]]
        });
    }
    payload
}
