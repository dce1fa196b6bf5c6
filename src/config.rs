use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// How an incoming `resources` snapshot combines with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourcesPolicy {
    /// The normalized incoming snapshot replaces the stored one.
    Replace,
    /// Only submitted known keys overwrite; the rest keep their stored amount.
    Merge,
}

impl FromStr for ResourcesPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            other => anyhow::bail!("RESOURCES_POLICY must be 'replace' or 'merge', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_acquire_timeout_secs: u64,

    // Telegram
    pub telegram_bot_token: Option<String>,
    pub telegram_webhook_secret: Option<String>,
    pub init_data_max_age_secs: Option<i64>,
    pub webapp_url: Option<String>,

    // Game behaviour
    pub player_auto_create: bool,
    pub resources_policy: ResourcesPolicy,
    pub record_sync_events: bool,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            database_acquire_timeout_secs: env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            telegram_bot_token: optional_var("TELEGRAM_BOT_TOKEN"),
            telegram_webhook_secret: optional_var("TELEGRAM_WEBHOOK_SECRET"),
            init_data_max_age_secs: optional_var("INIT_DATA_MAX_AGE_SECS")
                .map(|s| s.parse())
                .transpose()?,
            webapp_url: optional_var("WEBAPP_URL"),

            player_auto_create: env_flag("PLAYER_AUTO_CREATE", true),
            resources_policy: env::var("RESOURCES_POLICY")
                .unwrap_or_else(|_| "replace".to_string())
                .parse()?,
            record_sync_events: env_flag("RECORD_SYNC_EVENTS", true),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be > 0");
        }
        if matches!(self.init_data_max_age_secs, Some(age) if age <= 0) {
            anyhow::bail!("INIT_DATA_MAX_AGE_SECS must be > 0");
        }

        if self.telegram_bot_token.is_none() {
            if self.is_production() {
                tracing::warn!(
                    "TELEGRAM_BOT_TOKEN is not set in production; init data is accepted unverified"
                );
            } else {
                tracing::info!("TELEGRAM_BOT_TOKEN not set; init data accepted unverified");
            }
        }
        if self.telegram_webhook_secret.is_none() {
            tracing::warn!("TELEGRAM_WEBHOOK_SECRET not set; webhook calls are not authenticated");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; falling back to permissive CORS");
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

// Unset and blank variables are both treated as absent.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(name: &str, default: bool) -> bool {
    optional_var(name)
        .map(|value| parse_flag(&value))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

#[cfg(test)]
impl Config {
    pub fn for_tests(database_url: &str) -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: "development".to_string(),
            database_url: database_url.to_string(),
            database_max_connections: 4,
            database_acquire_timeout_secs: 1,
            telegram_bot_token: None,
            telegram_webhook_secret: None,
            init_data_max_age_secs: None,
            webapp_url: None,
            player_auto_create: true,
            resources_policy: ResourcesPolicy::Replace,
            record_sync_events: false,
            cors_allowed_origins: "*".to_string(),
        }
    }
}
