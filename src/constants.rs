/// Application constants

pub const API_VERSION: &str = "v1";

// Player defaults
pub const DEFAULT_DISPLAY_NAME: &str = "Citizen";
pub const DEFAULT_LEVEL: i64 = 1;
pub const DEFAULT_EXPERIENCE: i64 = 0;
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

// Known resources, every one starts at zero
pub const RESOURCE_NAMES: [&str; 6] = ["oxygen", "energy", "water", "food", "metal", "credits"];
pub const DEFAULT_RESOURCE_AMOUNT: f64 = 0.0;

// Event types
pub const EVENT_TYPE_SYNC: &str = "sync";
pub const MAX_EVENT_TYPE_CHARS: usize = 64;

// Telegram
pub const HEADER_INIT_DATA: &str = "x-telegram-init-data";
pub const HEADER_WEBHOOK_SECRET: &str = "x-telegram-bot-api-secret-token";
pub const INIT_DATA_KEY: &[u8] = b"WebAppData";
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
