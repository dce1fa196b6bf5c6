pub mod event_log;
pub mod reconciler;
pub mod telegram_bot;

// Re-export for convenience
pub use event_log::{EventLog, EventSink};
pub use telegram_bot::TelegramBot;
