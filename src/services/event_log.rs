use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    error::Result,
    models::{GameEvent, NewEvent},
};

/// Append-only destination for gameplay events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, event: NewEvent) -> Result<GameEvent>;
}

/// Event Log - write-only sink wrapper used by the API layer
#[derive(Clone)]
pub struct EventLog {
    sink: Arc<dyn EventSink>,
}

impl EventLog {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Records an event and waits for the stored row.
    pub async fn record(&self, event: NewEvent) -> Result<GameEvent> {
        self.sink.append(event).await
    }

    /// Records an event in the background. Failures are logged and dropped.
    pub fn record_detached(&self, event: NewEvent) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let player_id = event.player_id;
            let event_type = event.event_type.clone();
            match sink.append(event).await {
                Ok(stored) => {
                    tracing::debug!(
                        event_id = stored.id,
                        player_id,
                        event_type = %event_type,
                        "event recorded"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        player_id,
                        event_type = %event_type,
                        "failed to record event: {}",
                        e
                    );
                }
            }
        })
    }
}
