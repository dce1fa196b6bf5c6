use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use std::time::Duration;

use crate::{
    config::{Config, ResourcesPolicy},
    error::{AppError, Result},
    models::*,
    services::{event_log::EventSink, reconciler::reconcile},
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Row written by a sync, and whether the sync created it.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub player: Player,
    pub created: bool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(config.database_acquire_timeout_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Pool that opens connections on first use.
    pub fn connect_lazy(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(config.database_acquire_timeout_secs))
            .connect_lazy(&config.database_url)?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ==================== PLAYER QUERIES ====================
impl Database {
    /// Reconciles `incoming` against the stored profile inside one transaction.
    ///
    /// The row is created if absent, then locked with `FOR UPDATE` so that
    /// concurrent syncs for the same identity apply one after the other.
    /// `link` attaches the other identity kind when that slot is still empty.
    pub async fn sync_player(
        &self,
        identity: &Identity,
        link: Option<&Identity>,
        incoming: &PartialProfile,
        policy: ResourcesPolicy,
    ) -> Result<SyncOutcome> {
        let mut tx = self.pool.begin().await?;

        let created = insert_if_absent(&mut *tx, identity).await?;
        let current = lock_player(&mut *tx, identity).await?;

        let previous = if created { None } else { Some(current.state()) };
        let next = reconcile(previous.as_ref(), incoming, policy);

        let link = link.filter(|other| !other.is_same_kind(identity));
        if let Some(other) = link {
            warn_if_already_linked(&current, other);
        }

        let player = write_state(&mut *tx, current.id, &next, link)
            .await
            .map_err(|e| match e.sqlstate().as_deref() {
                Some(UNIQUE_VIOLATION) => AppError::Conflict(
                    "identity is already linked to another profile".to_string(),
                ),
                _ => e,
            })?;

        tx.commit().await?;
        Ok(SyncOutcome { player, created })
    }

    /// Loads a profile and refreshes its `last_seen_at`, creating a default
    /// row first when `auto_create` is set.
    pub async fn touch_player(&self, identity: &Identity, auto_create: bool) -> Result<Option<Player>> {
        let mut tx = self.pool.begin().await?;

        if auto_create && insert_if_absent(&mut *tx, identity).await? {
            tracing::info!(%identity, "created default player on read");
        }

        let (telegram_id, wallet_address) = keys(identity);
        let player = sqlx::query_as::<_, Player>(
            "UPDATE players SET last_seen_at = NOW()
             WHERE telegram_id = $1 OR wallet_address = $2
             RETURNING *",
        )
        .bind(telegram_id)
        .bind(wallet_address)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(player)
    }
}

// Exactly one side is set.
fn keys(identity: &Identity) -> (Option<i64>, Option<&str>) {
    match identity {
        Identity::Telegram(id) => (Some(*id), None),
        Identity::Wallet(address) => (None, Some(address.as_str())),
    }
}

// Returns true when this call created the row.
async fn insert_if_absent(conn: &mut PgConnection, identity: &Identity) -> Result<bool> {
    let (telegram_id, wallet_address) = keys(identity);
    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO players (telegram_id, wallet_address)
         VALUES ($1, $2)
         ON CONFLICT DO NOTHING
         RETURNING id",
    )
    .bind(telegram_id)
    .bind(wallet_address)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(inserted.is_some())
}

async fn lock_player(conn: &mut PgConnection, identity: &Identity) -> Result<Player> {
    let (telegram_id, wallet_address) = keys(identity);
    let player = sqlx::query_as::<_, Player>(
        "SELECT * FROM players
         WHERE telegram_id = $1 OR wallet_address = $2
         FOR UPDATE",
    )
    .bind(telegram_id)
    .bind(wallet_address)
    .fetch_one(&mut *conn)
    .await?;
    Ok(player)
}

async fn write_state(
    conn: &mut PgConnection,
    player_id: i64,
    next: &PlayerState,
    link: Option<&Identity>,
) -> Result<Player> {
    let (link_telegram, link_wallet) = link.map(keys).unwrap_or((None, None));
    let resources = serde_json::to_value(&next.resources)
        .map_err(|e| AppError::Internal(format!("Failed to encode resources: {}", e)))?;

    let player = sqlx::query_as::<_, Player>(
        r#"
        UPDATE players
        SET display_name   = $2,
            level          = $3,
            experience     = $4,
            resources      = $5,
            progress       = $6,
            stats          = $7,
            telegram_id    = COALESCE(telegram_id, $8),
            wallet_address = COALESCE(wallet_address, $9),
            last_seen_at   = NOW(),
            updated_at     = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(player_id)
    .bind(&next.display_name)
    .bind(next.level)
    .bind(next.experience)
    .bind(resources)
    .bind(serde_json::Value::Object(next.progress.clone()))
    .bind(serde_json::Value::Object(next.stats.clone()))
    .bind(link_telegram)
    .bind(link_wallet)
    .fetch_one(&mut *conn)
    .await?;
    Ok(player)
}

fn warn_if_already_linked(current: &Player, other: &Identity) {
    let mismatch = match other {
        Identity::Telegram(id) => current.telegram_id.is_some_and(|existing| existing != *id),
        Identity::Wallet(address) => current
            .wallet_address
            .as_deref()
            .is_some_and(|existing| existing != address.as_str()),
    };
    if mismatch {
        tracing::warn!(
            player_id = current.id,
            requested = %other,
            "profile already linked to a different identity; keeping existing link"
        );
    }
}

// ==================== EVENT QUERIES ====================
#[async_trait]
impl EventSink for Database {
    async fn append(&self, event: NewEvent) -> Result<GameEvent> {
        let stored = sqlx::query_as::<_, GameEvent>(
            "INSERT INTO player_events (player_id, event_type, payload)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(event.player_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)
        .map_err(|e| match e.sqlstate().as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => {
                AppError::NotFound(format!("Profile {} not found", event.player_id))
            }
            _ => e,
        })?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    // Storage tests run only when a scratch Postgres is provided.
    async fn test_db() -> Option<Database> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let db = Database::new(&Config::for_tests(&url)).await.ok()?;
        db.run_migrations().await.ok()?;
        Some(db)
    }

    fn fresh_telegram() -> Identity {
        Identity::Telegram(1_000_000_000 + i64::from(rand::random::<u32>()))
    }

    fn fresh_wallet() -> Identity {
        Identity::Wallet(format!("EQtest{:016x}", rand::random::<u64>()))
    }

    // Plain lookup that leaves last_seen_at alone.
    impl Database {
        async fn get_player(&self, identity: &Identity) -> Result<Option<Player>> {
            let (telegram_id, wallet_address) = keys(identity);
            let player = sqlx::query_as::<_, Player>(
                "SELECT * FROM players WHERE telegram_id = $1 OR wallet_address = $2",
            )
            .bind(telegram_id)
            .bind(wallet_address)
            .fetch_optional(&self.pool)
            .await?;
            Ok(player)
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn database_new_returns_error_on_invalid_url() {
        let config = Config::for_tests("not-a-url");
        let result = Database::new(&config).await;
        assert!(result.is_err());
    }

    #[test]
    fn keys_set_exactly_one_side() {
        assert_eq!(keys(&Identity::Telegram(5)), (Some(5), None));
        assert_eq!(
            keys(&Identity::Wallet("abc".to_string())),
            (None, Some("abc"))
        );
    }

    #[tokio::test]
    async fn first_sync_creates_default_profile() {
        let Some(db) = test_db().await else { return };
        let identity = fresh_telegram();

        let outcome = db
            .sync_player(&identity, None, &PartialProfile::default(), ResourcesPolicy::Replace)
            .await
            .unwrap();
        assert!(outcome.created);
        let player = outcome.player;
        assert_eq!(player.level, 1);
        assert_eq!(player.experience, 0);
        assert_eq!(player.display_name, "Citizen");
        assert_eq!(
            player.state().resources,
            crate::services::reconciler::default_resources()
        );

        let again = db
            .sync_player(&identity, None, &PartialProfile::default(), ResourcesPolicy::Replace)
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.player.id, player.id);
        assert_eq!(again.player.created_at, player.created_at);
    }

    #[tokio::test]
    async fn stats_accumulate_and_resources_replace() {
        let Some(db) = test_db().await else { return };
        let identity = fresh_wallet();

        let first = PartialProfile {
            resources: Some(object(json!({"oxygen": 10, "energy": 20}))),
            stats: Some(object(json!({"a": 1}))),
            ..Default::default()
        };
        db.sync_player(&identity, None, &first, ResourcesPolicy::Replace)
            .await
            .unwrap();

        let second = PartialProfile {
            resources: Some(object(json!({"oxygen": 5}))),
            stats: Some(object(json!({"b": 2}))),
            ..Default::default()
        };
        let player = db
            .sync_player(&identity, None, &second, ResourcesPolicy::Replace)
            .await
            .unwrap()
            .player;

        let state = player.state();
        assert_eq!(Value::Object(state.stats), json!({"a": 1, "b": 2}));
        assert_eq!(state.resources["oxygen"], 5.0);
        assert_eq!(state.resources["energy"], 0.0);
    }

    #[tokio::test]
    async fn level_and_experience_are_monotonic() {
        let Some(db) = test_db().await else { return };
        let identity = fresh_telegram();

        for (level, experience) in [(3, 300), (2, 100), (5, 250), (1, 0)] {
            let incoming = PartialProfile {
                level: Some(level),
                experience: Some(experience),
                ..Default::default()
            };
            db.sync_player(&identity, None, &incoming, ResourcesPolicy::Replace)
                .await
                .unwrap();
        }

        let player = db.get_player(&identity).await.unwrap().unwrap();
        assert_eq!(player.level, 5);
        assert_eq!(player.experience, 300);
    }

    #[tokio::test]
    async fn resubmitted_payload_leaves_state_unchanged() {
        let Some(db) = test_db().await else { return };
        let identity = fresh_telegram();
        let payload = PartialProfile {
            display_name: Some("Neo".to_string()),
            level: Some(2),
            experience: Some(40),
            resources: Some(object(json!({"food": 3}))),
            progress: Some(object(json!({"zone": 1}))),
            stats: Some(object(json!({"taps": 9}))),
        };

        let once = db
            .sync_player(&identity, None, &payload, ResourcesPolicy::Replace)
            .await
            .unwrap()
            .player;
        let twice = db
            .sync_player(&identity, None, &payload, ResourcesPolicy::Replace)
            .await
            .unwrap()
            .player;
        assert_eq!(once.state(), twice.state());
    }

    #[tokio::test]
    async fn concurrent_syncs_keep_the_highest_experience() {
        let Some(db) = test_db().await else { return };
        let identity = fresh_telegram();
        let base = PartialProfile {
            experience: Some(100),
            ..Default::default()
        };
        db.sync_player(&identity, None, &base, ResourcesPolicy::Replace)
            .await
            .unwrap();

        let high = PartialProfile {
            experience: Some(150),
            ..Default::default()
        };
        let low = PartialProfile {
            experience: Some(120),
            ..Default::default()
        };
        let (a, b) = tokio::join!(
            db.sync_player(&identity, None, &high, ResourcesPolicy::Replace),
            db.sync_player(&identity, None, &low, ResourcesPolicy::Replace),
        );
        a.unwrap();
        b.unwrap();

        let player = db.get_player(&identity).await.unwrap().unwrap();
        assert_eq!(player.experience, 150);
    }

    #[tokio::test]
    async fn concurrent_first_reads_create_one_row() {
        let Some(db) = test_db().await else { return };
        let identity = fresh_wallet();

        let (a, b) = tokio::join!(
            db.touch_player(&identity, true),
            db.touch_player(&identity, true),
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn touch_without_auto_create_returns_none() {
        let Some(db) = test_db().await else { return };
        let identity = fresh_telegram();
        assert!(db.touch_player(&identity, false).await.unwrap().is_none());
        assert!(db.get_player(&identity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn linked_identities_resolve_to_the_same_profile() {
        let Some(db) = test_db().await else { return };
        let telegram_id = 1_000_000_000 + i64::from(rand::random::<u32>());
        let telegram = Identity::Telegram(telegram_id);
        let wallet = fresh_wallet();

        let player = db
            .sync_player(&telegram, Some(&wallet), &PartialProfile::default(), ResourcesPolicy::Replace)
            .await
            .unwrap()
            .player;

        let by_wallet = db.get_player(&wallet).await.unwrap().unwrap();
        assert_eq!(by_wallet.id, player.id);
        assert_eq!(by_wallet.telegram_id, Some(telegram_id));
    }

    #[tokio::test]
    async fn linking_a_wallet_owned_by_another_profile_conflicts() {
        let Some(db) = test_db().await else { return };
        let wallet = fresh_wallet();
        db.sync_player(&wallet, None, &PartialProfile::default(), ResourcesPolicy::Replace)
            .await
            .unwrap();

        let result = db
            .sync_player(&fresh_telegram(), Some(&wallet), &PartialProfile::default(), ResourcesPolicy::Replace)
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn events_for_unknown_profiles_are_not_found() {
        let Some(db) = test_db().await else { return };
        let result = db
            .append(NewEvent {
                player_id: i64::MAX,
                event_type: "tap".to_string(),
                payload: json!({}),
            })
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
