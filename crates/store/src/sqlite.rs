//! Durable store on SQLite.
//!
//! ## Tables
//!
//! - `usage` - one row per identity: `(identity TEXT PRIMARY KEY, count INTEGER)`
//! - `subscriptions` - one row per identity; period end in epoch milliseconds
//!
//! The connection sits behind a mutex and every call runs on the blocking
//! pool, so async callers never stall a runtime worker on disk I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipeline::{
    CustomerId, Identity, PriceId, StoreError, SubscriptionId, SubscriptionRecord,
    SubscriptionStore, Timestamp, UsageStore,
};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage (
    identity TEXT PRIMARY KEY NOT NULL,
    count    INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0)
);

CREATE TABLE IF NOT EXISTS subscriptions (
    identity           TEXT PRIMARY KEY NOT NULL,
    current_period_end INTEGER,
    price_id           TEXT,
    customer_id        TEXT,
    subscription_id    TEXT
);
"#;

// Single statement: SQLite serialises writers, so concurrent increments can
// never lose an update.
const INCREMENT: &str = "INSERT INTO usage (identity, count) VALUES (?1, MIN(1, ?2)) \
     ON CONFLICT(identity) DO UPDATE SET count = MIN(count + 1, ?2) \
     RETURNING count";

const UPSERT_SUBSCRIPTION: &str = "INSERT INTO subscriptions \
     (identity, current_period_end, price_id, customer_id, subscription_id) \
     VALUES (?1, ?2, ?3, ?4, ?5) \
     ON CONFLICT(identity) DO UPDATE SET \
        current_period_end = excluded.current_period_end, \
        price_id = excluded.price_id, \
        customer_id = excluded.customer_id, \
        subscription_id = excluded.subscription_id";

/// SQLite-backed usage and subscription store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!(path = %path.display(), "opening SQLite store");
        let conn = Connection::open(path).map_err(backend("failed to open SQLite"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(backend("failed to set PRAGMA"))?;
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("opening in-memory SQLite store");
        let conn = Connection::open_in_memory().map_err(backend("failed to open SQLite"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(backend("failed to create schema"))?;
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(backend("failed to read schema version"))?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .map_err(backend("failed to set schema version"))?;
            info!(from = version, to = SCHEMA_VERSION, "schema initialised");
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts or replaces the subscription for `record.identity`.
    pub async fn upsert_subscription(&self, record: SubscriptionRecord) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                UPSERT_SUBSCRIPTION,
                params![
                    record.identity.as_str(),
                    record.current_period_end.map(Timestamp::epoch_millis),
                    record.price_id.as_ref().map(PriceId::as_str),
                    record.customer_id.as_ref().map(CustomerId::as_str),
                    record.subscription_id.as_ref().map(SubscriptionId::as_str),
                ],
            )
            .map_err(backend("subscription upsert failed"))?;
            debug!(identity = %record.identity, "subscription upserted");
            Ok(())
        })
        .await
    }

    /// Runs `f` with exclusive access to the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn backend(context: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn count(&self, identity: &Identity) -> Result<u32, StoreError> {
        let identity = identity.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT count FROM usage WHERE identity = ?1",
                params![identity.as_str()],
                |row| row.get::<_, u32>(0),
            )
            .optional()
            .map(|count| count.unwrap_or(0))
            .map_err(backend("usage query failed"))
        })
        .await
    }

    async fn increment(&self, identity: &Identity, ceiling: u32) -> Result<u32, StoreError> {
        let identity = identity.clone();
        self.with_conn(move |conn| {
            conn.query_row(INCREMENT, params![identity.as_str(), ceiling], |row| {
                row.get::<_, u32>(0)
            })
            .map_err(backend("usage increment failed"))
        })
        .await
    }
}

type SubscriptionRow = (
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
);

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn find(&self, identity: &Identity) -> Result<Option<SubscriptionRecord>, StoreError> {
        let identity = identity.clone();
        self.with_conn(move |conn| {
            let row: Option<SubscriptionRow> = conn
                .query_row(
                    "SELECT current_period_end, price_id, customer_id, subscription_id \
                     FROM subscriptions WHERE identity = ?1",
                    params![identity.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()
                .map_err(backend("subscription query failed"))?;

            let Some((period_end, price_id, customer_id, subscription_id)) = row else {
                return Ok(None);
            };

            let current_period_end = match period_end {
                Some(ms) => Some(Timestamp::from_epoch_millis(ms).ok_or_else(|| {
                    StoreError::CorruptRecord {
                        identity: identity.to_string(),
                        message: format!("current_period_end {ms} is out of range"),
                    }
                })?),
                None => None,
            };

            Ok(Some(SubscriptionRecord {
                identity,
                current_period_end,
                price_id: price_id.and_then(PriceId::new),
                customer_id: customer_id.and_then(CustomerId::new),
                subscription_id: subscription_id.and_then(SubscriptionId::new),
            }))
        })
        .await
    }
}
