//! SQL-based storage implementation for destinations and broadcast batches

use super::super::errors::{StoreError, StoreResult};
use super::super::registry::DestinationRegistry;
use super::super::store::BatchStore;
use super::super::types::{
    now_millis, BatchId, BatchMember, BatchState, BroadcastBatch, ChatId, DestinationId,
    MessageId, OriginRef, RegisterOutcome,
};
use crate::config::StoreConfig;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(600);

/// SQL-based storage for destinations and broadcast batches
#[derive(Clone)]
pub struct FanoutSqlStore {
    pool: Pool<SqliteConnectionManager>,
    claim_lease: Duration,
}

impl FanoutSqlStore {
    /// Create a new SQL store with the given connection pool
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        super::migrations::migrate(&pool)?;

        Ok(Self {
            pool,
            claim_lease: DEFAULT_CLAIM_LEASE,
        })
    }

    /// Set how long a batch may stay broadcasting or claimed before it can be
    /// taken over
    pub fn with_claim_lease(mut self, claim_lease: Duration) -> Self {
        self.claim_lease = claim_lease;
        self
    }

    /// Batches whose state changed at or before this instant are stale
    fn lease_cutoff(&self, now: i64) -> i64 {
        now.saturating_sub(self.claim_lease.as_millis() as i64)
    }

    /// Open (or create) the on-disk database described by `config`
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let busy_timeout = config.busy_timeout;
        let enable_wal = config.enable_wal;

        let manager = SqliteConnectionManager::file(&config.db_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if enable_wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            Ok(())
        });

        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

        debug!(path = %config.db_path.display(), "Opened fanout database");
        Ok(Self::new(pool)?.with_claim_lease(config.claim_lease))
    }

    /// Create a new in-memory store
    ///
    /// The pool holds a single connection, since every SQLite in-memory
    /// connection is its own database.
    pub fn memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;

        Self::new(pool)
    }

    fn load_members(conn: &Connection, batch_id: &BatchId) -> StoreResult<Vec<BatchMember>> {
        let mut stmt = conn.prepare(
            "SELECT destination_id, remote_message_id
             FROM batch_members WHERE batch_id = ? ORDER BY seq",
        )?;

        let members = stmt
            .query_map(params![batch_id.as_str()], |row| {
                Ok(BatchMember::new(
                    DestinationId(row.get(0)?),
                    MessageId(row.get(1)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(members)
    }

    fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<(BatchId, OriginRef, String, i64)> {
        Ok((
            BatchId::new(row.get::<_, String>(0)?),
            OriginRef::new(ChatId(row.get(1)?), MessageId(row.get(2)?)),
            row.get(3)?,
            row.get(4)?,
        ))
    }

    fn assemble(
        conn: &Connection,
        (batch_id, origin, state, created_at): (BatchId, OriginRef, String, i64),
    ) -> StoreResult<BroadcastBatch> {
        let state = BatchState::parse(&state)
            .ok_or_else(|| StoreError::Corrupt(format!("batch {} has state {}", batch_id, state)))?;
        let members = Self::load_members(conn, &batch_id)?;

        Ok(BroadcastBatch {
            batch_id,
            origin,
            state,
            created_at: created_at.max(0) as u64,
            members,
        })
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl BatchStore for FanoutSqlStore {
    fn create_batch(&self, batch_id: &BatchId, origin: OriginRef) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let retired: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM retired_batch_ids WHERE batch_id = ?",
                params![batch_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if retired.is_some() {
            return Err(StoreError::DuplicateBatch(batch_id.clone()));
        }

        tx.execute(
            "INSERT INTO batches
                 (batch_id, origin_chat_id, origin_message_id, state, state_since, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                batch_id.as_str(),
                origin.chat_id.0,
                origin.message_id.0,
                BatchState::Broadcasting.as_str(),
                now_millis() as i64,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::DuplicateBatch(batch_id.clone())
            } else {
                StoreError::Sqlite(e)
            }
        })?;

        tx.commit()?;

        Ok(())
    }

    fn add_member(
        &self,
        batch_id: &BatchId,
        destination_id: DestinationId,
        remote_message_id: MessageId,
    ) -> StoreResult<()> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO batch_members (batch_id, destination_id, remote_message_id)
             VALUES (?, ?, ?)",
            params![batch_id.as_str(), destination_id.0, remote_message_id.0],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::UnknownBatch(batch_id.clone())
            } else {
                StoreError::Sqlite(e)
            }
        })?;

        Ok(())
    }

    fn activate_batch(&self, batch_id: &BatchId) -> StoreResult<()> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE batches SET state = ?, state_since = ? WHERE batch_id = ? AND state = ?",
            params![
                BatchState::Active.as_str(),
                now_millis() as i64,
                batch_id.as_str(),
                BatchState::Broadcasting.as_str(),
            ],
        )?;

        if rows == 0 {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM batches WHERE batch_id = ?",
                    params![batch_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::UnknownBatch(batch_id.clone()));
            }
            // A retraction took the batch over after its lease expired
            warn!(batch_id = %batch_id, "Batch left broadcasting state before activation");
        }

        Ok(())
    }

    fn find_batch_by_origin(&self, origin: OriginRef) -> StoreResult<Option<BatchId>> {
        let conn = self.pool.get()?;
        let cutoff = self.lease_cutoff(now_millis() as i64);

        let batch_id = conn
            .query_row(
                "SELECT batch_id FROM batches
                 WHERE origin_chat_id = ? AND origin_message_id = ?
                   AND (state = ? OR state_since <= ?)
                 ORDER BY seq DESC LIMIT 1",
                params![
                    origin.chat_id.0,
                    origin.message_id.0,
                    BatchState::Active.as_str(),
                    cutoff,
                ],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(batch_id.map(BatchId::new))
    }

    fn list_members(&self, batch_id: &BatchId) -> StoreResult<Vec<BatchMember>> {
        let conn = self.pool.get()?;
        Self::load_members(&conn, batch_id)
    }

    fn claim_batch(&self, batch_id: &BatchId) -> StoreResult<bool> {
        let conn = self.pool.get()?;
        let now = now_millis() as i64;

        let rows = conn.execute(
            "UPDATE batches SET state = ?, state_since = ?
             WHERE batch_id = ? AND (state = ? OR state_since <= ?)",
            params![
                BatchState::Retracting.as_str(),
                now,
                batch_id.as_str(),
                BatchState::Active.as_str(),
                self.lease_cutoff(now),
            ],
        )?;

        Ok(rows == 1)
    }

    fn release_batch(&self, batch_id: &BatchId) -> StoreResult<()> {
        let conn = self.pool.get()?;

        conn.execute(
            "UPDATE batches SET state = ?, state_since = ? WHERE batch_id = ? AND state = ?",
            params![
                BatchState::Active.as_str(),
                now_millis() as i64,
                batch_id.as_str(),
                BatchState::Retracting.as_str(),
            ],
        )?;

        Ok(())
    }

    fn purge_batch(&self, batch_id: &BatchId) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM batch_members WHERE batch_id = ?",
            params![batch_id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM batches WHERE batch_id = ?",
            params![batch_id.as_str()],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO retired_batch_ids (batch_id, retired_at) VALUES (?, ?)",
            params![batch_id.as_str(), now_millis() as i64],
        )?;

        tx.commit()?;

        Ok(())
    }

    fn get_batch(&self, batch_id: &BatchId) -> StoreResult<Option<BroadcastBatch>> {
        let conn = self.pool.get()?;

        let row = conn
            .query_row(
                "SELECT batch_id, origin_chat_id, origin_message_id, state, created_at
                 FROM batches WHERE batch_id = ?",
                params![batch_id.as_str()],
                Self::batch_from_row,
            )
            .optional()?;

        row.map(|row| Self::assemble(&conn, row)).transpose()
    }

    fn recent_batches(&self, limit: usize) -> StoreResult<Vec<BroadcastBatch>> {
        let conn = self.pool.get()?;

        let rows = {
            let mut stmt = conn.prepare(
                "SELECT batch_id, origin_chat_id, origin_message_id, state, created_at
                 FROM batches ORDER BY seq DESC LIMIT ?",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], Self::batch_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|row| Self::assemble(&conn, row))
            .collect()
    }
}

impl DestinationRegistry for FanoutSqlStore {
    fn list_destinations(&self) -> StoreResult<Vec<DestinationId>> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare("SELECT destination_id FROM destinations ORDER BY seq")?;
        let destinations = stmt
            .query_map([], |row| Ok(DestinationId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(destinations)
    }

    fn register(&self, destination: DestinationId) -> StoreResult<RegisterOutcome> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "INSERT OR IGNORE INTO destinations (destination_id, registered_at) VALUES (?, ?)",
            params![destination.0, now_millis() as i64],
        )?;

        Ok(if rows == 1 {
            RegisterOutcome::Registered
        } else {
            RegisterOutcome::AlreadyRegistered
        })
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.pool.get()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM destinations", [], |row| row.get(0))?;

        Ok(count.max(0) as usize)
    }
}
