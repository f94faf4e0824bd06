
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::corpus::CorpusItem;
use crate::embeddings::{blob_to_vec, vec_to_blob};
use crate::index::Index;
use crate::{AssistError, Result};

pub type DbPool = Pool<Sqlite>;

/// SQLite persistence for index snapshots.
///
/// At most one snapshot is marked active. Writing a new snapshot activates it
/// and drops every older one inside the same transaction, so a reader never
/// observes a half-written index.
#[derive(Debug, Clone)]
pub struct IndexStore {
    pool: DbPool,
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    id: String,
    fingerprint: String,
    embedding_model: String,
    dimension: i64,
    item_count: i64,
    built_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct EntryRow {
    item_json: String,
    vector: Vec<u8>,
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AssistError {
    move |e| AssistError::Database(format!("{}: {}", context, e))
}

impl IndexStore {
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error("Failed to open index database"))?;

        let store = Self { pool };
        store.run_migrations().await?;

        debug!("Opened index store at {}", path.display());
        Ok(store)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("src/index/store/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AssistError::Database(format!("Failed to run schema migration: {}", e)))
    }

    /// Write `index` and make it the active snapshot
    #[inline]
    pub async fn persist(&self, index: &Index) -> Result<()> {
        let snapshot_id = index.id().to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        sqlx::query(
            "INSERT INTO index_snapshots (id, fingerprint, embedding_model, dimension, item_count, built_at, active)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&snapshot_id)
        .bind(index.fingerprint())
        .bind(index.embedding_model())
        .bind(index.dimension() as i64)
        .bind(index.len() as i64)
        .bind(index.built_at())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert index snapshot"))?;

        for (position, (item, vector)) in index.entries().enumerate() {
            let item_json = serde_json::to_string(item)
                .map_err(|e| AssistError::Database(format!("Failed to encode {}: {}", item.id, e)))?;

            sqlx::query(
                "INSERT INTO index_entries (snapshot_id, position, item_id, item_json, vector)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&snapshot_id)
            .bind(position as i64)
            .bind(&item.id)
            .bind(item_json)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to insert index entry"))?;
        }

        sqlx::query("UPDATE index_snapshots SET active = (id = ?)")
            .bind(&snapshot_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to activate index snapshot"))?;

        let removed = sqlx::query("DELETE FROM index_snapshots WHERE id != ?")
            .bind(&snapshot_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to remove superseded snapshots"))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(db_error("Failed to commit index snapshot"))?;

        info!(
            "Persisted index snapshot {} ({} items, {} superseded)",
            snapshot_id,
            index.len(),
            removed
        );
        Ok(())
    }

    /// Load the active snapshot, if one has been persisted
    #[inline]
    pub async fn load_active(&self) -> Result<Option<Index>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT id, fingerprint, embedding_model, dimension, item_count, built_at
             FROM index_snapshots WHERE active = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to read active snapshot"))?;

        let Some(row) = row else {
            debug!("No active index snapshot stored");
            return Ok(None);
        };

        let entries: Vec<EntryRow> = sqlx::query_as(
            "SELECT item_json, vector FROM index_entries WHERE snapshot_id = ? ORDER BY position",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to read index entries"))?;

        if entries.len() as i64 != row.item_count {
            return Err(AssistError::Database(format!(
                "Snapshot {} lists {} items but has {} entries",
                row.id,
                row.item_count,
                entries.len()
            )));
        }

        let mut items = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len());
        for entry in entries {
            let item: CorpusItem = serde_json::from_str(&entry.item_json)
                .map_err(|e| AssistError::Database(format!("Corrupt index entry: {}", e)))?;
            let vector = blob_to_vec(&entry.vector);
            if vector.len() as i64 != row.dimension {
                return Err(AssistError::Database(format!(
                    "Stored vector for {} has {} dimensions, expected {}",
                    item.id,
                    vector.len(),
                    row.dimension
                )));
            }
            items.push(item);
            vectors.push(vector);
        }

        let id = Uuid::parse_str(&row.id)
            .map_err(|e| AssistError::Database(format!("Invalid snapshot id {}: {}", row.id, e)))?;

        let index = Index::from_parts(
            id,
            row.fingerprint,
            row.built_at,
            row.embedding_model,
            items,
            vectors,
        )?;

        debug!("Loaded index snapshot {} with {} items", id, index.len());
        Ok(Some(index))
    }
}
