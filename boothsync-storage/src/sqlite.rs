//! SQLite-backed store for a kiosk's on-disk database.

use crate::error::{StorageError, StorageResult};
use crate::record::{EntityRecord, EntityRef, Tombstone};
use crate::store::LocalStateStore;
use boothsync_types::{DeviceId, EntityKind, LocalId, NaturalKey};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

const MANIFEST_META_KEY: &str = "sync_manifest";

/// Raw column values of one `entities` row.
type EntityRow = (i64, String, String, String, i64, String, String);

/// Persistent [`LocalStateStore`] backed by SQLite.
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        debug!("Opened entity store at {}", path.as_ref().display());
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                refs TEXT NOT NULL,
                version INTEGER NOT NULL,
                modified_at TEXT NOT NULL,
                modified_by TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities (kind, name);

            CREATE TABLE IF NOT EXISTS entity_assets (
                kind TEXT NOT NULL,
                id INTEGER NOT NULL,
                file TEXT NOT NULL,
                bytes BLOB NOT NULL,
                PRIMARY KEY (kind, id, file)
            );

            CREATE TABLE IF NOT EXISTS id_sequence (
                kind TEXT PRIMARY KEY,
                next_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tombstones (
                natural_key TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                deleted_at TEXT NOT NULL,
                deleted_by TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn select_rows(
        conn: &Connection,
        kind: EntityKind,
        filter: &str,
        arg: Option<&dyn rusqlite::ToSql>,
    ) -> StorageResult<Vec<EntityRecord>> {
        let sql = format!(
            "SELECT id, name, data, refs, version, modified_at, modified_by
             FROM entities WHERE kind = ?1 {filter} ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<EntityRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        };
        let rows: Vec<EntityRow> = match arg {
            Some(arg) => stmt
                .query_map(params![kind.as_str(), arg], map)?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map(params![kind.as_str()], map)?
                .collect::<Result<_, _>>()?,
        };

        rows.into_iter()
            .map(|row| Self::decode(conn, kind, row))
            .collect()
    }

    fn decode(conn: &Connection, kind: EntityKind, row: EntityRow) -> StorageResult<EntityRecord> {
        let (id, name, data, refs, version, modified_at, modified_by) = row;
        let mut stmt = conn.prepare("SELECT file, bytes FROM entity_assets WHERE kind = ?1 AND id = ?2")?;
        let assets = stmt
            .query_map(params![kind.as_str(), id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<_, _>>()?;

        Ok(EntityRecord {
            id: Some(LocalId::new(id)),
            kind,
            name,
            data: serde_json::from_str(&data)?,
            references: serde_json::from_str::<Vec<EntityRef>>(&refs)?,
            assets,
            version: u64::try_from(version)
                .map_err(|_| StorageError::InvalidData(format!("negative version {version}")))?,
            modified_at: parse_time(&modified_at)?,
            modified_by: DeviceId::new(modified_by),
        })
    }

    fn allocate_id(tx: &Transaction<'_>, kind: EntityKind) -> StorageResult<LocalId> {
        let next: Option<i64> = tx
            .query_row(
                "SELECT next_id FROM id_sequence WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let id = next.unwrap_or(1);
        tx.execute(
            "INSERT OR REPLACE INTO id_sequence (kind, next_id) VALUES (?1, ?2)",
            params![kind.as_str(), id + 1],
        )?;
        Ok(LocalId::new(id))
    }

    fn bump_sequence(tx: &Transaction<'_>, kind: EntityKind, id: LocalId) -> StorageResult<()> {
        tx.execute(
            "INSERT INTO id_sequence (kind, next_id) VALUES (?1, ?2)
             ON CONFLICT(kind) DO UPDATE SET next_id = MAX(next_id, excluded.next_id)",
            params![kind.as_str(), id.get() + 1],
        )?;
        Ok(())
    }
}

fn parse_time(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("bad timestamp {s:?}: {e}")))
}

impl LocalStateStore for SqliteStateStore {
    fn list(&self, kind: EntityKind) -> StorageResult<Vec<EntityRecord>> {
        let conn = self.lock();
        Self::select_rows(&conn, kind, "", None)
    }

    fn get(&self, kind: EntityKind, id: LocalId) -> StorageResult<Option<EntityRecord>> {
        let conn = self.lock();
        let raw = id.get();
        Ok(Self::select_rows(&conn, kind, "AND id = ?2", Some(&raw))?
            .into_iter()
            .next())
    }

    fn find_by_name(&self, kind: EntityKind, name: &str) -> StorageResult<Vec<EntityRecord>> {
        let conn = self.lock();
        Self::select_rows(&conn, kind, "AND name = ?2", Some(&name))
    }

    fn upsert(&self, record: EntityRecord) -> StorageResult<LocalId> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let kind = record.kind;
        let id = match record.id {
            Some(id) => {
                Self::bump_sequence(&tx, kind, id)?;
                id
            }
            None => Self::allocate_id(&tx, kind)?,
        };

        let version = i64::try_from(record.version)
            .map_err(|_| StorageError::InvalidData(format!("version overflow {}", record.version)))?;
        tx.execute(
            "INSERT OR REPLACE INTO entities
                (kind, id, name, data, refs, version, modified_at, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                kind.as_str(),
                id.get(),
                record.name,
                serde_json::to_string(&record.data)?,
                serde_json::to_string(&record.references)?,
                version,
                record.modified_at.to_rfc3339(),
                record.modified_by.as_str(),
            ],
        )?;
        tx.execute(
            "DELETE FROM entity_assets WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id.get()],
        )?;
        for (file, bytes) in &record.assets {
            tx.execute(
                "INSERT INTO entity_assets (kind, id, file, bytes) VALUES (?1, ?2, ?3, ?4)",
                params![kind.as_str(), id.get(), file, bytes],
            )?;
        }
        tx.execute(
            "DELETE FROM tombstones WHERE natural_key = ?1",
            params![record.natural_key().to_string()],
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn delete(&self, kind: EntityKind, id: LocalId) -> StorageResult<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM entities WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id.get()],
        )?;
        tx.execute(
            "DELETE FROM entity_assets WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id.get()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn tombstones(&self) -> StorageResult<Vec<Tombstone>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT natural_key, version, deleted_at, deleted_by FROM tombstones",
        )?;
        let rows: Vec<(String, i64, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<_, _>>()?;

        let mut tombstones = rows
            .into_iter()
            .map(|(key, version, deleted_at, deleted_by)| {
                Ok(Tombstone {
                    key: NaturalKey::parse(&key)?,
                    version: u64::try_from(version).map_err(|_| {
                        StorageError::InvalidData(format!("negative tombstone version {version}"))
                    })?,
                    deleted_at: parse_time(&deleted_at)?,
                    deleted_by: DeviceId::new(deleted_by),
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;
        tombstones.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(tombstones)
    }

    fn put_tombstone(&self, tombstone: Tombstone) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO tombstones (natural_key, version, deleted_at, deleted_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                tombstone.key.to_string(),
                i64::try_from(tombstone.version).unwrap_or(i64::MAX),
                tombstone.deleted_at.to_rfc3339(),
                tombstone.deleted_by.as_str(),
            ],
        )?;
        Ok(())
    }

    fn remove_tombstone(&self, key: &NaturalKey) -> StorageResult<bool> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM tombstones WHERE natural_key = ?1",
            params![key.to_string()],
        )?;
        Ok(removed > 0)
    }

    fn load_manifest(&self) -> StorageResult<Option<String>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![MANIFEST_META_KEY],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn store_manifest(&self, json: &str) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?1, ?2)",
            params![MANIFEST_META_KEY, json],
        )?;
        Ok(())
    }
}
