//! Player storage backends.
//!
//! [`PlayerStore`] is the seam the registry talks to. Two backends ship:
//!
//! - [`MemoryStore`]: a `DashMap`, for tests and throwaway servers.
//! - [`SqliteStore`]: one JSON blob per player in SQLite.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS players (
//!     player_id  TEXT PRIMARY KEY,
//!     name       TEXT NOT NULL,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! The SQLite store runs in WAL mode, stores an optional CRC-32 of every
//! blob and supports online backups with rotation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{Result, SophiaError};
use crate::player::PlayerState;
use crate::types::PlayerId;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS players (
    player_id  TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Durable home of player records. Saves are whole-record replacements.
pub trait PlayerStore: Send + Sync + std::fmt::Debug {
    /// Fetch a player; `None` if unknown.
    ///
    /// # Errors
    /// Backend or decoding failures.
    fn load(&self, id: &PlayerId) -> Result<Option<PlayerState>>;

    /// Atomically replace (or insert) a player record.
    ///
    /// # Errors
    /// Backend or encoding failures.
    fn save(&self, player: &PlayerState) -> Result<()>;

    /// Every stored player id.
    ///
    /// # Errors
    /// Backend failures.
    fn list(&self) -> Result<Vec<PlayerId>>;

    /// Remove a player. Returns whether a record existed.
    ///
    /// # Errors
    /// Backend failures.
    fn delete(&self, id: &PlayerId) -> Result<bool>;

    /// Flush a recovery point (e.g. a rotating backup). No-op by default.
    ///
    /// # Errors
    /// Backend or filesystem failures.
    fn checkpoint(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the backend named by `config.backend`.
///
/// # Errors
/// `SophiaError::Config` for unknown backends; database errors otherwise.
pub fn open_store(config: &PersistenceConfig) -> Result<Arc<dyn PlayerStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => Ok(Arc::new(SqliteStore::open(&config.path, config)?)),
        other => Err(SophiaError::Config(format!("unknown persistence backend: {other}"))),
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Volatile store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    players: DashMap<PlayerId, PlayerState>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerStore for MemoryStore {
    fn load(&self, id: &PlayerId) -> Result<Option<PlayerState>> {
        Ok(self.players.get(id).map(|p| p.value().clone()))
    }

    fn save(&self, player: &PlayerState) -> Result<()> {
        self.players.insert(player.id.clone(), player.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<PlayerId>> {
        let mut ids: Vec<PlayerId> = self.players.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &PlayerId) -> Result<bool> {
        Ok(self.players.remove(id).is_some())
    }
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 / ITU-T V.42), bitwise.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

/// Player records in an SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// # Errors
    /// [`SophiaError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Player store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// [`SophiaError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Number of stored players.
    ///
    /// # Errors
    /// [`SophiaError::Database`] on SQLite failures.
    pub fn player_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    /// [`SophiaError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let conn = self.conn.lock();
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Player store backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `config.backup_count`.
    ///
    /// # Errors
    /// [`SophiaError::Database`] or [`SophiaError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }

        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }

        self.backup(self.backup_path(1))?;
        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Database file path, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// `PRAGMA integrity_check`; `Ok(false)` when corruption is found.
    ///
    /// # Errors
    /// [`SophiaError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl PlayerStore for SqliteStore {
    fn load(&self, id: &PlayerId) -> Result<Option<PlayerState>> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT data, checksum FROM players WHERE player_id = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![id.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        player = %id,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, possible save corruption"
                    );
                }
            }
        }

        let player: PlayerState = serde_json::from_slice(&data)
            .map_err(|e| SophiaError::Serialization(e.to_string()))?;

        debug!(
            player = %id,
            entries = player.authenticity_metric.history().len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded player"
        );
        Ok(Some(player))
    }

    fn save(&self, player: &PlayerState) -> Result<()> {
        let start = Instant::now();
        let json =
            serde_json::to_vec(player).map_err(|e| SophiaError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        self.conn.lock().execute(
            "INSERT INTO players (player_id, name, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(player_id) DO UPDATE SET
                name = excluded.name,
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![player.id.as_str(), player.name, json, now, checksum],
        )?;

        debug!(
            player = %player.id,
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved player"
        );
        Ok(())
    }

    fn list(&self) -> Result<Vec<PlayerId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT player_id FROM players ORDER BY player_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(PlayerId(row?));
        }
        Ok(ids)
    }

    fn delete(&self, id: &PlayerId) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM players WHERE player_id = ?1", params![id.as_str()])?;
        Ok(deleted > 0)
    }

    fn checkpoint(&self) -> Result<()> {
        self.create_rotating_backup()
    }
}

/// Adds `.optional()` to `rusqlite::Result`, mapping `QueryReturnedNoRows` to `None`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
