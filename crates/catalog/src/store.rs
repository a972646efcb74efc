use crate::cache::TtlCache;
use crate::error::{CatalogError, Result};
use crate::unix_now;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Current schema version. Increment when the schema changes.
const SCHEMA_VERSION: u32 = 1;

/// Durable mapping of `(project, relative path) → content hash + metadata`.
///
/// Backed by SQLite with an LRU/TTL cache in front. All access goes through
/// one connection guarded by a mutex, which doubles as the single-writer
/// queue: batch writes are serialized and transactional.
pub struct HashCatalog {
    conn: Mutex<Connection>,
    cache: Mutex<TtlCache>,
}

/// One row of `file_index_states`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub project_id: String,
    pub rel_path: String,
    pub content_hash: String,
    pub file_size: i64,
    pub last_modified: i64,
    pub language: Option<String>,
    pub file_type: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for `put` / `put_batch`.
#[derive(Debug, Clone)]
pub struct HashUpdate {
    pub project_id: String,
    pub rel_path: String,
    pub file_path: String,
    pub content_hash: String,
    pub file_size: i64,
    pub last_modified: i64,
    pub language: Option<String>,
    pub file_type: Option<String>,
}

/// One row of `projects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    pub id: String,
    pub path: String,
    pub collection_name: String,
    pub space_name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_indexed_at: Option<i64>,
    pub status: ProjectStatusKind,
}

/// Lifecycle state of a project row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatusKind {
    Active,
    Indexing,
    Failed,
    Deleted,
}

impl ProjectStatusKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ProjectStatusKind::Active => "active",
            ProjectStatusKind::Indexing => "indexing",
            ProjectStatusKind::Failed => "failed",
            ProjectStatusKind::Deleted => "deleted",
        }
    }

    fn from_str(raw: &str) -> Self {
        match raw {
            "indexing" => ProjectStatusKind::Indexing,
            "failed" => ProjectStatusKind::Failed,
            "deleted" => ProjectStatusKind::Deleted,
            _ => ProjectStatusKind::Active,
        }
    }
}

impl HashCatalog {
    /// Open or create the catalog database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory catalog for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_pragmas(&conn)?;

        let stored_version = get_user_version(&conn)?;
        if stored_version != 0 && stored_version != SCHEMA_VERSION {
            return Err(CatalogError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                actual: stored_version,
            });
        }

        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(TtlCache::new()),
        })
    }

    // -- Hash entries --

    /// Content hash for one file, cache-first.
    pub fn get(&self, project_id: &str, rel_path: &str) -> Result<Option<String>> {
        let key = TtlCache::key(project_id, rel_path);
        if let Some(hash) = self.cache.lock().expect("cache lock").get(&key) {
            return Ok(Some(hash));
        }

        let conn = self.conn.lock().expect("catalog lock");
        let mut stmt = conn.prepare_cached(
            "SELECT content_hash FROM file_index_states \
             WHERE project_id = ?1 AND relative_path = ?2",
        )?;
        let hash: Option<String> = stmt
            .query_row(params![project_id, rel_path], |row| row.get(0))
            .optional()?;
        drop(stmt);
        drop(conn);

        if let Some(hash) = &hash {
            self.cache
                .lock()
                .expect("cache lock")
                .put(key, hash.clone());
        }
        Ok(hash)
    }

    /// Hashes for many files at once; cached entries are served first, the
    /// rest come from one statement loop under a single lock.
    pub fn get_many(
        &self,
        project_id: &str,
        rel_paths: &[String],
    ) -> Result<HashMap<String, String>> {
        let mut found = HashMap::with_capacity(rel_paths.len());
        let mut misses = Vec::new();
        {
            let mut cache = self.cache.lock().expect("cache lock");
            for rel_path in rel_paths {
                match cache.get(&TtlCache::key(project_id, rel_path)) {
                    Some(hash) => {
                        found.insert(rel_path.clone(), hash);
                    }
                    None => misses.push(rel_path.clone()),
                }
            }
        }

        if misses.is_empty() {
            return Ok(found);
        }

        let mut fetched = Vec::new();
        {
            let conn = self.conn.lock().expect("catalog lock");
            let mut stmt = conn.prepare_cached(
                "SELECT content_hash FROM file_index_states \
                 WHERE project_id = ?1 AND relative_path = ?2",
            )?;
            for rel_path in misses {
                let hash: Option<String> = stmt
                    .query_row(params![project_id, rel_path], |row| row.get(0))
                    .optional()?;
                if let Some(hash) = hash {
                    fetched.push((rel_path, hash));
                }
            }
        }

        let mut cache = self.cache.lock().expect("cache lock");
        for (rel_path, hash) in fetched {
            cache.put(TtlCache::key(project_id, &rel_path), hash.clone());
            found.insert(rel_path, hash);
        }
        Ok(found)
    }

    /// Insert or update one file's hash entry, write-through.
    pub fn put(&self, update: &HashUpdate) -> Result<()> {
        self.put_batch(std::slice::from_ref(update))
    }

    /// Insert or update many entries in a single transaction.
    ///
    /// A project row missing for any entry is auto-created with a
    /// placeholder path so the foreign key holds. Cache entries are
    /// installed only after the transaction commits; a rollback therefore
    /// leaves the cache untouched.
    pub fn put_batch(&self, updates: &[HashUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let now = unix_now();

        {
            let mut conn = self.conn.lock().expect("catalog lock");
            let tx = conn.transaction()?;
            {
                let mut ensure_project = tx.prepare_cached(
                    "INSERT OR IGNORE INTO projects \
                     (id, path, collection_name, space_name, created_at, updated_at, status) \
                     VALUES (?1, 'unknown', '', '', ?2, ?2, 'active')",
                )?;
                let mut upsert = tx.prepare_cached(
                    "INSERT INTO file_index_states \
                     (project_id, file_path, relative_path, content_hash, file_size, \
                      last_modified, language, file_type, status, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'indexed', ?9, ?9) \
                     ON CONFLICT (project_id, relative_path) DO UPDATE SET \
                       file_path = excluded.file_path, \
                       content_hash = excluded.content_hash, \
                       file_size = excluded.file_size, \
                       last_modified = excluded.last_modified, \
                       language = excluded.language, \
                       file_type = excluded.file_type, \
                       status = 'indexed', \
                       updated_at = excluded.updated_at",
                )?;
                for update in updates {
                    ensure_project.execute(params![update.project_id, now])?;
                    upsert.execute(params![
                        update.project_id,
                        update.file_path,
                        update.rel_path,
                        update.content_hash,
                        update.file_size,
                        update.last_modified,
                        update.language,
                        update.file_type,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
        }

        let mut cache = self.cache.lock().expect("cache lock");
        for update in updates {
            cache.put(
                TtlCache::key(&update.project_id, &update.rel_path),
                update.content_hash.clone(),
            );
        }
        Ok(())
    }

    /// Remove one file's entry.
    pub fn delete(&self, project_id: &str, rel_path: &str) -> Result<()> {
        {
            let conn = self.conn.lock().expect("catalog lock");
            let mut stmt = conn.prepare_cached(
                "DELETE FROM file_index_states \
                 WHERE project_id = ?1 AND relative_path = ?2",
            )?;
            stmt.execute(params![project_id, rel_path])?;
        }
        self.cache
            .lock()
            .expect("cache lock")
            .remove(&TtlCache::key(project_id, rel_path));
        Ok(())
    }

    /// Move an entry to a new relative path, preserving its hash. A missing
    /// source row is a warned no-op, not an error.
    pub fn rename(&self, project_id: &str, old_rel: &str, new_rel: &str) -> Result<()> {
        let project_path: Option<String> = {
            let conn = self.conn.lock().expect("catalog lock");
            let mut stmt = conn.prepare_cached("SELECT path FROM projects WHERE id = ?1")?;
            stmt.query_row(params![project_id], |row| row.get(0))
                .optional()?
        };
        let new_file_path = match project_path.as_deref() {
            Some(path) if path != "unknown" => format!("{path}/{new_rel}"),
            _ => new_rel.to_string(),
        };

        let changed = {
            let conn = self.conn.lock().expect("catalog lock");
            let mut stmt = conn.prepare_cached(
                "UPDATE file_index_states \
                 SET relative_path = ?3, file_path = ?4, updated_at = ?5 \
                 WHERE project_id = ?1 AND relative_path = ?2",
            )?;
            stmt.execute(params![project_id, old_rel, new_rel, new_file_path, unix_now()])?
        };

        if changed == 0 {
            log::warn!("rename of untracked file {project_id}:{old_rel} -> {new_rel}; ignoring");
            return Ok(());
        }

        let mut cache = self.cache.lock().expect("cache lock");
        let old_key = TtlCache::key(project_id, old_rel);
        if let Some(hash) = cache.get(&old_key) {
            cache.remove(&old_key);
            cache.put(TtlCache::key(project_id, new_rel), hash);
        }
        Ok(())
    }

    /// Entries updated strictly after the given unix timestamp.
    pub fn changed_since(&self, project_id: &str, since: i64) -> Result<Vec<HashEntry>> {
        let conn = self.conn.lock().expect("catalog lock");
        let mut stmt = conn.prepare_cached(
            "SELECT project_id, relative_path, content_hash, file_size, last_modified, \
                    language, file_type, status, created_at, updated_at \
             FROM file_index_states \
             WHERE project_id = ?1 AND updated_at > ?2 \
             ORDER BY relative_path",
        )?;
        let rows = stmt.query_map(params![project_id, since], row_to_entry)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CatalogError::from)
    }

    /// All entries for one project, ordered by path.
    pub fn entries_for_project(&self, project_id: &str) -> Result<Vec<HashEntry>> {
        let conn = self.conn.lock().expect("catalog lock");
        let mut stmt = conn.prepare_cached(
            "SELECT project_id, relative_path, content_hash, file_size, last_modified, \
                    language, file_type, status, created_at, updated_at \
             FROM file_index_states WHERE project_id = ?1 ORDER BY relative_path",
        )?;
        let rows = stmt.query_map(params![project_id], row_to_entry)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CatalogError::from)
    }

    /// Drop every hash entry for a project while keeping its project row.
    /// Used by reindex, which rebuilds the file table from scratch.
    pub fn cleanup_project_entries(&self, project_id: &str) -> Result<usize> {
        let removed = {
            let conn = self.conn.lock().expect("catalog lock");
            let mut stmt =
                conn.prepare_cached("DELETE FROM file_index_states WHERE project_id = ?1")?;
            stmt.execute(params![project_id])?
        };
        self.cache
            .lock()
            .expect("cache lock")
            .remove_project(project_id);
        Ok(removed)
    }

    /// Delete entries not updated within the last `days` days; returns the
    /// number removed. The cache is fully invalidated.
    pub fn cleanup_expired(&self, days: u32) -> Result<usize> {
        let cutoff = unix_now() - i64::from(days) * 86_400;
        let removed = {
            let conn = self.conn.lock().expect("catalog lock");
            let mut stmt =
                conn.prepare_cached("DELETE FROM file_index_states WHERE updated_at <= ?1")?;
            stmt.execute(params![cutoff])?
        };
        self.cache.lock().expect("cache lock").clear();
        log::info!("catalog cleanup removed {removed} entries older than {days} days");
        Ok(removed)
    }

    // -- Project rows --

    pub fn upsert_project(&self, row: &ProjectRow) -> Result<()> {
        let conn = self.conn.lock().expect("catalog lock");
        let mut stmt = conn.prepare_cached(
            "INSERT INTO projects \
             (id, path, collection_name, space_name, created_at, updated_at, \
              last_indexed_at, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT (id) DO UPDATE SET \
               path = excluded.path, \
               collection_name = excluded.collection_name, \
               space_name = excluded.space_name, \
               updated_at = excluded.updated_at, \
               last_indexed_at = excluded.last_indexed_at, \
               status = excluded.status",
        )?;
        stmt.execute(params![
            row.id,
            row.path,
            row.collection_name,
            row.space_name,
            row.created_at,
            row.updated_at,
            row.last_indexed_at,
            row.status.as_str(),
        ])?;
        Ok(())
    }

    pub fn get_project(&self, project_id: &str) -> Result<Option<ProjectRow>> {
        let conn = self.conn.lock().expect("catalog lock");
        let mut stmt = conn.prepare_cached(
            "SELECT id, path, collection_name, space_name, created_at, updated_at, \
                    last_indexed_at, status \
             FROM projects WHERE id = ?1",
        )?;
        stmt.query_row(params![project_id], |row| {
            Ok(ProjectRow {
                id: row.get(0)?,
                path: row.get(1)?,
                collection_name: row.get(2)?,
                space_name: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
                last_indexed_at: row.get(6)?,
                status: ProjectStatusKind::from_str(&row.get::<_, String>(7)?),
            })
        })
        .optional()
        .map_err(CatalogError::from)
    }

    pub fn set_project_status(&self, project_id: &str, status: ProjectStatusKind) -> Result<()> {
        let conn = self.conn.lock().expect("catalog lock");
        let mut stmt = conn.prepare_cached(
            "UPDATE projects SET status = ?2, updated_at = ?3 WHERE id = ?1",
        )?;
        stmt.execute(params![project_id, status.as_str(), unix_now()])?;
        Ok(())
    }

    /// Record a completed index pass on the project row.
    pub fn touch_project_indexed(&self, project_id: &str) -> Result<()> {
        let now = unix_now();
        let conn = self.conn.lock().expect("catalog lock");
        let mut stmt = conn.prepare_cached(
            "UPDATE projects SET last_indexed_at = ?2, updated_at = ?2, status = 'active' \
             WHERE id = ?1",
        )?;
        stmt.execute(params![project_id, now])?;
        Ok(())
    }

    /// Remove a project and, by cascade, all of its hash entries.
    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        {
            let conn = self.conn.lock().expect("catalog lock");
            let mut stmt = conn.prepare_cached("DELETE FROM projects WHERE id = ?1")?;
            stmt.execute(params![project_id])?;
        }
        self.cache
            .lock()
            .expect("cache lock")
            .remove_project(project_id);
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HashEntry> {
    Ok(HashEntry {
        project_id: row.get(0)?,
        rel_path: row.get(1)?,
        content_hash: row.get(2)?,
        file_size: row.get(3)?,
        last_modified: row.get(4)?,
        language: row.get(5)?,
        file_type: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

fn get_user_version(conn: &Connection) -> Result<u32> {
    let v: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(v)
}

fn set_user_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            collection_name TEXT NOT NULL DEFAULT '',
            space_name TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_indexed_at INTEGER,
            status TEXT NOT NULL DEFAULT 'active'
        );

        CREATE TABLE IF NOT EXISTS file_index_states (
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            file_path TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            file_size INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER NOT NULL DEFAULT 0,
            language TEXT,
            file_type TEXT,
            status TEXT NOT NULL DEFAULT 'indexed',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (project_id, relative_path)
        );

        CREATE INDEX IF NOT EXISTS idx_file_index_states_file_path
            ON file_index_states (project_id, file_path);
        CREATE INDEX IF NOT EXISTS idx_file_index_states_updated_at
            ON file_index_states (updated_at);",
    )?;
    Ok(())
}
