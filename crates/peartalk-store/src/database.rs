//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations have run before any other operation. Secondary indexes whose
//! entry count disagrees with the primary records are repaired on open.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use peartalk_shared::constants::KDF_CONTEXT_STORE_DIR;
use peartalk_shared::UserId;

use crate::error::{Result, StoreError};
use crate::migrations;

/// File name of the message database inside a per-identity directory.
pub const DB_FILE_NAME: &str = "messages.db";

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Platform data directory under which per-identity stores are created:
    /// - Linux:   `~/.local/share/peartalk`
    /// - macOS:   `~/Library/Application Support/org.peartalk.peartalk`
    /// - Windows: `{FOLDERID_RoamingAppData}\peartalk\peartalk\data`
    pub fn default_root() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("org", "peartalk", "peartalk").ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().to_path_buf())
    }

    /// Open (or create) the store of `identity` below `root`.
    ///
    /// Each local identity gets its own directory so that independent cores
    /// never share a database file.
    pub fn open_for(root: &Path, identity: &UserId) -> Result<Self> {
        let dir = store_dir_for(root, identity);
        std::fs::create_dir_all(&dir)?;

        let db_path = dir.join(DB_FILE_NAME);
        tracing::info!(path = %db_path.display(), identity = %identity, "opening message store");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run_migrations(&conn)?;

        let db = Self { conn };

        if !db.indexes_consistent()? {
            db.repair_indexes()?;
        }

        Ok(db)
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

/// Directory holding the store of `identity` below `root`.
///
/// The identity is hashed so that arbitrary identity strings map to a safe
/// directory name.
pub fn store_dir_for(root: &Path, identity: &UserId) -> PathBuf {
    let hash = blake3::derive_key(KDF_CONTEXT_STORE_DIR, identity.as_bytes());
    root.join(hex::encode(&hash[..16]))
}
