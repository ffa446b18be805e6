//! SQLite WAL persistent storage for vault documents
//!
//! - WAL mode: readers never block the writer
//! - One row per user key; `vault_version` and `updated_at` are denormalized
//!   out of `document_json` so the conflict check reads a single column
//! - Compare-and-swap is one conditional `INSERT`/`UPDATE`, so there is no
//!   read-then-write window and the write lock covers a single statement
//! - Connections live in a small idle pool; the pool mutex only guards
//!   checkout and return, never a query

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{CasOutcome, VaultStore};
use crate::codec;
use crate::document::VaultDocument;
use crate::error::{Result, VaultError};

const MAX_IDLE_CONNECTIONS: usize = 8;
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Vault store backed by an on-disk SQLite database
pub struct SqliteVaultStore {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl std::fmt::Debug for SqliteVaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVaultStore")
            .field("path", &self.path)
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

impl SqliteVaultStore {
    /// Open (or create) the database in WAL mode and run migrations.
    ///
    /// Every pooled connection opens the same file, so `:memory:` is not a
    /// usable path here; use [`MemoryVaultStore`](super::MemoryVaultStore).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Self::connect(&path)?;
        Self::migrate(&conn)?;
        tracing::info!("Vault store opened at {}", path.display());

        Ok(Self {
            path,
            idle: Mutex::new(vec![conn]),
        })
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(conn)
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS vaults (
                user_id       TEXT PRIMARY KEY,
                vault_version INTEGER NOT NULL,
                updated_at    TEXT NOT NULL,
                document_json TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let pooled = self.idle.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => Self::connect(&self.path)?,
        };

        let result = f(&mut conn);

        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
        result
    }
}

fn upsert(conn: &Connection, user_id: &str, document: &VaultDocument) -> Result<usize> {
    let document_json = codec::encode(document)?;
    let written = conn.execute(
        "INSERT INTO vaults (user_id, vault_version, updated_at, document_json)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             vault_version = excluded.vault_version,
             updated_at    = excluded.updated_at,
             document_json = excluded.document_json",
        params![
            user_id,
            document.vault_version,
            document.meta.updated_at.to_rfc3339(),
            document_json
        ],
    )?;
    Ok(written)
}

impl VaultStore for SqliteVaultStore {
    fn get(&self, user_id: &str) -> Result<Option<VaultDocument>> {
        self.with_conn(|conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT vault_version, document_json FROM vaults WHERE user_id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((version, document_json)) = row else {
                return Ok(None);
            };

            let document = codec::decode(&document_json)?;
            if document.vault_version != version {
                return Err(VaultError::Corrupt {
                    user_id: user_id.to_string(),
                    reason: format!(
                        "column version {} != document version {}",
                        version, document.vault_version
                    ),
                });
            }
            Ok(Some(document))
        })
    }

    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: i64,
        next: &VaultDocument,
    ) -> Result<CasOutcome> {
        let document_json = codec::encode(next)?;
        let updated_at = next.meta.updated_at.to_rfc3339();

        self.with_conn(|conn| {
            // Version test and write are one autocommit statement.
            let written = if expected_version == 0 {
                conn.execute(
                    "INSERT INTO vaults (user_id, vault_version, updated_at, document_json)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO NOTHING",
                    params![user_id, next.vault_version, updated_at, document_json],
                )?
            } else {
                conn.execute(
                    "UPDATE vaults
                     SET vault_version = ?2, updated_at = ?3, document_json = ?4
                     WHERE user_id = ?1 AND vault_version = ?5",
                    params![
                        user_id,
                        next.vault_version,
                        updated_at,
                        document_json,
                        expected_version
                    ],
                )?
            };

            if written == 1 {
                return Ok(CasOutcome::Applied);
            }

            let current_version: i64 = conn
                .query_row(
                    "SELECT vault_version FROM vaults WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            Ok(CasOutcome::Conflict { current_version })
        })
    }

    fn seed_if_empty(&self, documents: &[(String, VaultDocument)]) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let has_rows: bool =
                tx.query_row("SELECT EXISTS(SELECT 1 FROM vaults)", [], |row| row.get(0))?;
            if has_rows {
                tx.rollback()?;
                return Ok(0);
            }

            let mut written = 0;
            for (user_id, document) in documents {
                written += upsert(&tx, user_id, document)?;
            }
            tx.commit()?;
            Ok(written)
        })
    }

    fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM vaults", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}
