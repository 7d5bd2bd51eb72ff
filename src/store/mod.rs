//! Embedded SQL store (`<data_dir>/bones.db`).
//!
//! One write connection owned for the process lifetime, guarded by a
//! process-wide lock so every multi-statement update is serialized. All
//! mutations run through [`Store::transaction`], which commits on normal
//! return and rolls back on any error propagation.

use crate::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed store for games, agents, findings, and disputes.
pub struct Store {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the store under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("bones.db");
        let conn = Connection::open(&db_path)?;

        let store = Self {
            db_path,
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            db_path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }

    /// Run a read or single-statement write against the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction. Commits when `f` returns `Ok`;
    /// any error propagation rolls the whole transaction back.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS games (
              id TEXT PRIMARY KEY,
              project TEXT NOT NULL,
              category TEXT NOT NULL,
              focus TEXT,
              target_score INTEGER NOT NULL,
              hunt_duration_secs INTEGER NOT NULL,
              review_duration_secs INTEGER NOT NULL,
              num_agents INTEGER NOT NULL,
              max_rounds INTEGER NOT NULL DEFAULT 3,
              phase TEXT NOT NULL,
              round INTEGER NOT NULL DEFAULT 0,
              phase_deadline TEXT,
              winner_agent_id TEXT,
              created_at TEXT NOT NULL,
              completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS agents (
              id TEXT PRIMARY KEY,
              game_id TEXT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
              short_name TEXT NOT NULL,
              score INTEGER NOT NULL DEFAULT 0,
              findings_submitted INTEGER NOT NULL DEFAULT 0,
              findings_valid INTEGER NOT NULL DEFAULT 0,
              findings_false INTEGER NOT NULL DEFAULT 0,
              findings_duplicate INTEGER NOT NULL DEFAULT 0,
              disputes_won INTEGER NOT NULL DEFAULT 0,
              disputes_lost INTEGER NOT NULL DEFAULT 0,
              hunt_done_round INTEGER NOT NULL DEFAULT 0,
              review_done_round INTEGER NOT NULL DEFAULT 0,
              status TEXT NOT NULL DEFAULT 'active',
              last_heartbeat TEXT,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS findings (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              game_id TEXT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
              agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
              round INTEGER NOT NULL,
              file_path TEXT NOT NULL,
              line_start INTEGER NOT NULL,
              line_end INTEGER NOT NULL,
              description TEXT NOT NULL,
              code_snippet TEXT,
              pattern_hash TEXT NOT NULL,
              status TEXT NOT NULL DEFAULT 'pending',
              duplicate_of INTEGER,
              verdict TEXT,
              confidence TEXT,
              points_awarded INTEGER NOT NULL DEFAULT 0,
              verification_status TEXT NOT NULL DEFAULT 'none',
              verifier_explanation TEXT,
              created_at TEXT NOT NULL,
              validated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS disputes (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              game_id TEXT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
              finding_id INTEGER NOT NULL REFERENCES findings(id) ON DELETE CASCADE,
              disputer_id TEXT NOT NULL,
              round INTEGER NOT NULL,
              reason TEXT NOT NULL,
              status TEXT NOT NULL DEFAULT 'pending',
              verdict TEXT,
              points_awarded INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL,
              resolved_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_agents_game ON agents(game_id);
            CREATE INDEX IF NOT EXISTS idx_findings_game ON findings(game_id);
            CREATE INDEX IF NOT EXISTS idx_findings_game_status ON findings(game_id, status);
            CREATE INDEX IF NOT EXISTS idx_findings_game_hash ON findings(game_id, pattern_hash);
            CREATE INDEX IF NOT EXISTS idx_disputes_game ON disputes(game_id);
            CREATE INDEX IF NOT EXISTS idx_disputes_finding ON disputes(finding_id);
            "#,
        )?;

        // Columns added after the initial schema shipped. Reruns are safe:
        // the duplicate-column failure is the signal the column exists.
        for alter in [
            "ALTER TABLE findings ADD COLUMN confidence_score INTEGER",
            "ALTER TABLE findings ADD COLUMN issue_type TEXT",
            "ALTER TABLE findings ADD COLUMN impact_tier TEXT",
            "ALTER TABLE findings ADD COLUMN rejection_reason TEXT",
        ] {
            if let Err(err) = conn.execute(alter, []) {
                if !err.to_string().contains("duplicate column") {
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }
}
