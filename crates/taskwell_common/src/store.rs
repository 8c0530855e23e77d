//! SQLite-backed persistence gateway.
//!
//! One `Connection` behind a mutex, shared by cloning the handle. Schema is
//! created on open; foreign keys are enabled so deleting an update cascades
//! to its audit log rows.

use crate::error::Result;
use crate::models::{
    LogPage, NewTask, NewUpdate, Task, TaskPatch, Update, UpdateLog, UpdatePatch, UpdateStatus,
    User,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared store handle. Cloning is cheap; all clones use the same
/// connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the database at `path` and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;

        // WAL for concurrent readers; foreign keys for the log cascade.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                title TEXT NOT NULL,
                description TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);

            CREATE TABLE IF NOT EXISTS updates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                version TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                applied_at TEXT,
                rollback_possible INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS update_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                update_id INTEGER NOT NULL REFERENCES updates(id) ON DELETE CASCADE,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                component TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_logs_update ON update_logs(update_id);
            CREATE INDEX IF NOT EXISTS idx_logs_update_level ON update_logs(update_id, level);
            "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Insert a new account. Callers check for duplicates first;
    /// the UNIQUE constraints are the backstop.
    pub fn insert_user(&self, username: &str, email: &str, password_hash: &str) -> Result<User> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, email, password_hash, now, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at, updated_at
                 FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Existence check for registration (either field taken).
    pub fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
            params![username, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub fn insert_task(&self, user_id: i64, task: &NewTask) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO tasks (user_id, title, description, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, task.title, task.description, task.completed, now, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Task {
            id,
            user_id,
            title: task.title.clone(),
            description: task.description.clone(),
            completed: task.completed,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, description, completed, created_at, updated_at
             FROM tasks WHERE user_id = ?1",
        )?;
        let tasks = stmt
            .query_map(params![user_id], task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn get_task(&self, user_id: i64, task_id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let task = conn
            .query_row(
                "SELECT id, user_id, title, description, completed, created_at, updated_at
                 FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id, user_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// Apply the provided subset of fields; absent fields keep their value.
    pub fn patch_task(&self, user_id: i64, task_id: i64, patch: &TaskPatch) -> Result<Option<Task>> {
        {
            let conn = self.conn.lock().unwrap();
            let now = Utc::now();
            let changed = conn.execute(
                "UPDATE tasks SET
                     title = COALESCE(?1, title),
                     description = COALESCE(?2, description),
                     completed = COALESCE(?3, completed),
                     updated_at = ?4
                 WHERE id = ?5 AND user_id = ?6",
                params![patch.title, patch.description, patch.completed, now, task_id, user_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_task(user_id, task_id)
    }

    pub fn set_task_completed(&self, user_id: i64, task_id: i64, completed: bool) -> Result<Option<Task>> {
        {
            let conn = self.conn.lock().unwrap();
            let now = Utc::now();
            let changed = conn.execute(
                "UPDATE tasks SET completed = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
                params![completed, now, task_id, user_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_task(user_id, task_id)
    }

    pub fn delete_task(&self, user_id: i64, task_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(changed > 0)
    }

    // ========================================================================
    // Updates
    // ========================================================================

    pub fn insert_update(&self, update: &NewUpdate) -> Result<Update> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO updates (title, description, version, status, created_at, updated_at, rollback_possible)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, 1)",
            params![update.title, update.description, update.version, now, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Update {
            id,
            title: update.title.clone(),
            description: update.description.clone(),
            version: update.version.clone(),
            status: UpdateStatus::Pending,
            created_at: now,
            updated_at: now,
            applied_at: None,
            rollback_possible: true,
        })
    }

    pub fn get_update(&self, update_id: i64) -> Result<Option<Update>> {
        let conn = self.conn.lock().unwrap();
        let update = conn
            .query_row(
                "SELECT id, title, description, version, status, created_at, updated_at, applied_at, rollback_possible
                 FROM updates WHERE id = ?1",
                params![update_id],
                update_from_row,
            )
            .optional()?;
        Ok(update)
    }

    pub fn list_updates(&self) -> Result<Vec<Update>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, version, status, created_at, updated_at, applied_at, rollback_possible
             FROM updates",
        )?;
        let updates = stmt
            .query_map([], update_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(updates)
    }

    /// Write a bare status change. One independently committed write; the
    /// lifecycle relies on this being durable before any work runs.
    pub fn mark_update_status(&self, update_id: i64, status: UpdateStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "UPDATE updates SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, update_id],
        )?;
        Ok(())
    }

    /// Successful apply: completed, applied_at stamped.
    pub fn mark_update_applied(&self, update_id: i64) -> Result<DateTime<Utc>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "UPDATE updates SET status = 'completed', applied_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now, update_id],
        )?;
        Ok(now)
    }

    /// Successful rollback: back to completed, applied_at cleared.
    pub fn mark_update_rolled_back(&self, update_id: i64) -> Result<DateTime<Utc>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "UPDATE updates SET status = 'completed', applied_at = NULL, updated_at = ?1 WHERE id = ?2",
            params![now, update_id],
        )?;
        Ok(now)
    }

    /// Direct field edit, no transition checks.
    pub fn patch_update(&self, update_id: i64, patch: &UpdatePatch) -> Result<Option<Update>> {
        {
            let conn = self.conn.lock().unwrap();
            let now = Utc::now();
            let changed = conn.execute(
                "UPDATE updates SET
                     title = COALESCE(?1, title),
                     description = COALESCE(?2, description),
                     status = COALESCE(?3, status),
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    patch.title,
                    patch.description,
                    patch.status.map(|s| s.as_str()),
                    now,
                    update_id
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_update(update_id)
    }

    /// Flip the rollback gate for an update. Nothing in the lifecycle sets
    /// this; it exists for provisioning updates that must never be
    /// reversed.
    pub fn set_rollback_possible(&self, update_id: i64, possible: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "UPDATE updates SET rollback_possible = ?1, updated_at = ?2 WHERE id = ?3",
            params![possible, now, update_id],
        )?;
        Ok(())
    }

    /// Delete an update; its logs go with it via the FK cascade.
    pub fn delete_update(&self, update_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM updates WHERE id = ?1", params![update_id])?;
        Ok(changed > 0)
    }

    // ========================================================================
    // Update logs
    // ========================================================================

    /// Append one immutable audit row. No retry, no buffering.
    pub fn insert_log(
        &self,
        update_id: i64,
        level: &str,
        message: &str,
        component: Option<&str>,
    ) -> Result<UpdateLog> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO update_logs (update_id, timestamp, level, message, component)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![update_id, now, level, message, component],
        )?;
        let id = conn.last_insert_rowid();
        Ok(UpdateLog {
            id,
            update_id,
            timestamp: now,
            level: level.to_string(),
            message: message.to_string(),
            component: component.map(str::to_string),
        })
    }

    /// Page through an update's logs, newest first.
    ///
    /// The level filter is exact-match and applied before pagination;
    /// `total_count` is the filtered count. An offset past the end yields an
    /// empty page, not an error. Existence of the update itself is the
    /// caller's check (`NotFound` belongs to the query service).
    pub fn logs_for_update(
        &self,
        update_id: i64,
        level: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<LogPage> {
        let conn = self.conn.lock().unwrap();

        let total_count: i64 = match level {
            Some(level) => conn.query_row(
                "SELECT COUNT(*) FROM update_logs WHERE update_id = ?1 AND level = ?2",
                params![update_id, level],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM update_logs WHERE update_id = ?1",
                params![update_id],
                |row| row.get(0),
            )?,
        };

        // id DESC breaks ties between rows stamped in the same instant.
        let logs = match level {
            Some(level) => {
                let mut stmt = conn.prepare(
                    "SELECT id, update_id, timestamp, level, message, component
                     FROM update_logs WHERE update_id = ?1 AND level = ?2
                     ORDER BY timestamp DESC, id DESC LIMIT ?3 OFFSET ?4",
                )?;
                let rows = stmt
                    .query_map(params![update_id, level, limit, offset], log_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, update_id, timestamp, level, message, component
                     FROM update_logs WHERE update_id = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![update_id, limit, offset], log_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(LogPage {
            logs,
            total_count: total_count as u64,
            limit,
            offset,
        })
    }

    pub fn count_logs(&self, update_id: i64) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM update_logs WHERE update_id = ?1",
            params![update_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        completed: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn update_from_row(row: &Row<'_>) -> rusqlite::Result<Update> {
    let status: String = row.get(4)?;
    Ok(Update {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        version: row.get(3)?,
        // Unknown strings in the column are treated as pending rather than
        // failing the whole read; only the application writes this column.
        status: UpdateStatus::parse(&status).unwrap_or(UpdateStatus::Pending),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        applied_at: row.get(7)?,
        rollback_possible: row.get(8)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<UpdateLog> {
    Ok(UpdateLog {
        id: row.get(0)?,
        update_id: row.get(1)?,
        timestamp: row.get(2)?,
        level: row.get(3)?,
        message: row.get(4)?,
        component: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("taskwell.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn create_and_fetch_update() {
        let (store, _dir) = test_store();
        let update = store
            .insert_update(&NewUpdate {
                title: "Patch 1".to_string(),
                description: None,
                version: "1.0.1".to_string(),
            })
            .unwrap();

        assert_eq!(update.status, UpdateStatus::Pending);
        assert!(update.rollback_possible);
        assert!(update.applied_at.is_none());

        let fetched = store.get_update(update.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Patch 1");
        assert_eq!(fetched.version, "1.0.1");
        assert_eq!(fetched.status, UpdateStatus::Pending);
    }

    #[test]
    fn missing_update_is_none() {
        let (store, _dir) = test_store();
        assert!(store.get_update(999).unwrap().is_none());
        assert!(!store.delete_update(999).unwrap());
        assert!(store.patch_update(999, &UpdatePatch::default()).unwrap().is_none());
    }

    #[test]
    fn patch_update_touches_only_given_fields() {
        let (store, _dir) = test_store();
        let update = store
            .insert_update(&NewUpdate {
                title: "Patch 1".to_string(),
                description: Some("initial".to_string()),
                version: "1.0.1".to_string(),
            })
            .unwrap();

        let patch = UpdatePatch {
            description: Some("revised".to_string()),
            ..Default::default()
        };
        let patched = store.patch_update(update.id, &patch).unwrap().unwrap();

        assert_eq!(patched.title, "Patch 1");
        assert_eq!(patched.description.as_deref(), Some("revised"));
        assert_eq!(patched.status, UpdateStatus::Pending);
        assert!(patched.updated_at >= update.updated_at);
    }

    #[test]
    fn delete_update_cascades_to_logs() {
        let (store, _dir) = test_store();
        let update = store
            .insert_update(&NewUpdate {
                title: "Patch 1".to_string(),
                description: None,
                version: "1.0.1".to_string(),
            })
            .unwrap();

        store.insert_log(update.id, "info", "first", None).unwrap();
        store.insert_log(update.id, "error", "second", None).unwrap();
        assert_eq!(store.count_logs(update.id).unwrap(), 2);

        assert!(store.delete_update(update.id).unwrap());
        assert_eq!(store.count_logs(update.id).unwrap(), 0);
    }

    #[test]
    fn logs_page_newest_first_with_filter() {
        let (store, _dir) = test_store();
        let update = store
            .insert_update(&NewUpdate {
                title: "Patch 1".to_string(),
                description: None,
                version: "1.0.1".to_string(),
            })
            .unwrap();

        for i in 0..4 {
            store
                .insert_log(update.id, "info", &format!("info {i}"), None)
                .unwrap();
            store
                .insert_log(update.id, "error", &format!("error {i}"), None)
                .unwrap();
        }

        let page = store.logs_for_update(update.id, Some("error"), 10, 0).unwrap();
        assert_eq!(page.total_count, 4);
        assert_eq!(page.logs.len(), 4);
        assert!(page.logs.iter().all(|l| l.level == "error"));
        // Newest first.
        assert_eq!(page.logs[0].message, "error 3");
        assert_eq!(page.logs[3].message, "error 0");

        // total_count ignores the limit.
        let page = store.logs_for_update(update.id, Some("error"), 2, 0).unwrap();
        assert_eq!(page.total_count, 4);
        assert_eq!(page.logs.len(), 2);
    }

    #[test]
    fn logs_offset_past_end_is_empty_page() {
        let (store, _dir) = test_store();
        let update = store
            .insert_update(&NewUpdate {
                title: "Patch 1".to_string(),
                description: None,
                version: "1.0.1".to_string(),
            })
            .unwrap();

        for i in 0..12 {
            store
                .insert_log(update.id, "info", &format!("entry {i}"), None)
                .unwrap();
        }

        let page = store.logs_for_update(update.id, None, 5, 10).unwrap();
        assert_eq!(page.total_count, 12);
        assert_eq!(page.logs.len(), 2);

        let page = store.logs_for_update(update.id, None, 5, 50).unwrap();
        assert_eq!(page.total_count, 12);
        assert!(page.logs.is_empty());
    }

    #[test]
    fn tasks_are_scoped_per_user() {
        let (store, _dir) = test_store();
        let alice = store.insert_user("alice", "alice@example.com", "h1").unwrap();
        let bob = store.insert_user("bob", "bob@example.com", "h2").unwrap();

        let task = store
            .insert_task(
                alice.id,
                &NewTask {
                    title: "Water plants".to_string(),
                    description: None,
                    completed: false,
                },
            )
            .unwrap();

        assert_eq!(store.list_tasks(alice.id).unwrap().len(), 1);
        assert!(store.list_tasks(bob.id).unwrap().is_empty());
        assert!(store.get_task(bob.id, task.id).unwrap().is_none());
        assert!(!store.delete_task(bob.id, task.id).unwrap());
        assert!(store.delete_task(alice.id, task.id).unwrap());
    }

    #[test]
    fn task_patch_and_complete_toggle() {
        let (store, _dir) = test_store();
        let user = store.insert_user("carol", "carol@example.com", "h").unwrap();
        let task = store
            .insert_task(
                user.id,
                &NewTask {
                    title: "Write report".to_string(),
                    description: None,
                    completed: false,
                },
            )
            .unwrap();

        let patched = store
            .patch_task(
                user.id,
                task.id,
                &TaskPatch {
                    title: Some("Write weekly report".to_string()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(patched.title, "Write weekly report");
        assert!(!patched.completed);

        let done = store.set_task_completed(user.id, task.id, true).unwrap().unwrap();
        assert!(done.completed);
    }

    #[test]
    fn user_lookup_and_duplicate_check() {
        let (store, _dir) = test_store();
        store.insert_user("dave", "dave@example.com", "h").unwrap();

        assert!(store.user_exists("dave", "other@example.com").unwrap());
        assert!(store.user_exists("other", "dave@example.com").unwrap());
        assert!(!store.user_exists("other", "other@example.com").unwrap());

        let user = store.find_user_by_email("dave@example.com").unwrap().unwrap();
        assert_eq!(user.username, "dave");
        assert!(store.find_user_by_email("nobody@example.com").unwrap().is_none());
    }
}
