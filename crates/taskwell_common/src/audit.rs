//! Audit log writer for update lifecycle events.
//!
//! Every lifecycle transition (and every failure) produces exactly one
//! durable row in `update_logs`, plus a mirrored line in the process log.
//! Writes are single synchronous inserts; there is no retry or buffering,
//! and a write happens regardless of whether the transition that triggered
//! it ultimately succeeds.

use crate::error::Result;
use crate::models::UpdateLog;
use crate::store::Store;
use tracing::{debug, error, info, warn};

/// Component tag used by the update subsystem itself.
pub const UPDATE_COMPONENT: &str = "update-system";

/// Append one audit row. Levels are free-form strings by contract;
/// validation happens nowhere, the fallback rule in
/// [`log_update_activity`] handles unrecognized values.
pub fn append(
    store: &Store,
    update_id: i64,
    level: &str,
    message: &str,
    component: Option<&str>,
) -> Result<UpdateLog> {
    store.insert_log(update_id, level, message, component)
}

/// Record an update activity: mirror it to the process log, then append the
/// durable audit row.
///
/// Unrecognized level strings are mirrored at debug severity (fallback
/// rule) but stored verbatim.
pub fn log_update_activity(
    store: &Store,
    update_id: i64,
    level: &str,
    message: &str,
    component: Option<&str>,
) -> Result<UpdateLog> {
    let tag = component.unwrap_or("-");
    match level.to_ascii_lowercase().as_str() {
        "error" | "critical" => error!("UPDATE-{update_id}: [{level}] [{tag}] {message}"),
        "warning" => warn!("UPDATE-{update_id}: [{level}] [{tag}] {message}"),
        "info" => info!("UPDATE-{update_id}: [{level}] [{tag}] {message}"),
        _ => debug!("UPDATE-{update_id}: [{level}] [{tag}] {message}"),
    }

    append(store, update_id, level, message, component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUpdate;
    use tempfile::TempDir;

    fn store_with_update() -> (Store, i64, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("audit.db")).unwrap();
        let update = store
            .insert_update(&NewUpdate {
                title: "Patch 1".to_string(),
                description: None,
                version: "1.0.1".to_string(),
            })
            .unwrap();
        (store, update.id, dir)
    }

    #[test]
    fn append_writes_one_row() {
        let (store, id, _dir) = store_with_update();
        let entry = append(&store, id, "info", "hello", Some(UPDATE_COMPONENT)).unwrap();

        assert_eq!(entry.update_id, id);
        assert_eq!(entry.level, "info");
        assert_eq!(entry.component.as_deref(), Some("update-system"));
        assert_eq!(store.count_logs(id).unwrap(), 1);
    }

    #[test]
    fn unknown_level_is_accepted_verbatim() {
        let (store, id, _dir) = store_with_update();
        let entry = log_update_activity(&store, id, "trace", "odd level", None).unwrap();

        assert_eq!(entry.level, "trace");
        let page = store.logs_for_update(id, Some("trace"), 10, 0).unwrap();
        assert_eq!(page.total_count, 1);
    }
}
