//! Update lifecycle state machine.
//!
//! States: pending -> in-progress -> completed | failed. Rollback reuses
//! the in-progress -> completed leg, returning a completed update to its
//! unapplied form.
//!
//! Apply and rollback are two-commit transitions: the in-progress status is
//! durable *before* the work unit runs, and the outcome status is a second
//! independent write. A crash between the two leaves a visibly stuck
//! in-progress row, which is the intended observable behavior; do not wrap
//! the pair in one transaction.
//!
//! There is no per-update lock: two concurrent applies can both pass the
//! precondition check before either writes in-progress (last write wins on
//! the status column). Known gap, kept as-is.

use crate::audit::{log_update_activity, UPDATE_COMPONENT};
use crate::error::{Error, Result};
use crate::models::{NewUpdate, Update, UpdatePatch, UpdateStatus};
use crate::store::Store;

/// The unit of work an apply or rollback performs. The production
/// implementation is a placeholder; real migration or restoration logic
/// would slot in here.
pub type WorkFn = fn(&Update) -> anyhow::Result<()>;

fn apply_work(_update: &Update) -> anyhow::Result<()> {
    // Placeholder: schema migrations, data transformations, etc.
    Ok(())
}

fn rollback_work(_update: &Update) -> anyhow::Result<()> {
    // Placeholder: reverse migrations, data restoration, etc.
    Ok(())
}

/// Owns all status transitions for update records.
#[derive(Clone)]
pub struct UpdateLifecycle {
    store: Store,
    apply_work: WorkFn,
    rollback_work: WorkFn,
}

impl UpdateLifecycle {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            apply_work,
            rollback_work,
        }
    }

    /// Swap the work units out, used by tests to exercise failure paths.
    pub fn with_work(store: Store, apply_work: WorkFn, rollback_work: WorkFn) -> Self {
        Self {
            store,
            apply_work,
            rollback_work,
        }
    }

    /// Create a new update record in `pending`.
    pub fn create(&self, update: &NewUpdate) -> Result<Update> {
        self.store.insert_update(update)
    }

    /// Attempt to apply an update.
    ///
    /// Preconditions (checked before any mutation): the update exists, and
    /// its status is neither in-progress nor completed. Returns the success
    /// flag of the work unit; a `false` means the update is now `failed`.
    /// Exactly one audit entry is written per outcome.
    pub fn apply(&self, update_id: i64) -> Result<bool> {
        let update = self
            .store
            .get_update(update_id)?
            .ok_or(Error::NotFound("Update"))?;

        if matches!(
            update.status,
            UpdateStatus::InProgress | UpdateStatus::Completed
        ) {
            return Err(Error::conflict(
                "Update cannot be applied due to current status",
            ));
        }

        // First commit: in-progress is queryable before any work starts.
        self.store
            .mark_update_status(update_id, UpdateStatus::InProgress)?;

        match (self.apply_work)(&update) {
            Ok(()) => {
                self.store.mark_update_applied(update_id)?;
                log_update_activity(
                    &self.store,
                    update_id,
                    "info",
                    "Update applied successfully",
                    Some(UPDATE_COMPONENT),
                )?;
                Ok(true)
            }
            Err(err) => {
                self.store
                    .mark_update_status(update_id, UpdateStatus::Failed)?;
                log_update_activity(
                    &self.store,
                    update_id,
                    "error",
                    &format!("Update application failed: {err}"),
                    Some(UPDATE_COMPONENT),
                )?;
                Ok(false)
            }
        }
    }

    /// Attempt to roll back a completed update.
    ///
    /// Preconditions: the update exists, rollback is permitted for it, and
    /// its status is exactly `completed`. On success the status returns to
    /// `completed` with `applied_at` cleared.
    ///
    /// `rollback_possible` is never flipped here, so a completed update can
    /// be rolled back repeatedly. That mirrors the product behavior as
    /// shipped; see DESIGN.md before tightening it.
    pub fn rollback(&self, update_id: i64) -> Result<bool> {
        let update = self
            .store
            .get_update(update_id)?
            .ok_or(Error::NotFound("Update"))?;

        if !update.rollback_possible {
            return Err(Error::conflict("Update cannot be rolled back"));
        }
        if update.status != UpdateStatus::Completed {
            return Err(Error::conflict(
                "Update cannot be rolled back due to current status",
            ));
        }

        self.store
            .mark_update_status(update_id, UpdateStatus::InProgress)?;

        match (self.rollback_work)(&update) {
            Ok(()) => {
                self.store.mark_update_rolled_back(update_id)?;
                log_update_activity(
                    &self.store,
                    update_id,
                    "info",
                    "Update rolled back successfully",
                    Some(UPDATE_COMPONENT),
                )?;
                Ok(true)
            }
            Err(err) => {
                self.store
                    .mark_update_status(update_id, UpdateStatus::Failed)?;
                log_update_activity(
                    &self.store,
                    update_id,
                    "error",
                    &format!("Update rollback failed: {err}"),
                    Some(UPDATE_COMPONENT),
                )?;
                Ok(false)
            }
        }
    }

    /// Direct field edit bypassing transition checks. Intentionally
    /// unchecked; operators use it to repair records.
    pub fn update_fields(&self, update_id: i64, patch: &UpdatePatch) -> Result<Option<Update>> {
        self.store.patch_update(update_id, patch)
    }

    /// Delete an update and, via the store cascade, its audit log.
    pub fn delete(&self, update_id: i64) -> Result<bool> {
        self.store.delete_update(update_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use tempfile::TempDir;

    fn failing_work(_update: &Update) -> anyhow::Result<()> {
        Err(anyhow!("simulated work failure"))
    }

    fn setup() -> (Store, UpdateLifecycle, i64, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("lifecycle.db")).unwrap();
        let lifecycle = UpdateLifecycle::new(store.clone());
        let update = lifecycle
            .create(&NewUpdate {
                title: "Patch 1".to_string(),
                description: None,
                version: "1.0.1".to_string(),
            })
            .unwrap();
        (store, lifecycle, update.id, dir)
    }

    #[test]
    fn apply_from_pending_completes_and_logs_once() {
        let (store, lifecycle, id, _dir) = setup();

        assert!(lifecycle.apply(id).unwrap());

        let update = store.get_update(id).unwrap().unwrap();
        assert_eq!(update.status, UpdateStatus::Completed);
        let applied_at = update.applied_at.expect("applied_at set");
        assert!(applied_at >= update.created_at);

        let page = store.logs_for_update(id, None, 10, 0).unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.logs[0].level, "info");
        assert_eq!(page.logs[0].component.as_deref(), Some("update-system"));
    }

    #[test]
    fn apply_from_failed_is_allowed() {
        let (store, lifecycle, id, _dir) = setup();
        store.mark_update_status(id, UpdateStatus::Failed).unwrap();

        assert!(lifecycle.apply(id).unwrap());
        let update = store.get_update(id).unwrap().unwrap();
        assert_eq!(update.status, UpdateStatus::Completed);
    }

    #[test]
    fn apply_rejected_while_in_progress_or_completed() {
        let (store, lifecycle, id, _dir) = setup();

        for status in [UpdateStatus::InProgress, UpdateStatus::Completed] {
            store.mark_update_status(id, status).unwrap();
            let err = lifecycle.apply(id).unwrap_err();
            assert!(matches!(err, Error::Conflict(_)));
            // No mutation, no log entry.
            let update = store.get_update(id).unwrap().unwrap();
            assert_eq!(update.status, status);
            assert_eq!(store.count_logs(id).unwrap(), 0);
        }
    }

    #[test]
    fn apply_failure_marks_failed_and_logs_error() {
        let (store, _lifecycle, id, _dir) = setup();
        let lifecycle = UpdateLifecycle::with_work(store.clone(), failing_work, rollback_work);

        assert!(!lifecycle.apply(id).unwrap());

        let update = store.get_update(id).unwrap().unwrap();
        assert_eq!(update.status, UpdateStatus::Failed);
        assert!(update.applied_at.is_none());

        let page = store.logs_for_update(id, Some("error"), 10, 0).unwrap();
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn rollback_clears_applied_at() {
        let (store, lifecycle, id, _dir) = setup();
        assert!(lifecycle.apply(id).unwrap());

        assert!(lifecycle.rollback(id).unwrap());

        let update = store.get_update(id).unwrap().unwrap();
        assert_eq!(update.status, UpdateStatus::Completed);
        assert!(update.applied_at.is_none());

        // One apply log plus one rollback log.
        let page = store.logs_for_update(id, Some("info"), 10, 0).unwrap();
        assert_eq!(page.total_count, 2);
    }

    #[test]
    fn rollback_rejected_unless_completed() {
        let (store, lifecycle, id, _dir) = setup();

        for status in [
            UpdateStatus::Pending,
            UpdateStatus::InProgress,
            UpdateStatus::Failed,
        ] {
            store.mark_update_status(id, status).unwrap();
            let err = lifecycle.rollback(id).unwrap_err();
            assert!(matches!(err, Error::Conflict(_)));
            assert_eq!(store.count_logs(id).unwrap(), 0);
        }
    }

    #[test]
    fn rollback_rejected_when_not_possible() {
        let (store, lifecycle, id, _dir) = setup();
        assert!(lifecycle.apply(id).unwrap());

        store.set_rollback_possible(id, false).unwrap();

        let err = lifecycle.rollback(id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn repeated_rollback_of_completed_update_is_permitted() {
        let (store, lifecycle, id, _dir) = setup();
        assert!(lifecycle.apply(id).unwrap());

        assert!(lifecycle.rollback(id).unwrap());
        // Status is completed again and rollback_possible was never
        // flipped, so a second rollback still goes through.
        assert!(lifecycle.rollback(id).unwrap());

        let update = store.get_update(id).unwrap().unwrap();
        assert_eq!(update.status, UpdateStatus::Completed);
        assert!(update.rollback_possible);
    }

    #[test]
    fn rollback_failure_marks_failed() {
        let (store, lifecycle, id, _dir) = setup();
        assert!(lifecycle.apply(id).unwrap());

        let failing = UpdateLifecycle::with_work(store.clone(), apply_work, failing_work);
        assert!(!failing.rollback(id).unwrap());

        let update = store.get_update(id).unwrap().unwrap();
        assert_eq!(update.status, UpdateStatus::Failed);
    }

    #[test]
    fn unknown_id_is_not_found_never_conflict() {
        let (_store, lifecycle, _id, _dir) = setup();

        assert!(matches!(lifecycle.apply(999), Err(Error::NotFound(_))));
        assert!(matches!(lifecycle.rollback(999), Err(Error::NotFound(_))));
        assert!(lifecycle.update_fields(999, &UpdatePatch::default()).unwrap().is_none());
        assert!(!lifecycle.delete(999).unwrap());
    }

    #[test]
    fn update_fields_bypasses_transition_checks() {
        let (store, lifecycle, id, _dir) = setup();

        let patch = UpdatePatch {
            status: Some(UpdateStatus::Completed),
            ..Default::default()
        };
        let update = lifecycle.update_fields(id, &patch).unwrap().unwrap();
        assert_eq!(update.status, UpdateStatus::Completed);

        // The escape hatch wrote no audit entry.
        assert_eq!(store.count_logs(id).unwrap(), 0);
    }

    #[test]
    fn delete_removes_update_and_logs() {
        let (store, lifecycle, id, _dir) = setup();
        assert!(lifecycle.apply(id).unwrap());
        assert_eq!(store.count_logs(id).unwrap(), 1);

        assert!(lifecycle.delete(id).unwrap());
        assert!(store.get_update(id).unwrap().is_none());
        assert_eq!(store.count_logs(id).unwrap(), 0);
    }
}
