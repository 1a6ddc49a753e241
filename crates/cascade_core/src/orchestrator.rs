//! Top-level save and delete.
//!
//! The orchestrator owns what a nested call never touches: policy checks
//! that are hard failures at the top, the transaction, and the choice
//! between the success and the failure after phase.
//!
//! ```text
//! save_all:   check -> open tx -> before -> save -> commit -> after
//!                                    \         \        \
//!                                     +---------+--------+-> rollback -> after_failed
//! ```

use crate::error::{CoreError, CoreResult};
use crate::node::{Persistable, SaveOptions};
use crate::policy::ActionError;
use crate::transaction::TransactionScope;

fn rollback<N: Persistable + ?Sized>(node: &N, scope: TransactionScope) {
    if let Err(err) = scope.rollback() {
        tracing::error!(node = node.label(), error = %err, "rollback failed");
    }
}

/// Runs a complete save of `node` and everything below it.
pub(crate) fn save_all<N: Persistable + ?Sized>(
    node: &mut N,
    options: SaveOptions,
) -> CoreResult<bool> {
    if node.is_read_only() {
        return Err(CoreError::read_only(node.label()));
    }
    if node.is_new() && !node.has_changes() {
        return Err(CoreError::empty_new_record(node.label()));
    }
    if !node.has_changes() {
        tracing::debug!(node = node.label(), "nothing to save");
        return Ok(true);
    }

    let connection = node.session().connection(node.resource())?;
    let scope = TransactionScope::open(connection)?;

    match node.before_save_all_internal(options) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(node = node.label(), "save rejected before writing");
            rollback(node, scope);
            node.after_save_all_failed_internal();
            return Ok(false);
        }
        Err(err) => {
            rollback(node, scope);
            node.after_save_all_failed_internal();
            return Err(err);
        }
    }

    match node.save_all_internal(options) {
        Ok(true) => match scope.commit() {
            Ok(()) => {
                node.after_save_all_internal(true);
                Ok(true)
            }
            Err(err) => {
                tracing::error!(node = node.label(), error = %err, "commit failed");
                let error = ActionError::new(node.label(), format!("commit failed: {err}"));
                node.sink_mut().error(error);
                node.after_save_all_failed_internal();
                Ok(false)
            }
        },
        Ok(false) => {
            tracing::debug!(node = node.label(), "save failed, rolling back");
            rollback(node, scope);
            node.after_save_all_failed_internal();
            Ok(false)
        }
        Err(err) => {
            rollback(node, scope);
            node.after_save_all_failed_internal();
            Err(err)
        }
    }
}

/// Runs a complete delete of `node` and its cascaded relations.
pub(crate) fn delete_full<N: Persistable + ?Sized>(node: &mut N) -> CoreResult<bool> {
    if node.is_read_only() {
        return Err(CoreError::read_only(node.label()));
    }
    if !node.can_delete() {
        return Err(CoreError::delete_forbidden(node.label()));
    }
    if node.is_new() {
        tracing::debug!(node = node.label(), "nothing stored, nothing to delete");
        return Ok(true);
    }

    let connection = node.session().connection(node.resource())?;
    let scope = TransactionScope::open(connection)?;

    match node.before_delete_full_internal() {
        Ok(true) => {}
        Ok(false) => {
            rollback(node, scope);
            node.after_delete_full_failed_internal();
            return Ok(false);
        }
        Err(err) => {
            rollback(node, scope);
            node.after_delete_full_failed_internal();
            return Err(err);
        }
    }

    match node.delete_full_internal() {
        Ok(true) => match scope.commit() {
            Ok(()) => {
                node.after_delete_full_internal();
                Ok(true)
            }
            Err(err) => {
                tracing::error!(node = node.label(), error = %err, "commit failed");
                let error = ActionError::new(node.label(), format!("commit failed: {err}"));
                node.sink_mut().error(error);
                node.after_delete_full_failed_internal();
                Ok(false)
            }
        },
        Ok(false) => {
            tracing::debug!(node = node.label(), "delete failed, rolling back");
            rollback(node, scope);
            node.after_delete_full_failed_internal();
            Ok(false)
        }
        Err(err) => {
            rollback(node, scope);
            node.after_delete_full_failed_internal();
            Err(err)
        }
    }
}
