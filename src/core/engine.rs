//! Cascading state engine.
//!
//! Public methods on [`StateEngine`] each run inside one SQLite transaction.
//! The cascade steps are free functions over [`TaskStore`] so callers that
//! already hold a transaction (task deletion) can reuse them.

use rusqlite::Connection;

use crate::core::graph::{would_create_cycle, TaskStore};
use crate::core::state::{blocked_state, derive_state, is_valid_transition, state_after_release};
use crate::db::task_repo;
use crate::error::{CasError, Result};
use crate::id::TaskId;
use crate::types::{BlockEntry, BlockNode, Subtask, TaskKind, TaskState};

pub struct StateEngine<'a> {
    conn: &'a Connection,
}

impl<'a> StateEngine<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn would_create_cycle(
        &self,
        target_id: &TaskId,
        blocker_id: &TaskId,
        kind: TaskKind,
    ) -> Result<bool> {
        would_create_cycle(self.conn, target_id, blocker_id, kind)
    }

    /// Record that `blocker_id` blocks `target_id`. Idempotent.
    pub fn add_blocker(
        &self,
        target_id: &TaskId,
        blocker_id: &TaskId,
        kind: TaskKind,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        add_task_block(&*tx, kind, target_id, blocker_id)?;
        tx.commit()?;
        Ok(())
    }

    pub fn remove_blocker(
        &self,
        target_id: &TaskId,
        blocker_id: &TaskId,
        kind: TaskKind,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        remove_task_block(&*tx, kind, target_id, blocker_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Change a project's state, blocking or releasing its subtasks when it
    /// leaves or enters ACTIVE.
    pub fn change_project_state(&self, id: &TaskId, new_state: TaskState) -> Result<TaskState> {
        self.change_state(TaskKind::Project, id, new_state)
    }

    pub fn change_subtask_state(&self, id: &TaskId, new_state: TaskState) -> Result<TaskState> {
        self.change_state(TaskKind::Subtask, id, new_state)
    }

    pub fn change_routine_state(&self, id: &TaskId, new_state: TaskState) -> Result<TaskState> {
        self.change_state(TaskKind::Routine, id, new_state)
    }

    /// Returns the state actually persisted, which may differ from the
    /// request when blockers are outstanding.
    pub fn change_state(
        &self,
        kind: TaskKind,
        id: &TaskId,
        new_state: TaskState,
    ) -> Result<TaskState> {
        let tx = self.conn.unchecked_transaction()?;
        let actual = apply_state_change(&*tx, kind, id, new_state)?;
        tx.commit()?;
        Ok(actual)
    }

    /// Strip a completed task from its dependents' blocker sets.
    pub fn cascade_on_complete(&self, id: &TaskId, kind: TaskKind) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        release_dependents(&*tx, kind, id)?;
        tx.commit()?;
        Ok(())
    }

    /// Repair every reference to a task about to be deleted. The row itself
    /// is left for the caller to remove.
    pub fn cascade_on_delete(&self, id: &TaskId, kind: TaskKind) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        repair_before_delete(&*tx, kind, id)?;
        tx.commit()?;
        Ok(())
    }

    /// Re-parent a subtask, swapping its `parent_block` for one on the new
    /// parent when that parent is not ACTIVE.
    pub fn move_subtask(&self, id: &TaskId, new_parent_id: &TaskId) -> Result<Subtask> {
        let tx = self.conn.unchecked_transaction()?;
        let moved = move_subtask_in(&tx, id, new_parent_id)?;
        tx.commit()?;
        Ok(moved)
    }
}

pub(crate) fn apply_state_change<S: TaskStore + ?Sized>(
    store: &S,
    kind: TaskKind,
    id: &TaskId,
    new_state: TaskState,
) -> Result<TaskState> {
    let node = store
        .find_node(kind, id)?
        .ok_or_else(|| CasError::TaskNotFound(id.clone()))?;

    let previous = node.state;
    if !is_valid_transition(previous, new_state) {
        return Err(CasError::InvalidTransition {
            from: previous,
            to: new_state,
        });
    }

    let actual = derive_state(&node.blocked_by, new_state);
    store.update_node(
        kind,
        &BlockNode {
            state: actual,
            ..node
        },
    )?;
    tracing::info!(%id, kind = kind.as_str(), from = %previous, requested = %new_state, %actual, "state changed");

    if kind == TaskKind::Project {
        let was_active = previous == TaskState::Active;
        let is_active = actual == TaskState::Active;
        if was_active && !is_active {
            block_children(store, id)?;
        } else if !was_active && is_active {
            release_children(store, id)?;
        }
    }

    if actual == TaskState::Done {
        release_dependents(store, kind, id)?;
    }

    Ok(actual)
}

pub(crate) fn add_task_block<S: TaskStore + ?Sized>(
    store: &S,
    kind: TaskKind,
    target_id: &TaskId,
    blocker_id: &TaskId,
) -> Result<()> {
    let mut node = store
        .find_node(kind, target_id)?
        .ok_or_else(|| CasError::TaskNotFound(target_id.clone()))?;

    // Blocking never crosses kinds
    if blocker_id.kind() != Some(kind) {
        return Err(CasError::KindMismatch {
            id: blocker_id.clone(),
            expected: kind,
        });
    }
    let blocker = store
        .find_node(kind, blocker_id)?
        .ok_or_else(|| CasError::BlockerNotFound(blocker_id.clone()))?;
    // Nothing would ever release a block on a finished task
    if blocker.state == TaskState::Done {
        return Err(CasError::BlockerDone(blocker_id.clone()));
    }

    if would_create_cycle(store, target_id, blocker_id, kind)? {
        return Err(CasError::CyclicDependency {
            task_id: target_id.clone(),
            blocker_id: blocker_id.clone(),
        });
    }

    if !node.blocked_by.insert(BlockEntry::task(blocker_id.clone())) {
        return Ok(());
    }

    // Any blocker blocks, even a task already DONE
    node.state = TaskState::Blocked;
    store.update_node(kind, &node)?;
    tracing::debug!(task = %target_id, blocker = %blocker_id, "blocker added");
    Ok(())
}

pub(crate) fn remove_task_block<S: TaskStore + ?Sized>(
    store: &S,
    kind: TaskKind,
    target_id: &TaskId,
    blocker_id: &TaskId,
) -> Result<()> {
    let mut node = store
        .find_node(kind, target_id)?
        .ok_or_else(|| CasError::TaskNotFound(target_id.clone()))?;

    if !node.blocked_by.remove_task_block(blocker_id) {
        return Ok(());
    }

    node.state = state_after_release(node.state, &node.blocked_by);
    store.update_node(kind, &node)?;
    tracing::debug!(task = %target_id, blocker = %blocker_id, state = %node.state, "blocker removed");
    Ok(())
}

/// Remove `released_id` from every same-kind task's `task_block` entries.
pub(crate) fn release_dependents<S: TaskStore + ?Sized>(
    store: &S,
    kind: TaskKind,
    released_id: &TaskId,
) -> Result<usize> {
    let dependents = store.find_blocked_by(kind, released_id)?;
    for mut node in dependents.iter().cloned() {
        node.blocked_by.remove_task_block(released_id);
        node.state = state_after_release(node.state, &node.blocked_by);
        store.update_node(kind, &node)?;
    }
    if !dependents.is_empty() {
        tracing::debug!(released = %released_id, count = dependents.len(), "dependents unblocked");
    }
    Ok(dependents.len())
}

/// Project left ACTIVE: every subtask gets a `parent_block` and is BLOCKED.
fn block_children<S: TaskStore + ?Sized>(store: &S, project_id: &TaskId) -> Result<()> {
    let children = store.find_children(project_id)?;
    for mut child in children.iter().cloned() {
        child.blocked_by.insert(BlockEntry::parent(project_id.clone()));
        child.state = TaskState::Blocked;
        store.update_node(TaskKind::Subtask, &child)?;
    }
    tracing::debug!(project = %project_id, count = children.len(), "subtasks blocked by parent");
    Ok(())
}

/// Project entered ACTIVE (or is being deleted): drop its `parent_block`
/// from every subtask.
fn release_children<S: TaskStore + ?Sized>(store: &S, project_id: &TaskId) -> Result<()> {
    let children = store.find_children(project_id)?;
    for mut child in children.iter().cloned() {
        child.blocked_by.remove_parent_block(project_id);
        child.state = blocked_state(&child.blocked_by);
        store.update_node(TaskKind::Subtask, &child)?;
    }
    tracing::debug!(project = %project_id, count = children.len(), "subtasks released by parent");
    Ok(())
}

pub(crate) fn repair_before_delete<S: TaskStore + ?Sized>(
    store: &S,
    kind: TaskKind,
    id: &TaskId,
) -> Result<()> {
    release_dependents(store, kind, id)?;
    if kind == TaskKind::Project {
        release_children(store, id)?;
    }
    Ok(())
}

pub(crate) fn move_subtask_in(
    conn: &Connection,
    id: &TaskId,
    new_parent_id: &TaskId,
) -> Result<Subtask> {
    let subtask =
        task_repo::get_subtask(conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))?;

    if &subtask.parent_id == new_parent_id {
        return Ok(subtask);
    }

    let new_parent = task_repo::get_node(conn, TaskKind::Project, new_parent_id)?
        .ok_or_else(|| CasError::ParentNotFound(new_parent_id.clone()))?;

    let mut blocked_by = subtask.blocked_by.clone();
    blocked_by.clear_parent_blocks();

    let state = if new_parent.state != TaskState::Active {
        blocked_by.insert(BlockEntry::parent(new_parent_id.clone()));
        TaskState::Blocked
    } else if !blocked_by.is_empty() {
        TaskState::Blocked
    } else if subtask.state == TaskState::Blocked {
        TaskState::Waiting
    } else {
        // ACTIVE and DONE survive a move under an active parent
        subtask.state
    };

    task_repo::set_subtask_parent(conn, id, new_parent_id, state, &blocked_by)?;
    tracing::info!(%id, from = %subtask.parent_id, to = %new_parent_id, %state, "subtask moved");

    task_repo::get_subtask(conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemStore;
    use crate::types::BlockedBy;

    use TaskKind::{Project, Routine, Subtask as Sub};
    use TaskState::*;

    #[test]
    fn project_leaving_active_blocks_children() {
        let store = MemStore::default();
        let p = store.add(Project, Active);
        let s = store.add_child(&p, Waiting);

        let actual = apply_state_change(&store, Project, &p, Blocked).unwrap();

        assert_eq!(actual, Blocked);
        let child = store.node(Sub, &s);
        assert_eq!(
            child.blocked_by,
            BlockedBy::from(vec![BlockEntry::parent(p.clone())])
        );
        assert_eq!(child.state, Blocked);
    }

    #[test]
    fn project_reentering_active_releases_children() {
        let store = MemStore::default();
        let p = store.add(Project, Active);
        let s = store.add_child(&p, Waiting);
        apply_state_change(&store, Project, &p, Blocked).unwrap();

        // BLOCKED -> WAITING keeps the project inactive: no cascade
        apply_state_change(&store, Project, &p, Waiting).unwrap();
        assert_eq!(store.node(Sub, &s).state, Blocked);

        apply_state_change(&store, Project, &p, Active).unwrap();
        let child = store.node(Sub, &s);
        assert!(child.blocked_by.is_empty());
        assert_eq!(child.state, Waiting);
    }

    #[test]
    fn release_keeps_other_blockers() {
        let store = MemStore::default();
        let p = store.add(Project, Active);
        let s = store.add_child(&p, Waiting);
        let other = store.add_child(&p, Waiting);
        store.block(Sub, &s, &other);

        apply_state_change(&store, Project, &p, Waiting).unwrap();
        assert_eq!(store.node(Sub, &s).blocked_by.len(), 2);

        apply_state_change(&store, Project, &p, Active).unwrap();
        let child = store.node(Sub, &s);
        assert_eq!(
            child.blocked_by,
            BlockedBy::from(vec![BlockEntry::task(other.clone())])
        );
        assert_eq!(child.state, Blocked);
    }

    #[test]
    fn invalid_transition_leaves_store_untouched() {
        let store = MemStore::default();
        let p = store.add(Project, Done);
        let s = store.add_child(&p, Waiting);

        let err = apply_state_change(&store, Project, &p, Waiting).unwrap_err();
        assert!(matches!(
            err,
            CasError::InvalidTransition {
                from: Done,
                to: Waiting
            }
        ));
        assert_eq!(store.node(Project, &p).state, Done);
        assert_eq!(store.node(Sub, &s).state, Waiting);
    }

    #[test]
    fn blocked_task_cannot_self_activate() {
        let store = MemStore::default();
        let a = store.add(Routine, Waiting);
        let b = store.add(Routine, Waiting);
        store.block(Routine, &a, &b);

        // BLOCKED -> WAITING is allowed but blockers keep it BLOCKED
        let actual = apply_state_change(&store, Routine, &a, Waiting).unwrap();
        assert_eq!(actual, Blocked);
    }

    #[test]
    fn force_complete_overrides_blockers() {
        let store = MemStore::default();
        let a = store.add(Routine, Waiting);
        let b = store.add(Routine, Waiting);
        store.block(Routine, &a, &b);

        let actual = apply_state_change(&store, Routine, &a, Done).unwrap();
        assert_eq!(actual, Done);
        assert_eq!(store.node(Routine, &a).blocked_by.len(), 1);
    }

    #[test]
    fn completion_unblocks_dependents_but_keeps_done() {
        let store = MemStore::default();
        let blocker = store.add(Routine, Active);
        let waiting = store.add(Routine, Waiting);
        let done = store.add(Routine, Waiting);
        let twice = store.add(Routine, Waiting);
        let other = store.add(Routine, Waiting);
        store.block(Routine, &waiting, &blocker);
        store.block(Routine, &done, &blocker);
        store.set_state(Routine, &done, Done);
        store.block(Routine, &twice, &blocker);
        store.block(Routine, &twice, &other);

        apply_state_change(&store, Routine, &blocker, Done).unwrap();

        assert_eq!(store.node(Routine, &waiting).state, Waiting);
        assert!(store.node(Routine, &waiting).blocked_by.is_empty());
        assert_eq!(store.node(Routine, &done).state, Done);
        assert!(store.node(Routine, &done).blocked_by.is_empty());
        assert_eq!(store.node(Routine, &twice).state, Blocked);
        assert_eq!(store.node(Routine, &twice).blocked_by.len(), 1);
    }

    #[test]
    fn add_blocker_is_idempotent() {
        let store = MemStore::default();
        let a = store.add(Sub, Waiting);
        let b = store.add(Sub, Waiting);

        add_task_block(&store, Sub, &a, &b).unwrap();
        let once = store.node(Sub, &a);
        add_task_block(&store, Sub, &a, &b).unwrap();
        assert_eq!(store.node(Sub, &a), once);
        assert_eq!(once.state, Blocked);
    }

    #[test]
    fn add_blocker_reblocks_done_task() {
        let store = MemStore::default();
        let a = store.add(Project, Done);
        let b = store.add(Project, Active);

        add_task_block(&store, Project, &a, &b).unwrap();
        assert_eq!(store.node(Project, &a).state, Blocked);
    }

    #[test]
    fn add_blocker_rejects_done_blocker() {
        let store = MemStore::default();
        let a = store.add(Routine, Waiting);
        let b = store.add(Routine, Done);
        let before = store.node(Routine, &a);

        assert!(matches!(
            add_task_block(&store, Routine, &a, &b),
            Err(CasError::BlockerDone(_))
        ));
        assert_eq!(store.node(Routine, &a), before);
    }

    #[test]
    fn add_blocker_rejects_cycle_without_writing() {
        let store = MemStore::default();
        let x = store.add(Sub, Waiting);
        let y = store.add(Sub, Waiting);
        add_task_block(&store, Sub, &x, &y).unwrap();
        let before = store.node(Sub, &y);

        let err = add_task_block(&store, Sub, &y, &x).unwrap_err();
        assert!(matches!(err, CasError::CyclicDependency { .. }));
        assert_eq!(store.node(Sub, &y), before);
    }

    #[test]
    fn add_blocker_missing_tasks() {
        let store = MemStore::default();
        let a = store.add(Project, Waiting);
        let ghost = TaskId::new(Project);

        assert!(matches!(
            add_task_block(&store, Project, &ghost, &a),
            Err(CasError::TaskNotFound(_))
        ));
        assert!(matches!(
            add_task_block(&store, Project, &a, &ghost),
            Err(CasError::BlockerNotFound(_))
        ));
    }

    #[test]
    fn add_blocker_rejects_other_kind() {
        let store = MemStore::default();
        let sub = store.add(Sub, Waiting);
        let routine = store.add(Routine, Waiting);

        assert!(matches!(
            add_task_block(&store, Sub, &sub, &routine),
            Err(CasError::KindMismatch { expected: Sub, .. })
        ));
        assert!(store.node(Sub, &sub).blocked_by.is_empty());
    }

    #[test]
    fn remove_blocker_round_trip() {
        let store = MemStore::default();
        let a = store.add(Routine, Waiting);
        let b = store.add(Routine, Waiting);
        let before = store.node(Routine, &a);

        add_task_block(&store, Routine, &a, &b).unwrap();
        remove_task_block(&store, Routine, &a, &b).unwrap();

        assert_eq!(store.node(Routine, &a), before);
    }

    #[test]
    fn remove_blocker_never_resurrects_done() {
        let store = MemStore::default();
        let a = store.add(Routine, Waiting);
        let b = store.add(Routine, Waiting);
        add_task_block(&store, Routine, &a, &b).unwrap();
        store.set_state(Routine, &a, Done);

        remove_task_block(&store, Routine, &a, &b).unwrap();
        assert_eq!(store.node(Routine, &a).state, Done);
    }

    #[test]
    fn remove_missing_entry_is_noop() {
        let store = MemStore::default();
        let a = store.add(Routine, Active);
        let b = store.add(Routine, Active);

        remove_task_block(&store, Routine, &a, &b).unwrap();
        assert_eq!(store.node(Routine, &a).state, Active);
    }

    #[test]
    fn delete_project_releases_children() {
        let store = MemStore::default();
        let p = store.add(Project, Active);
        let s = store.add_child(&p, Waiting);
        apply_state_change(&store, Project, &p, Waiting).unwrap();

        repair_before_delete(&store, Project, &p).unwrap();
        let child = store.node(Sub, &s);
        assert!(child.blocked_by.is_empty());
        assert_eq!(child.state, Waiting);
    }

    #[test]
    fn delete_strips_task_blocks() {
        let store = MemStore::default();
        let a = store.add(Project, Waiting);
        let b = store.add(Project, Waiting);
        store.block(Project, &a, &b);

        repair_before_delete(&store, Project, &b).unwrap();
        assert!(store.node(Project, &a).blocked_by.is_empty());
        assert_eq!(store.node(Project, &a).state, Waiting);
    }
}
