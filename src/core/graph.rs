//! Blocker graph: the storage seam the engine runs against, and cycle
//! detection over `task_block` edges.

use std::collections::{HashSet, VecDeque};

use rusqlite::Connection;

use crate::db::task_repo;
use crate::error::Result;
use crate::id::TaskId;
use crate::types::{BlockNode, TaskKind};

/// Per-kind access to task state and blockers.
///
/// Every call made during one engine operation must go through the same
/// transaction.
pub trait TaskStore {
    fn find_node(&self, kind: TaskKind, id: &TaskId) -> Result<Option<BlockNode>>;

    /// Tasks of `kind` that hold a `task_block` on `blocker_id`
    fn find_blocked_by(&self, kind: TaskKind, blocker_id: &TaskId) -> Result<Vec<BlockNode>>;

    /// Subtasks owned by `project_id`
    fn find_children(&self, project_id: &TaskId) -> Result<Vec<BlockNode>>;

    fn update_node(&self, kind: TaskKind, node: &BlockNode) -> Result<()>;
}

impl TaskStore for Connection {
    fn find_node(&self, kind: TaskKind, id: &TaskId) -> Result<Option<BlockNode>> {
        task_repo::get_node(self, kind, id)
    }

    fn find_blocked_by(&self, kind: TaskKind, blocker_id: &TaskId) -> Result<Vec<BlockNode>> {
        task_repo::list_nodes_blocked_by(self, kind, blocker_id)
    }

    fn find_children(&self, project_id: &TaskId) -> Result<Vec<BlockNode>> {
        task_repo::list_child_nodes(self, project_id)
    }

    fn update_node(&self, kind: TaskKind, node: &BlockNode) -> Result<()> {
        task_repo::update_node(self, kind, node)
    }
}

/// Would "`blocker_id` blocks `target_id`" close a loop?
///
/// Walks breadth-first from the blocker through what blocks it. Reaching the
/// target means the target already transitively blocks the blocker. Missing
/// tasks are dead ends.
pub fn would_create_cycle<S: TaskStore + ?Sized>(
    store: &S,
    target_id: &TaskId,
    blocker_id: &TaskId,
    kind: TaskKind,
) -> Result<bool> {
    if target_id == blocker_id {
        return Ok(true);
    }

    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut queue: VecDeque<TaskId> = VecDeque::new();
    queue.push_back(blocker_id.clone());

    while let Some(current) = queue.pop_front() {
        if &current == target_id {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }

        let Some(node) = store.find_node(kind, &current)? else {
            continue;
        };

        for next in node.blocked_by.task_blocks() {
            if !visited.contains(next) {
                queue.push_back(next.clone());
            }
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemStore;
    use crate::types::TaskState;

    #[test]
    fn self_edge_is_a_cycle() {
        let store = MemStore::default();
        let a = store.add(TaskKind::Routine, TaskState::Waiting);
        assert!(would_create_cycle(&store, &a, &a, TaskKind::Routine).unwrap());
    }

    #[test]
    fn direct_reverse_edge_is_a_cycle() {
        let store = MemStore::default();
        let x = store.add(TaskKind::Subtask, TaskState::Waiting);
        let y = store.add(TaskKind::Subtask, TaskState::Waiting);
        store.block(TaskKind::Subtask, &x, &y); // y blocks x

        assert!(would_create_cycle(&store, &y, &x, TaskKind::Subtask).unwrap());
        assert!(!would_create_cycle(&store, &x, &y, TaskKind::Subtask).unwrap());
    }

    #[test]
    fn transitive_chain_is_a_cycle() {
        let store = MemStore::default();
        let a = store.add(TaskKind::Project, TaskState::Waiting);
        let b = store.add(TaskKind::Project, TaskState::Waiting);
        let c = store.add(TaskKind::Project, TaskState::Waiting);
        store.block(TaskKind::Project, &a, &b); // b blocks a
        store.block(TaskKind::Project, &b, &c); // c blocks b

        // a blocks c would close a -> b -> c -> a
        assert!(would_create_cycle(&store, &c, &a, TaskKind::Project).unwrap());
    }

    #[test]
    fn diamond_without_cycle() {
        let store = MemStore::default();
        let top = store.add(TaskKind::Project, TaskState::Waiting);
        let left = store.add(TaskKind::Project, TaskState::Waiting);
        let right = store.add(TaskKind::Project, TaskState::Waiting);
        let bottom = store.add(TaskKind::Project, TaskState::Waiting);
        store.block(TaskKind::Project, &top, &left);
        store.block(TaskKind::Project, &top, &right);
        store.block(TaskKind::Project, &left, &bottom);
        store.block(TaskKind::Project, &right, &bottom);

        let fresh = store.add(TaskKind::Project, TaskState::Waiting);
        assert!(!would_create_cycle(&store, &fresh, &top, TaskKind::Project).unwrap());
        assert!(would_create_cycle(&store, &bottom, &top, TaskKind::Project).unwrap());
    }

    #[test]
    fn missing_nodes_are_dead_ends() {
        let store = MemStore::default();
        let a = store.add(TaskKind::Routine, TaskState::Waiting);
        let ghost = TaskId::new(TaskKind::Routine);
        store.block(TaskKind::Routine, &a, &ghost);

        let b = store.add(TaskKind::Routine, TaskState::Waiting);
        assert!(!would_create_cycle(&store, &b, &a, TaskKind::Routine).unwrap());
    }

    #[test]
    fn parent_blocks_are_not_followed() {
        let store = MemStore::default();
        let project = TaskId::new(TaskKind::Project);
        let child = store.add(TaskKind::Subtask, TaskState::Waiting);
        store.parent_block(&child, &project);

        let other = store.add(TaskKind::Subtask, TaskState::Waiting);
        assert!(!would_create_cycle(&store, &other, &child, TaskKind::Subtask).unwrap());
    }

    #[test]
    fn graphs_are_partitioned_by_kind() {
        let store = MemStore::default();
        let x = store.add(TaskKind::Subtask, TaskState::Waiting);
        let y = store.add(TaskKind::Subtask, TaskState::Waiting);
        store.block(TaskKind::Subtask, &x, &y);

        // Same ids looked up in the routine table find nothing
        assert!(!would_create_cycle(&store, &y, &x, TaskKind::Routine).unwrap());
    }
}
