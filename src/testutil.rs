//! Test fixtures: an initialised in-memory database and an in-memory
//! `TaskStore` for exercising the engine without SQL.

use std::cell::RefCell;
use std::collections::HashMap;

use rusqlite::Connection;

use crate::core::graph::TaskStore;
use crate::db::schema;
use crate::error::Result;
use crate::id::TaskId;
use crate::types::{BlockEntry, BlockNode, BlockedBy, TaskKind, TaskState};

pub fn setup_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    schema::init_schema(&conn).unwrap();
    conn
}

/// Blocker graph held in maps. Subtask ownership is tracked separately.
#[derive(Default)]
pub struct MemStore {
    nodes: RefCell<HashMap<(TaskKind, TaskId), BlockNode>>,
    parents: RefCell<HashMap<TaskId, TaskId>>,
}

impl MemStore {
    pub fn add(&self, kind: TaskKind, state: TaskState) -> TaskId {
        let id = TaskId::new(kind);
        self.nodes.borrow_mut().insert(
            (kind, id.clone()),
            BlockNode {
                id: id.clone(),
                state,
                blocked_by: BlockedBy::new(),
            },
        );
        id
    }

    pub fn add_child(&self, project_id: &TaskId, state: TaskState) -> TaskId {
        let id = self.add(TaskKind::Subtask, state);
        self.parents
            .borrow_mut()
            .insert(id.clone(), project_id.clone());
        id
    }

    /// Record "`blocker` blocks `target`" and mark the target BLOCKED.
    pub fn block(&self, kind: TaskKind, target: &TaskId, blocker: &TaskId) {
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes.get_mut(&(kind, target.clone())).unwrap();
        node.blocked_by.insert(BlockEntry::task(blocker.clone()));
        node.state = TaskState::Blocked;
    }

    pub fn parent_block(&self, child: &TaskId, project_id: &TaskId) {
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes.get_mut(&(TaskKind::Subtask, child.clone())).unwrap();
        node.blocked_by.insert(BlockEntry::parent(project_id.clone()));
        node.state = TaskState::Blocked;
    }

    pub fn set_state(&self, kind: TaskKind, id: &TaskId, state: TaskState) {
        self.nodes
            .borrow_mut()
            .get_mut(&(kind, id.clone()))
            .unwrap()
            .state = state;
    }

    pub fn node(&self, kind: TaskKind, id: &TaskId) -> BlockNode {
        self.nodes.borrow()[&(kind, id.clone())].clone()
    }
}

impl TaskStore for MemStore {
    fn find_node(&self, kind: TaskKind, id: &TaskId) -> Result<Option<BlockNode>> {
        Ok(self.nodes.borrow().get(&(kind, id.clone())).cloned())
    }

    fn find_blocked_by(&self, kind: TaskKind, blocker_id: &TaskId) -> Result<Vec<BlockNode>> {
        let mut found: Vec<BlockNode> = self
            .nodes
            .borrow()
            .iter()
            .filter(|((k, _), node)| *k == kind && node.blocked_by.has_task_block(blocker_id))
            .map(|(_, node)| node.clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    fn find_children(&self, project_id: &TaskId) -> Result<Vec<BlockNode>> {
        let parents = self.parents.borrow();
        let nodes = self.nodes.borrow();
        let mut children: Vec<BlockNode> = parents
            .iter()
            .filter(|(_, parent)| *parent == project_id)
            .filter_map(|(child, _)| nodes.get(&(TaskKind::Subtask, child.clone())).cloned())
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(children)
    }

    fn update_node(&self, kind: TaskKind, node: &BlockNode) -> Result<()> {
        self.nodes
            .borrow_mut()
            .insert((kind, node.id.clone()), node.clone());
        Ok(())
    }
}
