use rusqlite::Connection;

use crate::core::engine::{release_dependents, repair_before_delete};
use crate::db::{section_repo, task_repo};
use crate::error::{CasError, Result};
use crate::id::{SectionId, TaskId};
use crate::types::{
    BlockEntry, BlockedBy, BlockedView, CreateProjectInput, CreateRoutineInput,
    CreateSubtaskInput, Project, ProjectFilter, Routine, RoutineFilter, Section, Subtask,
    SubtaskFilter, TaskKind, TaskState, UpdateRoutineInput, UpdateTaskInput,
};

pub const ONE_OFF_TITLE: &str = "One-Off Tasks";

pub struct TaskService<'a> {
    conn: &'a Connection,
}

impl<'a> TaskService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ============ Projects ============

    pub fn create_project(&self, input: &CreateProjectInput) -> Result<Project> {
        let project = task_repo::create_project(self.conn, input, false)?;
        tracing::info!(id = %project.id, "project created");
        Ok(project)
    }

    pub fn get_project(&self, id: &TaskId) -> Result<Project> {
        task_repo::get_project(self.conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))
    }

    pub fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        task_repo::list_projects(self.conn, filter)
    }

    pub fn update_project(&self, id: &TaskId, input: &UpdateTaskInput) -> Result<Project> {
        self.require(TaskKind::Project, id)?;
        task_repo::update_project(self.conn, id, input)
    }

    /// Delete a project and its subtasks.
    ///
    /// Surviving subtasks lose any `task_block` on the doomed subtasks, and
    /// projects blocked by this one are released, before the rows go.
    pub fn delete_project(&self, id: &TaskId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let project =
            task_repo::get_project(&tx, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))?;
        if project.is_one_off {
            return Err(CasError::ProtectedProject);
        }

        let store: &Connection = &tx;
        let children = task_repo::list_child_nodes(store, id)?;
        for child in &children {
            release_dependents(store, TaskKind::Subtask, &child.id)?;
        }
        repair_before_delete(store, TaskKind::Project, id)?;
        task_repo::delete_task(store, TaskKind::Project, id)?;
        tx.commit()?;

        tracing::info!(%id, subtasks = children.len(), "project deleted");
        Ok(())
    }

    /// The project that collects stray subtasks, created on first use.
    pub fn get_or_create_one_off(&self) -> Result<Project> {
        let tx = self.conn.unchecked_transaction()?;
        let project = match task_repo::find_one_off_project(&tx)? {
            Some(project) => project,
            None => {
                let input = CreateProjectInput {
                    title: ONE_OFF_TITLE.to_string(),
                    ..Default::default()
                };
                let project = task_repo::create_project(&tx, &input, true)?;
                tracing::info!(id = %project.id, "one-off project created");
                project
            }
        };
        tx.commit()?;
        Ok(project)
    }

    // ============ Subtasks ============

    /// A subtask under an inactive project starts out blocked by it.
    pub fn create_subtask(&self, input: &CreateSubtaskInput) -> Result<Subtask> {
        let tx = self.conn.unchecked_transaction()?;
        let parent = task_repo::get_node(&tx, TaskKind::Project, &input.parent_id)?
            .ok_or_else(|| CasError::ParentNotFound(input.parent_id.clone()))?;

        let mut blocked_by = BlockedBy::new();
        let state = if parent.state == TaskState::Active {
            TaskState::Waiting
        } else {
            blocked_by.insert(BlockEntry::parent(parent.id.clone()));
            TaskState::Blocked
        };

        let subtask = task_repo::create_subtask(&tx, input, state, &blocked_by)?;
        tx.commit()?;

        tracing::info!(id = %subtask.id, parent = %subtask.parent_id, state = %subtask.state, "subtask created");
        Ok(subtask)
    }

    pub fn get_subtask(&self, id: &TaskId) -> Result<Subtask> {
        task_repo::get_subtask(self.conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))
    }

    pub fn list_subtasks(&self, filter: &SubtaskFilter) -> Result<Vec<Subtask>> {
        if let Some(ref parent_id) = filter.parent_id {
            if !task_repo::task_exists(self.conn, TaskKind::Project, parent_id)? {
                return Err(CasError::ParentNotFound(parent_id.clone()));
            }
        }
        task_repo::list_subtasks(self.conn, filter)
    }

    pub fn update_subtask(&self, id: &TaskId, input: &UpdateTaskInput) -> Result<Subtask> {
        self.require(TaskKind::Subtask, id)?;
        task_repo::update_subtask(self.conn, id, input)
    }

    pub fn delete_subtask(&self, id: &TaskId) -> Result<()> {
        self.delete_task(TaskKind::Subtask, id)
    }

    // ============ Routines ============

    pub fn create_routine(&self, input: &CreateRoutineInput) -> Result<Routine> {
        if let Some(ref section_id) = input.section_id {
            self.require_section(section_id)?;
        }
        let routine = task_repo::create_routine(self.conn, input)?;
        tracing::info!(id = %routine.id, "routine created");
        Ok(routine)
    }

    pub fn get_routine(&self, id: &TaskId) -> Result<Routine> {
        task_repo::get_routine(self.conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))
    }

    pub fn list_routines(&self, filter: &RoutineFilter) -> Result<Vec<Routine>> {
        task_repo::list_routines(self.conn, filter)
    }

    pub fn update_routine(&self, id: &TaskId, input: &UpdateRoutineInput) -> Result<Routine> {
        self.require(TaskKind::Routine, id)?;
        if let (false, Some(section_id)) = (input.clear_section, input.section_id.as_ref()) {
            self.require_section(section_id)?;
        }
        task_repo::update_routine(self.conn, id, input)
    }

    pub fn delete_routine(&self, id: &TaskId) -> Result<()> {
        self.delete_task(TaskKind::Routine, id)
    }

    // ============ Sections ============

    pub fn create_section(&self, name: &str, order: Option<i64>) -> Result<Section> {
        let section = section_repo::create_section(self.conn, name, order)?;
        tracing::info!(id = %section.id, "section created");
        Ok(section)
    }

    pub fn list_sections(&self) -> Result<Vec<Section>> {
        section_repo::list_sections(self.conn)
    }

    pub fn update_section(
        &self,
        id: &SectionId,
        name: Option<&str>,
        order: Option<i64>,
    ) -> Result<Section> {
        self.require_section(id)?;
        section_repo::update_section(self.conn, id, name, order)
    }

    /// Routines in the section survive with no section.
    pub fn delete_section(&self, id: &SectionId) -> Result<()> {
        self.require_section(id)?;
        section_repo::delete_section(self.conn, id)?;
        tracing::info!(%id, "section deleted");
        Ok(())
    }

    // ============ Views ============

    pub fn blocked(&self) -> Result<BlockedView> {
        Ok(BlockedView {
            projects: task_repo::list_projects(
                self.conn,
                &ProjectFilter {
                    state: Some(TaskState::Blocked),
                    ..Default::default()
                },
            )?,
            subtasks: task_repo::list_subtasks(
                self.conn,
                &SubtaskFilter {
                    state: Some(TaskState::Blocked),
                    ..Default::default()
                },
            )?,
            routines: task_repo::list_routines(
                self.conn,
                &RoutineFilter {
                    state: Some(TaskState::Blocked),
                    ..Default::default()
                },
            )?,
        })
    }

    fn delete_task(&self, kind: TaskKind, id: &TaskId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let store: &Connection = &tx;
        if !task_repo::task_exists(store, kind, id)? {
            return Err(CasError::TaskNotFound(id.clone()));
        }
        repair_before_delete(store, kind, id)?;
        task_repo::delete_task(store, kind, id)?;
        tx.commit()?;

        tracing::info!(%id, kind = kind.as_str(), "task deleted");
        Ok(())
    }

    fn require(&self, kind: TaskKind, id: &TaskId) -> Result<()> {
        if task_repo::task_exists(self.conn, kind, id)? {
            Ok(())
        } else {
            Err(CasError::TaskNotFound(id.clone()))
        }
    }

    fn require_section(&self, id: &SectionId) -> Result<()> {
        if section_repo::section_exists(self.conn, id)? {
            Ok(())
        } else {
            Err(CasError::SectionNotFound(id.clone()))
        }
    }
}
