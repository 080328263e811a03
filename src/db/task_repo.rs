use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CasError, Result};
use crate::id::TaskId;
use crate::types::{
    BlockNode, BlockedBy, CreateProjectInput, CreateRoutineInput, CreateSubtaskInput, Project,
    ProjectFilter, Routine, RoutineFilter, Subtask, SubtaskFilter, TaskKind, TaskState,
    UpdateRoutineInput, UpdateTaskInput,
};

fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn parse_timestamp(row: &Row, column: &str) -> DateTime<Utc> {
    row.get::<_, String>(column)
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(now)
}

/// Blank optional text is stored as NULL
fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn normalize_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CasError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        emoji: row.get("emoji")?,
        priority: row.get("priority")?,
        state: row.get("state")?,
        blocked_by: row.get("blocked_by")?,
        is_one_off: row.get::<_, i32>("is_one_off")? != 0,
        order: row.get("sort_order")?,
        created_at: parse_timestamp(row, "created_at"),
        updated_at: parse_timestamp(row, "updated_at"),
        subtask_count: None,
    })
}

fn row_to_subtask(row: &Row) -> rusqlite::Result<Subtask> {
    Ok(Subtask {
        id: row.get("id")?,
        parent_id: row.get("parent_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        emoji: row.get("emoji")?,
        priority: row.get("priority")?,
        state: row.get("state")?,
        blocked_by: row.get("blocked_by")?,
        order: row.get("sort_order")?,
        created_at: parse_timestamp(row, "created_at"),
        updated_at: parse_timestamp(row, "updated_at"),
    })
}

fn row_to_routine(row: &Row) -> rusqlite::Result<Routine> {
    Ok(Routine {
        id: row.get("id")?,
        section_id: row.get("section_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        emoji: row.get("emoji")?,
        priority: row.get("priority")?,
        state: row.get("state")?,
        blocked_by: row.get("blocked_by")?,
        interval: row.get("interval")?,
        custom_interval: row.get("custom_interval")?,
        order: row.get("sort_order")?,
        created_at: parse_timestamp(row, "created_at"),
        updated_at: parse_timestamp(row, "updated_at"),
    })
}

fn row_to_node(row: &Row) -> rusqlite::Result<BlockNode> {
    Ok(BlockNode {
        id: row.get("id")?,
        state: row.get("state")?,
        blocked_by: row.get("blocked_by")?,
    })
}

/// Run a filtered SELECT built from `sql` plus boxed parameters.
fn query_filtered<T>(
    conn: &Connection,
    sql: &str,
    params_vec: &[Box<dyn rusqlite::ToSql>],
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

/// Build the SET clause for descriptive fields. `updated_at` is always ?1.
fn push_task_updates(
    input: &UpdateTaskInput,
    updates: &mut Vec<String>,
    params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>,
) -> Result<()> {
    if let Some(ref title) = input.title {
        params_vec.push(Box::new(normalize_title(title)?));
        updates.push(format!("title = ?{}", params_vec.len()));
    }

    if let Some(ref description) = input.description {
        params_vec.push(Box::new(normalize_text(Some(description))));
        updates.push(format!("description = ?{}", params_vec.len()));
    }

    if let Some(ref emoji) = input.emoji {
        params_vec.push(Box::new(normalize_text(Some(emoji))));
        updates.push(format!("emoji = ?{}", params_vec.len()));
    }

    if let Some(priority) = input.priority {
        params_vec.push(Box::new(priority));
        updates.push(format!("priority = ?{}", params_vec.len()));
    }

    if let Some(order) = input.order {
        params_vec.push(Box::new(order));
        updates.push(format!("sort_order = ?{}", params_vec.len()));
    }

    Ok(())
}

fn execute_update(
    conn: &Connection,
    table: &str,
    id: &TaskId,
    updates: Vec<String>,
    mut params_vec: Vec<Box<dyn rusqlite::ToSql>>,
) -> Result<()> {
    params_vec.push(Box::new(id.clone()));
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table,
        updates.join(", "),
        params_vec.len()
    );
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    conn.execute(&sql, params_refs.as_slice())?;
    Ok(())
}

// ============ Projects ============

pub fn create_project(
    conn: &Connection,
    input: &CreateProjectInput,
    is_one_off: bool,
) -> Result<Project> {
    let id = TaskId::new(TaskKind::Project);
    let title = normalize_title(&input.title)?;
    let now_str = now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO projects (id, title, description, emoji, priority, state, blocked_by,
                              is_one_off, sort_order, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        "#,
        params![
            &id,
            title,
            normalize_text(input.description.as_deref()),
            normalize_text(input.emoji.as_deref()),
            input.priority,
            TaskState::Active,
            BlockedBy::new(),
            is_one_off as i32,
            input.order.unwrap_or(0),
            now_str,
        ],
    )?;

    get_project(conn, &id)?.ok_or(CasError::TaskNotFound(id))
}

pub fn get_project(conn: &Connection, id: &TaskId) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT * FROM projects WHERE id = ?1",
            params![id],
            row_to_project,
        )
        .optional()?;

    match project {
        Some(mut project) => {
            project.subtask_count = Some(count_subtasks(conn, id)?);
            Ok(Some(project))
        }
        None => Ok(None),
    }
}

pub fn list_projects(conn: &Connection, filter: &ProjectFilter) -> Result<Vec<Project>> {
    let mut sql = String::from("SELECT * FROM projects WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(state) = filter.state {
        params_vec.push(Box::new(state));
        sql.push_str(&format!(" AND state = ?{}", params_vec.len()));
    }

    if let Some(priority) = filter.priority {
        params_vec.push(Box::new(priority));
        sql.push_str(&format!(" AND priority = ?{}", params_vec.len()));
    }

    sql.push_str(" ORDER BY sort_order ASC, created_at ASC, id ASC");

    let mut projects = query_filtered(conn, &sql, &params_vec, row_to_project)?;
    for project in &mut projects {
        project.subtask_count = Some(count_subtasks(conn, &project.id)?);
    }
    Ok(projects)
}

pub fn find_one_off_project(conn: &Connection) -> Result<Option<Project>> {
    let id: Option<TaskId> = conn
        .query_row(
            "SELECT id FROM projects WHERE is_one_off = 1 LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match id {
        Some(id) => get_project(conn, &id),
        None => Ok(None),
    }
}

pub fn update_project(conn: &Connection, id: &TaskId, input: &UpdateTaskInput) -> Result<Project> {
    let mut updates = vec!["updated_at = ?1".to_string()];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now().to_rfc3339())];
    push_task_updates(input, &mut updates, &mut params_vec)?;
    execute_update(conn, "projects", id, updates, params_vec)?;

    get_project(conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))
}

fn count_subtasks(conn: &Connection, project_id: &TaskId) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM subtasks WHERE parent_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Subtasks ============

/// Insert a subtask with a state and blocker set already derived by the caller.
pub fn create_subtask(
    conn: &Connection,
    input: &CreateSubtaskInput,
    state: TaskState,
    blocked_by: &BlockedBy,
) -> Result<Subtask> {
    let id = TaskId::new(TaskKind::Subtask);
    let title = normalize_title(&input.title)?;
    let now_str = now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO subtasks (id, parent_id, title, description, emoji, priority, state,
                              blocked_by, sort_order, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        "#,
        params![
            &id,
            &input.parent_id,
            title,
            normalize_text(input.description.as_deref()),
            normalize_text(input.emoji.as_deref()),
            input.priority,
            state,
            blocked_by,
            input.order.unwrap_or(0),
            now_str,
        ],
    )?;

    get_subtask(conn, &id)?.ok_or(CasError::TaskNotFound(id))
}

pub fn get_subtask(conn: &Connection, id: &TaskId) -> Result<Option<Subtask>> {
    let subtask = conn
        .query_row(
            "SELECT * FROM subtasks WHERE id = ?1",
            params![id],
            row_to_subtask,
        )
        .optional()?;
    Ok(subtask)
}

pub fn list_subtasks(conn: &Connection, filter: &SubtaskFilter) -> Result<Vec<Subtask>> {
    let mut sql = String::from("SELECT * FROM subtasks WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref parent_id) = filter.parent_id {
        params_vec.push(Box::new(parent_id.clone()));
        sql.push_str(&format!(" AND parent_id = ?{}", params_vec.len()));
    }

    if let Some(state) = filter.state {
        params_vec.push(Box::new(state));
        sql.push_str(&format!(" AND state = ?{}", params_vec.len()));
    }

    if let Some(priority) = filter.priority {
        params_vec.push(Box::new(priority));
        sql.push_str(&format!(" AND priority = ?{}", params_vec.len()));
    }

    sql.push_str(" ORDER BY sort_order ASC, created_at ASC, id ASC");
    query_filtered(conn, &sql, &params_vec, row_to_subtask)
}

pub fn update_subtask(conn: &Connection, id: &TaskId, input: &UpdateTaskInput) -> Result<Subtask> {
    let mut updates = vec!["updated_at = ?1".to_string()];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now().to_rfc3339())];
    push_task_updates(input, &mut updates, &mut params_vec)?;
    execute_update(conn, "subtasks", id, updates, params_vec)?;

    get_subtask(conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))
}

/// Re-parent a subtask, writing parent, state and blockers together.
pub fn set_subtask_parent(
    conn: &Connection,
    id: &TaskId,
    parent_id: &TaskId,
    state: TaskState,
    blocked_by: &BlockedBy,
) -> Result<()> {
    conn.execute(
        "UPDATE subtasks SET parent_id = ?1, state = ?2, blocked_by = ?3, updated_at = ?4 WHERE id = ?5",
        params![parent_id, state, blocked_by, now().to_rfc3339(), id],
    )?;
    Ok(())
}

// ============ Routines ============

pub fn create_routine(conn: &Connection, input: &CreateRoutineInput) -> Result<Routine> {
    let id = TaskId::new(TaskKind::Routine);
    let title = normalize_title(&input.title)?;
    let now_str = now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO routines (id, section_id, title, description, emoji, priority, state,
                              blocked_by, interval, custom_interval, sort_order,
                              created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
        "#,
        params![
            &id,
            input.section_id.as_ref(),
            title,
            normalize_text(input.description.as_deref()),
            normalize_text(input.emoji.as_deref()),
            input.priority,
            TaskState::Active,
            BlockedBy::new(),
            input.interval,
            normalize_text(input.custom_interval.as_deref()),
            input.order.unwrap_or(0),
            now_str,
        ],
    )?;

    get_routine(conn, &id)?.ok_or(CasError::TaskNotFound(id))
}

pub fn get_routine(conn: &Connection, id: &TaskId) -> Result<Option<Routine>> {
    let routine = conn
        .query_row(
            "SELECT * FROM routines WHERE id = ?1",
            params![id],
            row_to_routine,
        )
        .optional()?;
    Ok(routine)
}

pub fn list_routines(conn: &Connection, filter: &RoutineFilter) -> Result<Vec<Routine>> {
    let mut sql = String::from("SELECT * FROM routines WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref section_id) = filter.section_id {
        params_vec.push(Box::new(section_id.clone()));
        sql.push_str(&format!(" AND section_id = ?{}", params_vec.len()));
    }

    if let Some(state) = filter.state {
        params_vec.push(Box::new(state));
        sql.push_str(&format!(" AND state = ?{}", params_vec.len()));
    }

    if let Some(interval) = filter.interval {
        params_vec.push(Box::new(interval));
        sql.push_str(&format!(" AND interval = ?{}", params_vec.len()));
    }

    sql.push_str(" ORDER BY sort_order ASC, created_at ASC, id ASC");
    query_filtered(conn, &sql, &params_vec, row_to_routine)
}

pub fn update_routine(
    conn: &Connection,
    id: &TaskId,
    input: &UpdateRoutineInput,
) -> Result<Routine> {
    let mut updates = vec!["updated_at = ?1".to_string()];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now().to_rfc3339())];
    push_task_updates(&input.task, &mut updates, &mut params_vec)?;

    if let Some(interval) = input.interval {
        params_vec.push(Box::new(interval));
        updates.push(format!("interval = ?{}", params_vec.len()));
    }

    if let Some(ref custom) = input.custom_interval {
        params_vec.push(Box::new(normalize_text(Some(custom))));
        updates.push(format!("custom_interval = ?{}", params_vec.len()));
    }

    if input.clear_section {
        updates.push("section_id = NULL".to_string());
    } else if let Some(ref section_id) = input.section_id {
        params_vec.push(Box::new(section_id.clone()));
        updates.push(format!("section_id = ?{}", params_vec.len()));
    }

    execute_update(conn, "routines", id, updates, params_vec)?;

    get_routine(conn, id)?.ok_or_else(|| CasError::TaskNotFound(id.clone()))
}

// ============ Shared ============

pub fn delete_task(conn: &Connection, kind: TaskKind, id: &TaskId) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
        params![id],
    )?;
    Ok(())
}

pub fn task_exists(conn: &Connection, kind: TaskKind, id: &TaskId) -> Result<bool> {
    let count: i32 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", kind.table()),
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_node(conn: &Connection, kind: TaskKind, id: &TaskId) -> Result<Option<BlockNode>> {
    let node = conn
        .query_row(
            &format!(
                "SELECT id, state, blocked_by FROM {} WHERE id = ?1",
                kind.table()
            ),
            params![id],
            row_to_node,
        )
        .optional()?;
    Ok(node)
}

/// Tasks of `kind` holding a `task_block` on `blocker_id`.
pub fn list_nodes_blocked_by(
    conn: &Connection,
    kind: TaskKind,
    blocker_id: &TaskId,
) -> Result<Vec<BlockNode>> {
    let sql = format!(
        r#"
        SELECT t.id, t.state, t.blocked_by FROM {} t
        WHERE EXISTS (
            SELECT 1 FROM json_each(
                CASE WHEN json_valid(t.blocked_by) THEN t.blocked_by ELSE '[]' END
            ) e
            WHERE json_extract(e.value, '$.type') = 'task_block'
              AND json_extract(e.value, '$.taskId') = ?1
        )
        ORDER BY t.id
        "#,
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map(params![blocker_id], row_to_node)?
        .collect::<rusqlite::Result<Vec<BlockNode>>>()?;
    Ok(nodes)
}

pub fn list_child_nodes(conn: &Connection, project_id: &TaskId) -> Result<Vec<BlockNode>> {
    let mut stmt = conn.prepare(
        "SELECT id, state, blocked_by FROM subtasks WHERE parent_id = ?1 ORDER BY sort_order, id",
    )?;
    let nodes = stmt
        .query_map(params![project_id], row_to_node)?
        .collect::<rusqlite::Result<Vec<BlockNode>>>()?;
    Ok(nodes)
}

/// Persist state and blockers of a task together.
pub fn update_node(conn: &Connection, kind: TaskKind, node: &BlockNode) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET state = ?1, blocked_by = ?2, updated_at = ?3 WHERE id = ?4",
            kind.table()
        ),
        params![node.state, &node.blocked_by, now().to_rfc3339(), &node.id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::setup_db;
    use crate::types::{BlockEntry, Priority};

    #[test]
    fn create_project_trims_and_defaults() {
        let conn = setup_db();
        let project = create_project(
            &conn,
            &CreateProjectInput {
                title: "  Learn Rust  ".to_string(),
                description: Some("   ".to_string()),
                emoji: Some("🦀".to_string()),
                priority: Priority::High,
                order: None,
            },
            false,
        )
        .unwrap();

        assert_eq!(project.title, "Learn Rust");
        assert_eq!(project.description, None);
        assert_eq!(project.emoji.as_deref(), Some("🦀"));
        assert_eq!(project.state, TaskState::Active);
        assert!(project.blocked_by.is_empty());
        assert_eq!(project.subtask_count, Some(0));
    }

    #[test]
    fn create_project_rejects_blank_title() {
        let conn = setup_db();
        let result = create_project(
            &conn,
            &CreateProjectInput {
                title: "   ".to_string(),
                ..Default::default()
            },
            false,
        );
        assert!(matches!(result, Err(CasError::EmptyTitle)));
    }

    #[test]
    fn blocked_by_roundtrips_through_column() {
        let conn = setup_db();
        let project = create_project(
            &conn,
            &CreateProjectInput {
                title: "P".to_string(),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        let blocker = TaskId::new(TaskKind::Project);

        let node = BlockNode {
            id: project.id.clone(),
            state: TaskState::Blocked,
            blocked_by: BlockedBy::from(vec![BlockEntry::task(blocker.clone())]),
        };
        update_node(&conn, TaskKind::Project, &node).unwrap();

        let read = get_node(&conn, TaskKind::Project, &project.id)
            .unwrap()
            .unwrap();
        assert_eq!(read, node);

        let raw: String = conn
            .query_row(
                "SELECT blocked_by FROM projects WHERE id = ?1",
                params![&project.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            raw,
            format!(r#"[{{"type":"task_block","taskId":"{blocker}"}}]"#)
        );
    }

    #[test]
    fn malformed_blocked_by_reads_as_empty() {
        let conn = setup_db();
        let project = create_project(
            &conn,
            &CreateProjectInput {
                title: "P".to_string(),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        conn.execute(
            "UPDATE projects SET blocked_by = 'not json' WHERE id = ?1",
            params![&project.id],
        )
        .unwrap();

        let node = get_node(&conn, TaskKind::Project, &project.id)
            .unwrap()
            .unwrap();
        assert!(node.blocked_by.is_empty());
    }

    #[test]
    fn list_nodes_blocked_by_ignores_parent_blocks() {
        let conn = setup_db();
        let a = create_project(
            &conn,
            &CreateProjectInput {
                title: "A".to_string(),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        let b = create_project(
            &conn,
            &CreateProjectInput {
                title: "B".to_string(),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        let c = create_project(
            &conn,
            &CreateProjectInput {
                title: "C".to_string(),
                ..Default::default()
            },
            false,
        )
        .unwrap();

        update_node(
            &conn,
            TaskKind::Project,
            &BlockNode {
                id: b.id.clone(),
                state: TaskState::Blocked,
                blocked_by: BlockedBy::from(vec![BlockEntry::task(a.id.clone())]),
            },
        )
        .unwrap();
        // Same id under the other tag must not match
        update_node(
            &conn,
            TaskKind::Project,
            &BlockNode {
                id: c.id.clone(),
                state: TaskState::Blocked,
                blocked_by: BlockedBy::from(vec![BlockEntry::parent(a.id.clone())]),
            },
        )
        .unwrap();

        let nodes = list_nodes_blocked_by(&conn, TaskKind::Project, &a.id).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, b.id);
    }
}
