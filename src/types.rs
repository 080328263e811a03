use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::id::{SectionId, TaskId};

/// Stores a text-backed enum through its `as_str`/`FromStr` pair.
macro_rules! sql_text_enum {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )+};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Active,
    Waiting,
    Blocked,
    Done,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::Active,
        TaskState::Waiting,
        TaskState::Blocked,
        TaskState::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Active => "ACTIVE",
            TaskState::Waiting => "WAITING",
            TaskState::Blocked => "BLOCKED",
            TaskState::Done => "DONE",
        }
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(TaskState::Active),
            "WAITING" => Ok(TaskState::Waiting),
            "BLOCKED" => Ok(TaskState::Blocked),
            "DONE" => Ok(TaskState::Done),
            _ => Err(format!("Invalid state: {s}")),
        }
    }
}

/// The three task tables. Blocker graphs never cross kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Long-running task that owns subtasks
    #[serde(rename = "longTerm")]
    Project,
    /// Short-running task owned by exactly one project
    #[serde(rename = "shortTerm")]
    Subtask,
    #[serde(rename = "routine")]
    Routine,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Project, TaskKind::Subtask, TaskKind::Routine];

    pub fn id_prefix(&self) -> &'static str {
        match self {
            TaskKind::Project => "prj_",
            TaskKind::Subtask => "sub_",
            TaskKind::Routine => "rtn_",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            TaskKind::Project => "projects",
            TaskKind::Subtask => "subtasks",
            TaskKind::Routine => "routines",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Project => "longTerm",
            TaskKind::Subtask => "shortTerm",
            TaskKind::Routine => "routine",
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" | "long-term" | "longTerm" => Ok(TaskKind::Project),
            "subtask" | "short-term" | "shortTerm" => Ok(TaskKind::Subtask),
            "routine" => Ok(TaskKind::Routine),
            _ => Err(format!("Invalid task kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Highest,
    High,
    #[default]
    Medium,
    Low,
    Lowest,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Highest => "HIGHEST",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
            Priority::Lowest => "LOWEST",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HIGHEST" => Ok(Priority::Highest),
            "HIGH" => Ok(Priority::High),
            "MEDIUM" => Ok(Priority::Medium),
            "LOW" => Ok(Priority::Low),
            "LOWEST" => Ok(Priority::Lowest),
            _ => Err(format!("Invalid priority: {s}")),
        }
    }
}

/// Recurrence of a routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interval {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Custom,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "DAILY",
            Interval::Weekly => "WEEKLY",
            Interval::Biweekly => "BIWEEKLY",
            Interval::Monthly => "MONTHLY",
            Interval::Custom => "CUSTOM",
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Interval::Daily),
            "WEEKLY" => Ok(Interval::Weekly),
            "BIWEEKLY" => Ok(Interval::Biweekly),
            "MONTHLY" => Ok(Interval::Monthly),
            "CUSTOM" => Ok(Interval::Custom),
            _ => Err(format!("Invalid interval: {s}")),
        }
    }
}

sql_text_enum!(TaskState, Priority, Interval);

/// One edge of the blocker graph.
///
/// Serialized as `{"type":"task_block","taskId":"sub_..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockEntry {
    /// Blocked by another task of the same kind
    TaskBlock {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    /// Subtask blocked because its owning project is not ACTIVE
    ParentBlock {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
}

impl BlockEntry {
    pub fn task(task_id: TaskId) -> Self {
        BlockEntry::TaskBlock { task_id }
    }

    pub fn parent(task_id: TaskId) -> Self {
        BlockEntry::ParentBlock { task_id }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            BlockEntry::TaskBlock { task_id } | BlockEntry::ParentBlock { task_id } => task_id,
        }
    }
}

/// Ordered set of block entries.
///
/// Keeps insertion order for display, rejects duplicate entries and holds at
/// most one `parent_block`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<BlockEntry>", into = "Vec<BlockEntry>")]
pub struct BlockedBy(Vec<BlockEntry>);

impl BlockedBy {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockEntry> {
        self.0.iter()
    }

    pub fn contains(&self, entry: &BlockEntry) -> bool {
        self.0.contains(entry)
    }

    /// Insert an entry. Returns false if it was already present.
    ///
    /// A `parent_block` replaces any `parent_block` for a different parent.
    pub fn insert(&mut self, entry: BlockEntry) -> bool {
        if self.contains(&entry) {
            return false;
        }
        if matches!(entry, BlockEntry::ParentBlock { .. }) {
            self.clear_parent_blocks();
        }
        self.0.push(entry);
        true
    }

    /// Remove the `task_block` on `blocker_id`. Returns true if one was removed.
    pub fn remove_task_block(&mut self, blocker_id: &TaskId) -> bool {
        self.remove(&BlockEntry::task(blocker_id.clone()))
    }

    /// Remove the `parent_block` on `parent_id`. Returns true if one was removed.
    pub fn remove_parent_block(&mut self, parent_id: &TaskId) -> bool {
        self.remove(&BlockEntry::parent(parent_id.clone()))
    }

    /// Remove every `parent_block`, whichever parent it names.
    pub fn clear_parent_blocks(&mut self) -> bool {
        let before = self.0.len();
        self.0.retain(|e| !matches!(e, BlockEntry::ParentBlock { .. }));
        self.0.len() != before
    }

    fn remove(&mut self, entry: &BlockEntry) -> bool {
        let before = self.0.len();
        self.0.retain(|e| e != entry);
        self.0.len() != before
    }

    pub fn has_task_block(&self, blocker_id: &TaskId) -> bool {
        self.0
            .iter()
            .any(|e| matches!(e, BlockEntry::TaskBlock { task_id } if task_id == blocker_id))
    }

    /// Ids of same-kind tasks blocking this one
    pub fn task_blocks(&self) -> impl Iterator<Item = &TaskId> {
        self.0.iter().filter_map(|e| match e {
            BlockEntry::TaskBlock { task_id } => Some(task_id),
            BlockEntry::ParentBlock { .. } => None,
        })
    }

    pub fn parent_block(&self) -> Option<&TaskId> {
        self.0.iter().find_map(|e| match e {
            BlockEntry::ParentBlock { task_id } => Some(task_id),
            BlockEntry::TaskBlock { .. } => None,
        })
    }
}

impl From<Vec<BlockEntry>> for BlockedBy {
    fn from(entries: Vec<BlockEntry>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<BlockedBy> for Vec<BlockEntry> {
    fn from(blocked_by: BlockedBy) -> Self {
        blocked_by.0
    }
}

impl FromIterator<BlockEntry> for BlockedBy {
    fn from_iter<I: IntoIterator<Item = BlockEntry>>(iter: I) -> Self {
        let mut set = BlockedBy::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

impl<'a> IntoIterator for &'a BlockedBy {
    type Item = &'a BlockEntry;
    type IntoIter = std::slice::Iter<'a, BlockEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl ToSql for BlockedBy {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for BlockedBy {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        // Unreadable blocker lists decode as empty; the engine re-derives state on next write
        match serde_json::from_str::<Vec<BlockEntry>>(raw) {
            Ok(entries) => Ok(entries.into()),
            Err(e) => {
                tracing::warn!(error = %e, raw, "discarding malformed blocked_by column");
                Ok(BlockedBy::new())
            }
        }
    }
}

/// The slice of a task the state engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    pub id: TaskId,
    pub state: TaskState,
    pub blocked_by: BlockedBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub priority: Priority,
    pub state: TaskState,
    pub blocked_by: BlockedBy,
    pub is_one_off: bool,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Computed field: number of subtasks owned by this project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: TaskId,
    pub parent_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub priority: Priority,
    pub state: TaskState,
    pub blocked_by: BlockedBy,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: TaskId,
    pub section_id: Option<SectionId>,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub priority: Priority,
    pub state: TaskState,
    pub blocked_by: BlockedBy,
    pub interval: Option<Interval>,
    pub custom_interval: Option<String>,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named group of routines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateProjectInput {
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub priority: Priority,
    pub order: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CreateSubtaskInput {
    pub parent_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub priority: Priority,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateRoutineInput {
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub priority: Priority,
    pub interval: Option<Interval>,
    pub custom_interval: Option<String>,
    pub section_id: Option<SectionId>,
    pub order: Option<i64>,
}

/// Descriptive fields shared by every task kind.
///
/// `Some("")` for `description`/`emoji` clears the field. None of these
/// touch `state` or `blocked_by`.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub priority: Option<Priority>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRoutineInput {
    pub task: UpdateTaskInput,
    pub interval: Option<Interval>,
    pub custom_interval: Option<String>,
    pub section_id: Option<SectionId>,
    /// Detach from any section (wins over `section_id`)
    pub clear_section: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub state: Option<TaskState>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Default)]
pub struct SubtaskFilter {
    pub parent_id: Option<TaskId>,
    pub state: Option<TaskState>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Default)]
pub struct RoutineFilter {
    pub section_id: Option<SectionId>,
    pub state: Option<TaskState>,
    pub interval: Option<Interval>,
}

/// Every blocked task, grouped by kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedView {
    pub projects: Vec<Project>,
    pub subtasks: Vec<Subtask>,
    pub routines: Vec<Routine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub() -> TaskId {
        TaskId::new(TaskKind::Subtask)
    }

    #[test]
    fn block_entry_wire_format() {
        let id: TaskId = "sub_01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
        let json = serde_json::to_string(&BlockEntry::task(id.clone())).unwrap();
        assert_eq!(
            json,
            r#"{"type":"task_block","taskId":"sub_01ARZ3NDEKTSV4RRFFQ69G5FAV"}"#
        );
        let raw = r#"{"type":"parent_block","taskId":"sub_01ARZ3NDEKTSV4RRFFQ69G5FAV"}"#;
        let parsed: BlockEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, BlockEntry::parent(id));
    }

    #[test]
    fn blocked_by_insert_is_idempotent() {
        let blocker = sub();
        let mut set = BlockedBy::new();
        assert!(set.insert(BlockEntry::task(blocker.clone())));
        assert!(!set.insert(BlockEntry::task(blocker.clone())));
        assert_eq!(set.len(), 1);
        assert!(set.has_task_block(&blocker));
    }

    #[test]
    fn blocked_by_keeps_single_parent_block() {
        let old_parent = TaskId::new(TaskKind::Project);
        let new_parent = TaskId::new(TaskKind::Project);
        let blocker = sub();

        let mut set = BlockedBy::new();
        set.insert(BlockEntry::parent(old_parent));
        set.insert(BlockEntry::task(blocker.clone()));
        set.insert(BlockEntry::parent(new_parent.clone()));

        assert_eq!(set.len(), 2);
        assert_eq!(set.parent_block(), Some(&new_parent));
        assert_eq!(set.task_blocks().collect::<Vec<_>>(), vec![&blocker]);
    }

    #[test]
    fn blocked_by_deserialize_drops_duplicates() {
        let id = sub();
        let raw = format!(
            r#"[{{"type":"task_block","taskId":"{id}"}},{{"type":"task_block","taskId":"{id}"}}]"#
        );
        let set: BlockedBy = serde_json::from_str(&raw).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn blocked_by_remove_matches_type() {
        let id = TaskId::new(TaskKind::Project);
        let mut set = BlockedBy::from(vec![BlockEntry::parent(id.clone())]);
        assert!(!set.remove_task_block(&id));
        assert!(set.remove_parent_block(&id));
        assert!(set.is_empty());
    }

    #[test]
    fn state_parse_is_case_insensitive() {
        assert_eq!("waiting".parse::<TaskState>().unwrap(), TaskState::Waiting);
        assert!("paused".parse::<TaskState>().is_err());
    }

    #[test]
    fn kind_parse_accepts_aliases() {
        assert_eq!("shortTerm".parse::<TaskKind>().unwrap(), TaskKind::Subtask);
        assert_eq!("project".parse::<TaskKind>().unwrap(), TaskKind::Project);
        assert_eq!(
            serde_json::to_string(&TaskKind::Project).unwrap(),
            "\"longTerm\""
        );
    }
}
