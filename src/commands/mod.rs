pub mod project;
pub mod routine;
pub mod section;
pub mod subtask;

use clap::Args;

use crate::id::{SectionId, TaskId};
use crate::types::{Interval, Priority, TaskKind, TaskState, UpdateTaskInput};

pub use project::ProjectCommand;
pub use routine::RoutineCommand;
pub use section::SectionCommand;
pub use subtask::SubtaskCommand;

/// What a command handed back, before rendering.
pub enum Outcome<T> {
    One(T),
    Many(Vec<T>),
    Deleted,
}

/// Parse a TaskId whose prefix names `kind`
fn parse_kind_id(s: &str, kind: TaskKind) -> std::result::Result<TaskId, String> {
    let id: TaskId = s.parse().map_err(|e| format!("{e}"))?;
    if id.kind() != Some(kind) {
        return Err(format!(
            "expected an id starting with {}, got {id}",
            kind.id_prefix()
        ));
    }
    Ok(id)
}

pub fn parse_project_id(s: &str) -> std::result::Result<TaskId, String> {
    parse_kind_id(s, TaskKind::Project)
}

pub fn parse_subtask_id(s: &str) -> std::result::Result<TaskId, String> {
    parse_kind_id(s, TaskKind::Subtask)
}

pub fn parse_routine_id(s: &str) -> std::result::Result<TaskId, String> {
    parse_kind_id(s, TaskKind::Routine)
}

pub fn parse_section_id(s: &str) -> std::result::Result<SectionId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

pub fn parse_state(s: &str) -> std::result::Result<TaskState, String> {
    s.parse()
}

pub fn parse_priority(s: &str) -> std::result::Result<Priority, String> {
    s.parse()
}

pub fn parse_interval(s: &str) -> std::result::Result<Interval, String> {
    s.parse()
}

/// Optional descriptive fields shared by create and update.
#[derive(Args, Clone, Default)]
pub struct DetailArgs {
    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long)]
    pub emoji: Option<String>,

    /// HIGHEST, HIGH, MEDIUM, LOW or LOWEST
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// Sort position (ascending)
    #[arg(long)]
    pub order: Option<i64>,
}

#[derive(Args, Clone, Default)]
pub struct UpdateFields {
    #[arg(long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub details: DetailArgs,
}

impl From<UpdateFields> for UpdateTaskInput {
    fn from(fields: UpdateFields) -> Self {
        UpdateTaskInput {
            title: fields.title,
            description: fields.details.description,
            emoji: fields.details.emoji,
            priority: fields.details.priority,
            order: fields.details.order,
        }
    }
}
