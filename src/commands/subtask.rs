use clap::{Args, Subcommand};
use rusqlite::Connection;

use super::{
    parse_priority, parse_project_id, parse_state, parse_subtask_id, DetailArgs, Outcome,
    UpdateFields,
};
use crate::core::{StateEngine, TaskService};
use crate::error::Result;
use crate::id::TaskId;
use crate::types::{CreateSubtaskInput, Priority, Subtask, SubtaskFilter, TaskKind, TaskState};

#[derive(Subcommand, Clone)]
pub enum SubtaskCommand {
    Create(CreateArgs),
    Get {
        #[arg(value_parser = parse_subtask_id)]
        id: TaskId,
    },
    List(ListArgs),
    Update(UpdateArgs),
    State(StateArgs),
    Block(BlockArgs),
    Unblock(BlockArgs),
    /// Move a subtask under another project
    Move(MoveArgs),
    Delete {
        #[arg(value_parser = parse_subtask_id)]
        id: TaskId,
    },
}

#[derive(Args, Clone)]
pub struct CreateArgs {
    pub title: String,

    /// Owning project (defaults to the One-Off Tasks project)
    #[arg(long, value_parser = parse_project_id)]
    pub parent: Option<TaskId>,

    #[command(flatten)]
    pub details: DetailArgs,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_project_id)]
    pub parent: Option<TaskId>,

    #[arg(long, value_parser = parse_state)]
    pub state: Option<TaskState>,

    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<Priority>,
}

#[derive(Args, Clone)]
pub struct UpdateArgs {
    #[arg(value_parser = parse_subtask_id)]
    pub id: TaskId,

    #[command(flatten)]
    pub fields: UpdateFields,
}

#[derive(Args, Clone)]
pub struct StateArgs {
    #[arg(value_parser = parse_subtask_id)]
    pub id: TaskId,

    #[arg(value_parser = parse_state)]
    pub state: TaskState,
}

#[derive(Args, Clone)]
pub struct BlockArgs {
    #[arg(value_parser = parse_subtask_id)]
    pub id: TaskId,

    #[arg(long, value_parser = parse_subtask_id)]
    pub by: TaskId,
}

#[derive(Args, Clone)]
pub struct MoveArgs {
    #[arg(value_parser = parse_subtask_id)]
    pub id: TaskId,

    #[arg(long, value_parser = parse_project_id)]
    pub to: TaskId,
}

pub fn handle(conn: &Connection, cmd: SubtaskCommand) -> Result<Outcome<Subtask>> {
    let svc = TaskService::new(conn);
    let engine = StateEngine::new(conn);

    match cmd {
        SubtaskCommand::Create(args) => {
            let parent_id = match args.parent {
                Some(id) => id,
                None => svc.get_or_create_one_off()?.id,
            };
            let input = CreateSubtaskInput {
                parent_id,
                title: args.title,
                description: args.details.description,
                emoji: args.details.emoji,
                priority: args.details.priority.unwrap_or_default(),
                order: args.details.order,
            };
            Ok(Outcome::One(svc.create_subtask(&input)?))
        }

        SubtaskCommand::Get { id } => Ok(Outcome::One(svc.get_subtask(&id)?)),

        SubtaskCommand::List(args) => {
            let filter = SubtaskFilter {
                parent_id: args.parent,
                state: args.state,
                priority: args.priority,
            };
            Ok(Outcome::Many(svc.list_subtasks(&filter)?))
        }

        SubtaskCommand::Update(args) => Ok(Outcome::One(
            svc.update_subtask(&args.id, &args.fields.into())?,
        )),

        SubtaskCommand::State(args) => {
            engine.change_subtask_state(&args.id, args.state)?;
            Ok(Outcome::One(svc.get_subtask(&args.id)?))
        }

        SubtaskCommand::Block(args) => {
            engine.add_blocker(&args.id, &args.by, TaskKind::Subtask)?;
            Ok(Outcome::One(svc.get_subtask(&args.id)?))
        }

        SubtaskCommand::Unblock(args) => {
            engine.remove_blocker(&args.id, &args.by, TaskKind::Subtask)?;
            Ok(Outcome::One(svc.get_subtask(&args.id)?))
        }

        SubtaskCommand::Move(args) => Ok(Outcome::One(engine.move_subtask(&args.id, &args.to)?)),

        SubtaskCommand::Delete { id } => {
            svc.delete_subtask(&id)?;
            Ok(Outcome::Deleted)
        }
    }
}
