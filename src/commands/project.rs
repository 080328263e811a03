use clap::{Args, Subcommand};
use rusqlite::Connection;

use super::{parse_priority, parse_project_id, parse_state, DetailArgs, Outcome, UpdateFields};
use crate::core::{StateEngine, TaskService};
use crate::error::Result;
use crate::id::TaskId;
use crate::types::{CreateProjectInput, Priority, Project, ProjectFilter, TaskKind, TaskState};

#[derive(Subcommand, Clone)]
pub enum ProjectCommand {
    Create(CreateArgs),
    Get {
        #[arg(value_parser = parse_project_id)]
        id: TaskId,
    },
    List(ListArgs),
    Update(UpdateArgs),
    /// Request a state change (subtasks follow the project in and out of ACTIVE)
    State(StateArgs),
    Block(BlockArgs),
    Unblock(BlockArgs),
    /// Delete a project with its subtasks
    Delete {
        #[arg(value_parser = parse_project_id)]
        id: TaskId,
    },
    /// Show the One-Off Tasks project, creating it if needed
    OneOff,
}

#[derive(Args, Clone)]
pub struct CreateArgs {
    pub title: String,

    #[command(flatten)]
    pub details: DetailArgs,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_state)]
    pub state: Option<TaskState>,

    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<Priority>,
}

#[derive(Args, Clone)]
pub struct UpdateArgs {
    #[arg(value_parser = parse_project_id)]
    pub id: TaskId,

    #[command(flatten)]
    pub fields: UpdateFields,
}

#[derive(Args, Clone)]
pub struct StateArgs {
    #[arg(value_parser = parse_project_id)]
    pub id: TaskId,

    /// ACTIVE, WAITING, BLOCKED or DONE
    #[arg(value_parser = parse_state)]
    pub state: TaskState,
}

#[derive(Args, Clone)]
pub struct BlockArgs {
    #[arg(value_parser = parse_project_id)]
    pub id: TaskId,

    #[arg(long, value_parser = parse_project_id)]
    pub by: TaskId,
}

pub fn handle(conn: &Connection, cmd: ProjectCommand) -> Result<Outcome<Project>> {
    let svc = TaskService::new(conn);
    let engine = StateEngine::new(conn);

    match cmd {
        ProjectCommand::Create(args) => {
            let input = CreateProjectInput {
                title: args.title,
                description: args.details.description,
                emoji: args.details.emoji,
                priority: args.details.priority.unwrap_or_default(),
                order: args.details.order,
            };
            Ok(Outcome::One(svc.create_project(&input)?))
        }

        ProjectCommand::Get { id } => Ok(Outcome::One(svc.get_project(&id)?)),

        ProjectCommand::List(args) => {
            let filter = ProjectFilter {
                state: args.state,
                priority: args.priority,
            };
            Ok(Outcome::Many(svc.list_projects(&filter)?))
        }

        ProjectCommand::Update(args) => Ok(Outcome::One(
            svc.update_project(&args.id, &args.fields.into())?,
        )),

        ProjectCommand::State(args) => {
            engine.change_project_state(&args.id, args.state)?;
            Ok(Outcome::One(svc.get_project(&args.id)?))
        }

        ProjectCommand::Block(args) => {
            engine.add_blocker(&args.id, &args.by, TaskKind::Project)?;
            Ok(Outcome::One(svc.get_project(&args.id)?))
        }

        ProjectCommand::Unblock(args) => {
            engine.remove_blocker(&args.id, &args.by, TaskKind::Project)?;
            Ok(Outcome::One(svc.get_project(&args.id)?))
        }

        ProjectCommand::Delete { id } => {
            svc.delete_project(&id)?;
            Ok(Outcome::Deleted)
        }

        ProjectCommand::OneOff => Ok(Outcome::One(svc.get_or_create_one_off()?)),
    }
}
