use clap::{Args, Subcommand};
use rusqlite::Connection;

use super::{
    parse_interval, parse_routine_id, parse_section_id, parse_state, DetailArgs, Outcome,
    UpdateFields,
};
use crate::core::{StateEngine, TaskService};
use crate::error::Result;
use crate::id::{SectionId, TaskId};
use crate::types::{
    CreateRoutineInput, Interval, Routine, RoutineFilter, TaskKind, TaskState, UpdateRoutineInput,
};

#[derive(Subcommand, Clone)]
pub enum RoutineCommand {
    Create(CreateArgs),
    Get {
        #[arg(value_parser = parse_routine_id)]
        id: TaskId,
    },
    List(ListArgs),
    Update(UpdateArgs),
    State(StateArgs),
    Block(BlockArgs),
    Unblock(BlockArgs),
    Delete {
        #[arg(value_parser = parse_routine_id)]
        id: TaskId,
    },
}

#[derive(Args, Clone)]
pub struct CreateArgs {
    pub title: String,

    /// DAILY, WEEKLY, BIWEEKLY, MONTHLY or CUSTOM
    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<Interval>,

    /// Free-form recurrence when the interval is CUSTOM
    #[arg(long)]
    pub custom_interval: Option<String>,

    #[arg(long, value_parser = parse_section_id)]
    pub section: Option<SectionId>,

    #[command(flatten)]
    pub details: DetailArgs,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_section_id)]
    pub section: Option<SectionId>,

    #[arg(long, value_parser = parse_state)]
    pub state: Option<TaskState>,

    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<Interval>,
}

#[derive(Args, Clone)]
pub struct UpdateArgs {
    #[arg(value_parser = parse_routine_id)]
    pub id: TaskId,

    #[command(flatten)]
    pub fields: UpdateFields,

    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<Interval>,

    #[arg(long)]
    pub custom_interval: Option<String>,

    #[arg(long, value_parser = parse_section_id, conflicts_with = "no_section")]
    pub section: Option<SectionId>,

    /// Detach the routine from its section
    #[arg(long)]
    pub no_section: bool,
}

#[derive(Args, Clone)]
pub struct StateArgs {
    #[arg(value_parser = parse_routine_id)]
    pub id: TaskId,

    #[arg(value_parser = parse_state)]
    pub state: TaskState,
}

#[derive(Args, Clone)]
pub struct BlockArgs {
    #[arg(value_parser = parse_routine_id)]
    pub id: TaskId,

    #[arg(long, value_parser = parse_routine_id)]
    pub by: TaskId,
}

pub fn handle(conn: &Connection, cmd: RoutineCommand) -> Result<Outcome<Routine>> {
    let svc = TaskService::new(conn);
    let engine = StateEngine::new(conn);

    match cmd {
        RoutineCommand::Create(args) => {
            let input = CreateRoutineInput {
                title: args.title,
                description: args.details.description,
                emoji: args.details.emoji,
                priority: args.details.priority.unwrap_or_default(),
                interval: args.interval,
                custom_interval: args.custom_interval,
                section_id: args.section,
                order: args.details.order,
            };
            Ok(Outcome::One(svc.create_routine(&input)?))
        }

        RoutineCommand::Get { id } => Ok(Outcome::One(svc.get_routine(&id)?)),

        RoutineCommand::List(args) => {
            let filter = RoutineFilter {
                section_id: args.section,
                state: args.state,
                interval: args.interval,
            };
            Ok(Outcome::Many(svc.list_routines(&filter)?))
        }

        RoutineCommand::Update(args) => {
            let input = UpdateRoutineInput {
                task: args.fields.into(),
                interval: args.interval,
                custom_interval: args.custom_interval,
                section_id: args.section,
                clear_section: args.no_section,
            };
            Ok(Outcome::One(svc.update_routine(&args.id, &input)?))
        }

        RoutineCommand::State(args) => {
            engine.change_routine_state(&args.id, args.state)?;
            Ok(Outcome::One(svc.get_routine(&args.id)?))
        }

        RoutineCommand::Block(args) => {
            engine.add_blocker(&args.id, &args.by, TaskKind::Routine)?;
            Ok(Outcome::One(svc.get_routine(&args.id)?))
        }

        RoutineCommand::Unblock(args) => {
            engine.remove_blocker(&args.id, &args.by, TaskKind::Routine)?;
            Ok(Outcome::One(svc.get_routine(&args.id)?))
        }

        RoutineCommand::Delete { id } => {
            svc.delete_routine(&id)?;
            Ok(Outcome::Deleted)
        }
    }
}
