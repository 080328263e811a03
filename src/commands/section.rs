use clap::{Args, Subcommand};
use rusqlite::Connection;

use super::{parse_section_id, Outcome};
use crate::core::TaskService;
use crate::error::Result;
use crate::id::SectionId;
use crate::types::Section;

#[derive(Subcommand, Clone)]
pub enum SectionCommand {
    Create {
        name: String,

        #[arg(long)]
        order: Option<i64>,
    },
    List,
    /// Rename or reorder a section
    Update(UpdateArgs),
    /// Delete a section; its routines are kept without one
    Delete {
        #[arg(value_parser = parse_section_id)]
        id: SectionId,
    },
}

#[derive(Args, Clone)]
pub struct UpdateArgs {
    #[arg(value_parser = parse_section_id)]
    pub id: SectionId,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub order: Option<i64>,
}

pub fn handle(conn: &Connection, cmd: SectionCommand) -> Result<Outcome<Section>> {
    let svc = TaskService::new(conn);

    match cmd {
        SectionCommand::Create { name, order } => {
            Ok(Outcome::One(svc.create_section(&name, order)?))
        }
        SectionCommand::List => Ok(Outcome::Many(svc.list_sections()?)),
        SectionCommand::Update(args) => Ok(Outcome::One(svc.update_section(
            &args.id,
            args.name.as_deref(),
            args.order,
        )?)),
        SectionCommand::Delete { id } => {
            svc.delete_section(&id)?;
            Ok(Outcome::Deleted)
        }
    }
}
