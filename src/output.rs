use std::io::IsTerminal;

use owo_colors::{OwoColorize, Style};
use serde::Deserialize;

use casually::commands::{ProjectCommand, RoutineCommand, SectionCommand, SubtaskCommand};
use casually::types::{BlockEntry, BlockedBy, Priority, Section, TaskState};

use crate::Command;

/// Fields every task kind shares, enough for a one-line rendering
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskLine {
    id: String,
    title: String,
    #[serde(default)]
    emoji: Option<String>,
    state: TaskState,
    priority: Priority,
    #[serde(default)]
    blocked_by: BlockedBy,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    subtask_count: Option<i64>,
}

#[derive(Deserialize)]
struct BlockedGroups {
    projects: Vec<TaskLine>,
    subtasks: Vec<TaskLine>,
    routines: Vec<TaskLine>,
}

#[derive(Deserialize)]
struct Transitions {
    from: TaskState,
    next: Vec<TaskState>,
}

/// Color policy: --no-color > NO_COLOR env > TERM=dumb > !isatty > default (color)
fn should_use_color_for(no_color_flag: bool, is_tty: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("TERM").ok().as_deref() == Some("dumb") {
        return false;
    }
    is_tty
}

fn should_use_color(no_color_flag: bool) -> bool {
    should_use_color_for(no_color_flag, std::io::stdout().is_terminal())
}

fn should_use_color_stderr(no_color_flag: bool) -> bool {
    should_use_color_for(no_color_flag, std::io::stderr().is_terminal())
}

struct Colors {
    task_id: Style,
    active: Style,
    waiting: Style,
    blocked: Style,
    done: Style,
    priority_high: Style,
    dim: Style,
    error: Style,
}

impl Colors {
    fn new(use_color: bool) -> Self {
        if use_color {
            Self {
                task_id: Style::new().cyan().dimmed(),
                active: Style::new().green().bold(),
                waiting: Style::new().yellow(),
                blocked: Style::new().red(),
                done: Style::new().green(),
                priority_high: Style::new().red(),
                dim: Style::new().dimmed(),
                error: Style::new().red().bold(),
            }
        } else {
            Self {
                task_id: Style::new(),
                active: Style::new(),
                waiting: Style::new(),
                blocked: Style::new(),
                done: Style::new(),
                priority_high: Style::new(),
                dim: Style::new(),
                error: Style::new(),
            }
        }
    }
}

/// Handles human-readable CLI output.
pub struct Printer {
    colors: Colors,
}

impl Printer {
    pub fn new(no_color_flag: bool) -> Self {
        Self {
            colors: Colors::new(should_use_color(no_color_flag)),
        }
    }

    pub fn new_for_stderr(no_color_flag: bool) -> Self {
        Self {
            colors: Colors::new(should_use_color_stderr(no_color_flag)),
        }
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{}", message.style(self.colors.error));
    }

    fn fmt_id(&self, id: &impl std::fmt::Display) -> String {
        format!("{}", id.to_string().style(self.colors.task_id))
    }

    fn state_symbol_style(&self, state: TaskState) -> (&'static str, Style) {
        match state {
            TaskState::Active => ("▶", self.colors.active),
            TaskState::Waiting => ("○", self.colors.waiting),
            TaskState::Blocked => ("⊘", self.colors.blocked),
            TaskState::Done => ("✓", self.colors.done),
        }
    }

    pub fn print(&self, command: &Command, output: &str) {
        match command {
            Command::Init => println!("Initialized casually database"),
            Command::Project(ProjectCommand::Delete { .. }) => println!("Project deleted"),
            Command::Subtask(SubtaskCommand::Delete { .. }) => println!("Subtask deleted"),
            Command::Routine(RoutineCommand::Delete { .. }) => println!("Routine deleted"),
            Command::Section(SectionCommand::Delete { .. }) => println!("Section deleted"),
            Command::Project(ProjectCommand::List(_))
            | Command::Subtask(SubtaskCommand::List(_))
            | Command::Routine(RoutineCommand::List(_)) => self.print_task_list(output),
            Command::Project(_) | Command::Subtask(_) | Command::Routine(_) => {
                self.print_task(output)
            }
            Command::Section(SectionCommand::List) => self.print_section_list(output),
            Command::Section(_) => self.print_section(output),
            Command::Blocked => self.print_blocked(output),
            Command::Transitions { .. } => self.print_transitions(output),
            // Completions handled in main() before print() is called
            Command::Completions { .. } => unreachable!("completions handled before print()"),
        }
    }

    fn task_line(&self, task: &TaskLine) -> String {
        let (symbol, style) = self.state_symbol_style(task.state);
        let title = match task.emoji {
            Some(ref emoji) => format!("{} {}", emoji, task.title),
            None => task.title.clone(),
        };
        let priority = match task.priority {
            Priority::Highest | Priority::High => {
                format!(" {}", task.priority.style(self.colors.priority_high))
            }
            _ => String::new(),
        };
        format!(
            "[{}] {} - {}{}",
            symbol.style(style),
            self.fmt_id(&task.id),
            title,
            priority
        )
    }

    fn print_task(&self, output: &str) {
        let Ok(task) = serde_json::from_str::<TaskLine>(output) else {
            println!("{}", output);
            return;
        };

        println!("{}", self.task_line(&task));
        let (_, style) = self.state_symbol_style(task.state);
        println!("  State: {}", task.state.style(style));
        if let Some(ref parent) = task.parent_id {
            println!("  Project: {}", self.fmt_id(parent));
        }
        if let Some(count) = task.subtask_count {
            println!("  Subtasks: {}", count);
        }
        for entry in task.blocked_by.iter() {
            let label = match entry {
                BlockEntry::TaskBlock { .. } => "blocked by",
                BlockEntry::ParentBlock { .. } => "waiting on project",
            };
            println!(
                "  {} {}",
                label.style(self.colors.dim),
                self.fmt_id(entry.task_id())
            );
        }
    }

    fn print_task_list(&self, output: &str) {
        let Ok(tasks) = serde_json::from_str::<Vec<TaskLine>>(output) else {
            println!("{}", output);
            return;
        };
        if tasks.is_empty() {
            println!("No tasks found");
            return;
        }

        for task in &tasks {
            println!("{}", self.task_line(task));
        }
        let done = tasks.iter().filter(|t| t.state == TaskState::Done).count();
        let blocked = tasks
            .iter()
            .filter(|t| t.state == TaskState::Blocked)
            .count();
        println!(
            "{}",
            format!("{}/{} done | {} blocked", done, tasks.len(), blocked).style(self.colors.dim)
        );
    }

    fn print_section(&self, output: &str) {
        match serde_json::from_str::<Section>(output) {
            Ok(section) => println!("{} - {}", self.fmt_id(&section.id), section.name),
            Err(_) => println!("{}", output),
        }
    }

    fn print_section_list(&self, output: &str) {
        let Ok(sections) = serde_json::from_str::<Vec<Section>>(output) else {
            println!("{}", output);
            return;
        };
        if sections.is_empty() {
            println!("No sections found");
        }
        for section in &sections {
            println!("{} - {}", self.fmt_id(&section.id), section.name);
        }
    }

    fn print_blocked(&self, output: &str) {
        let Ok(groups) = serde_json::from_str::<BlockedGroups>(output) else {
            println!("{}", output);
            return;
        };
        if groups.projects.is_empty() && groups.subtasks.is_empty() && groups.routines.is_empty() {
            println!("Nothing is blocked");
            return;
        }

        for (heading, tasks) in [
            ("Projects", &groups.projects),
            ("Subtasks", &groups.subtasks),
            ("Routines", &groups.routines),
        ] {
            if tasks.is_empty() {
                continue;
            }
            println!("{}", heading.bold());
            for task in tasks {
                println!("  {}", self.task_line(task));
            }
        }
    }

    fn print_transitions(&self, output: &str) {
        let Ok(transitions) = serde_json::from_str::<Transitions>(output) else {
            println!("{}", output);
            return;
        };
        let next: Vec<String> = transitions
            .next
            .iter()
            .map(|s| {
                let (_, style) = self.state_symbol_style(*s);
                format!("{}", s.style(style))
            })
            .collect();
        println!("{} -> {}", transitions.from, next.join(", "));
    }
}
