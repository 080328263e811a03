//! Casually: projects, subtasks and routines whose states cascade through
//! a blocker graph, persisted in SQLite.

pub mod commands;
pub mod core;
pub mod db;
pub mod error;
pub mod id;
pub mod types;

#[cfg(test)]
pub mod testutil;
