//! Prefixed ULID newtypes for type-safe entity IDs.
//!
//! - `TaskId`: `prj_01ARZ3NDEKTSV4RRFFQ69G5FAV` (project),
//!   `sub_...` (subtask), `rtn_...` (routine)
//! - `SectionId`: `sec_01ARZ3NDEKTSV4RRFFQ69G5FAV`
//!
//! The task prefix doubles as the kind tag, so an id alone tells which
//! table a task lives in.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TaskKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdParseError {
    #[error("Invalid ULID format: {0}")]
    InvalidUlid(String),
    #[error("Missing prefix: expected '{expected}', got '{actual}'")]
    MissingPrefix {
        expected: &'static str,
        actual: String,
    },
}

fn validate_ulid(s: &str) -> Result<(), IdParseError> {
    ulid::Ulid::from_string(s)
        .map(|_| ())
        .map_err(|_| IdParseError::InvalidUlid(s.to_string()))
}

// ============ TaskId ============

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate new TaskId for the given kind with a fresh ULID
    pub fn new(kind: TaskKind) -> Self {
        Self(format!("{}{}", kind.id_prefix(), ulid::Ulid::new()))
    }

    /// Kind encoded in the prefix. Ids read back from storage always carry one.
    pub fn kind(&self) -> Option<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .find(|k| self.0.starts_with(k.id_prefix()))
    }

    /// Extract the ULID part (without prefix)
    pub fn ulid_part(&self) -> &str {
        self.kind()
            .and_then(|k| self.0.strip_prefix(k.id_prefix()))
            .unwrap_or(&self.0)
    }

    /// Full string representation (with prefix)
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = TaskKind::ALL
            .into_iter()
            .find(|k| s.starts_with(k.id_prefix()))
            .ok_or_else(|| IdParseError::MissingPrefix {
                expected: "prj_|sub_|rtn_",
                actual: s.to_string(),
            })?;
        let ulid = &s[kind.id_prefix().len()..];
        validate_ulid(ulid)?;
        Ok(Self(s.to_string()))
    }
}

impl ToSql for TaskId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for TaskId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?.to_string();
        Ok(Self(s))
    }
}

// ============ SectionId ============

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub const PREFIX: &'static str = "sec_";

    pub fn new() -> Self {
        Self(format!("{}{}", Self::PREFIX, ulid::Ulid::new()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SectionId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| IdParseError::MissingPrefix {
                expected: Self::PREFIX,
                actual: s.to_string(),
            })?;
        validate_ulid(ulid)?;
        Ok(Self(s.to_string()))
    }
}

impl ToSql for SectionId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for SectionId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?.to_string();
        Ok(Self(s))
    }
}
