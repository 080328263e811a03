use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::task_repo::parse_timestamp;
use crate::error::{CasError, Result};
use crate::id::SectionId;
use crate::types::Section;

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CasError::EmptySectionName);
    }
    Ok(trimmed.to_string())
}

fn row_to_section(row: &Row) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get("id")?,
        name: row.get("name")?,
        order: row.get("sort_order")?,
        created_at: parse_timestamp(row, "created_at"),
        updated_at: parse_timestamp(row, "updated_at"),
    })
}

pub fn create_section(conn: &Connection, name: &str, order: Option<i64>) -> Result<Section> {
    let id = SectionId::new();
    let name = normalize_name(name)?;
    let now_str = now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO sections (id, name, sort_order, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        "#,
        params![&id, name, order.unwrap_or(0), now_str],
    )?;

    get_section(conn, &id)?.ok_or(CasError::SectionNotFound(id))
}

pub fn get_section(conn: &Connection, id: &SectionId) -> Result<Option<Section>> {
    let section = conn
        .query_row(
            "SELECT * FROM sections WHERE id = ?1",
            params![id],
            row_to_section,
        )
        .optional()?;
    Ok(section)
}

pub fn list_sections(conn: &Connection) -> Result<Vec<Section>> {
    let mut stmt =
        conn.prepare("SELECT * FROM sections ORDER BY sort_order ASC, created_at ASC, id ASC")?;
    let sections = stmt
        .query_map([], row_to_section)?
        .collect::<rusqlite::Result<Vec<Section>>>()?;
    Ok(sections)
}

pub fn update_section(
    conn: &Connection,
    id: &SectionId,
    name: Option<&str>,
    order: Option<i64>,
) -> Result<Section> {
    let now_str = now().to_rfc3339();

    if let Some(name) = name {
        conn.execute(
            "UPDATE sections SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![normalize_name(name)?, now_str, id],
        )?;
    }

    if let Some(order) = order {
        conn.execute(
            "UPDATE sections SET sort_order = ?1, updated_at = ?2 WHERE id = ?3",
            params![order, now_str, id],
        )?;
    }

    get_section(conn, id)?.ok_or_else(|| CasError::SectionNotFound(id.clone()))
}

/// Delete a section. Its routines are kept with `section_id` cleared.
pub fn delete_section(conn: &Connection, id: &SectionId) -> Result<()> {
    conn.execute("DELETE FROM sections WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn section_exists(conn: &Connection, id: &SectionId) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sections WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::setup_db;

    #[test]
    fn create_and_rename_section() {
        let conn = setup_db();
        let section = create_section(&conn, " Morning ", None).unwrap();
        assert_eq!(section.name, "Morning");

        let renamed = update_section(&conn, &section.id, Some("Evening"), Some(3)).unwrap();
        assert_eq!(renamed.name, "Evening");
        assert_eq!(renamed.order, 3);
    }

    #[test]
    fn blank_section_name_rejected() {
        let conn = setup_db();
        assert!(matches!(
            create_section(&conn, "  ", None),
            Err(CasError::EmptySectionName)
        ));
    }

    #[test]
    fn sections_listed_by_order() {
        let conn = setup_db();
        create_section(&conn, "Second", Some(2)).unwrap();
        create_section(&conn, "First", Some(1)).unwrap();
        let names: Vec<String> = list_sections(&conn)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }
}
