use rusqlite::{params, Connection, OptionalExtension};

use super::now_iso;
use crate::db::DatabaseError;
use crate::models::Clinic;

pub fn insert_clinic(conn: &Connection, code: &str, name: &str) -> Result<Clinic, DatabaseError> {
    let now = now_iso();
    conn.execute(
        "INSERT INTO clinics (code, name, created_at) VALUES (?1, ?2, ?3)",
        params![code, name, now],
    )?;
    Ok(Clinic {
        code: code.into(),
        name: name.into(),
        created_at: now,
    })
}

pub fn get_clinic(conn: &Connection, code: &str) -> Result<Clinic, DatabaseError> {
    conn.query_row(
        "SELECT code, name, created_at FROM clinics WHERE code = ?1",
        params![code],
        |row| {
            Ok(Clinic {
                code: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Clinic".into(),
        id: code.into(),
    })
}

pub fn list_clinics(conn: &Connection) -> Result<Vec<Clinic>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT code, name, created_at FROM clinics ORDER BY code ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Clinic {
            code: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}
