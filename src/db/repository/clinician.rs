use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{now_iso, parse_uuid};
use crate::db::DatabaseError;
use crate::models::Clinician;

pub fn create_clinician(
    conn: &Connection,
    name: &str,
    clinic: &str,
    specialty: Option<&str>,
) -> Result<Clinician, DatabaseError> {
    let id = Uuid::new_v4();
    let now = now_iso();
    conn.execute(
        "INSERT INTO clinicians (id, name, clinic, specialty, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.to_string(), name, clinic, specialty, now],
    )?;
    Ok(Clinician {
        id,
        name: name.into(),
        clinic: clinic.into(),
        specialty: specialty.map(Into::into),
        created_at: now,
    })
}

pub fn get_clinician(conn: &Connection, id: Uuid) -> Result<Clinician, DatabaseError> {
    let raw = conn
        .query_row(
            "SELECT id, name, clinic, specialty, created_at FROM clinicians WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Clinician".into(),
            id: id.to_string(),
        })?;

    let (id, name, clinic, specialty, created_at) = raw;
    Ok(Clinician {
        id: parse_uuid(&id)?,
        name,
        clinic,
        specialty,
        created_at,
    })
}

pub fn list_clinicians_for_clinic(
    conn: &Connection,
    clinic: &str,
) -> Result<Vec<Clinician>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, clinic, specialty, created_at FROM clinicians
         WHERE clinic = ?1 ORDER BY name ASC",
    )?;
    let rows = stmt.query_map(params![clinic], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut clinicians = Vec::new();
    for row in rows {
        let (id, name, clinic, specialty, created_at) = row?;
        clinicians.push(Clinician {
            id: parse_uuid(&id)?,
            name,
            clinic,
            specialty,
            created_at,
        });
    }
    Ok(clinicians)
}
