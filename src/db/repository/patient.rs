use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{now_iso, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{NewPatient, Patient};

/// Register a patient, assigning the next HN code.
pub fn create_patient(conn: &Connection, new_patient: &NewPatient) -> Result<Patient, DatabaseError> {
    let id = Uuid::new_v4();
    let code = next_patient_code(conn)?;
    let now = now_iso();

    conn.execute(
        "INSERT INTO patients (id, code, first_name, last_name, phone, home_clinic, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            code,
            new_patient.first_name,
            new_patient.last_name,
            new_patient.phone,
            new_patient.home_clinic,
            now,
        ],
    )?;

    Ok(Patient {
        id,
        code,
        first_name: new_patient.first_name.clone(),
        last_name: new_patient.last_name.clone(),
        phone: new_patient.phone.clone(),
        home_clinic: new_patient.home_clinic.clone(),
        created_at: now,
    })
}

fn next_patient_code(conn: &Connection) -> Result<String, DatabaseError> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
    Ok(format!("HN{:06}", existing + 1))
}

type PatientRow = (String, String, String, String, Option<String>, Option<String>, String);

pub fn get_patient(conn: &Connection, id: Uuid) -> Result<Patient, DatabaseError> {
    let raw = conn
        .query_row(
            "SELECT id, code, first_name, last_name, phone, home_clinic, created_at
             FROM patients WHERE id = ?1",
            params![id.to_string()],
            patient_row,
        )
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        })?;
    patient_from_row(raw)
}

pub fn get_patient_by_code(conn: &Connection, code: &str) -> Result<Patient, DatabaseError> {
    let raw = conn
        .query_row(
            "SELECT id, code, first_name, last_name, phone, home_clinic, created_at
             FROM patients WHERE code = ?1",
            params![code],
            patient_row,
        )
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: code.into(),
        })?;
    patient_from_row(raw)
}

pub fn list_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, code, first_name, last_name, phone, home_clinic, created_at
         FROM patients ORDER BY code ASC",
    )?;
    let rows = stmt.query_map([], patient_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

fn patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn patient_from_row(raw: PatientRow) -> Result<Patient, DatabaseError> {
    let (id, code, first_name, last_name, phone, home_clinic, created_at) = raw;
    Ok(Patient {
        id: parse_uuid(&id)?,
        code,
        first_name,
        last_name,
        phone,
        home_clinic,
        created_at,
    })
}
