use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{now_iso, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::CaseStatus;
use crate::models::{Assessment, Case, NewCase, SoapNote};

const CASE_COLUMNS: &str = "id, code, patient_id, purpose, status, source_clinic, target_clinic,
     course_id, appointment_id, assessment_diagnosis, chief_complaint, present_history,
     pain_score, soap_subjective, soap_objective, soap_assessment, soap_plan,
     is_reversed, last_reversal_reason, last_reversal_at, created_by, created_at, updated_at";

/// Create a case in PENDING and return it.
pub fn create_case(
    conn: &Connection,
    new_case: &NewCase,
    created_by: Uuid,
) -> Result<Case, DatabaseError> {
    let id = Uuid::new_v4();
    let today = chrono::Utc::now().date_naive();
    let code = next_case_code(conn, today)?;
    let now = now_iso();

    conn.execute(
        "INSERT INTO cases (id, code, patient_id, purpose, status, source_clinic, target_clinic,
         course_id, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id.to_string(),
            code,
            new_case.patient_id.to_string(),
            new_case.purpose,
            new_case.source_clinic,
            new_case.target_clinic,
            new_case.course_id.map(|c| c.to_string()),
            created_by.to_string(),
            now,
        ],
    )?;

    get_case(conn, id)
}

/// Next human-readable code for the month, e.g. `PN202608-0013`.
pub fn next_case_code(conn: &Connection, today: NaiveDate) -> Result<String, DatabaseError> {
    let prefix = format!("PN{}", today.format("%Y%m"));
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM cases WHERE code LIKE ?1",
        params![format!("{prefix}-%")],
        |row| row.get(0),
    )?;
    Ok(format!("{prefix}-{:04}", existing + 1))
}

pub fn get_case(conn: &Connection, id: Uuid) -> Result<Case, DatabaseError> {
    let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?1");
    let raw = conn
        .query_row(&sql, params![id.to_string()], raw_case_from_row)
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Case".into(),
            id: id.to_string(),
        })?;
    case_from_raw(raw)
}

pub fn get_case_by_code(conn: &Connection, code: &str) -> Result<Case, DatabaseError> {
    let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE code = ?1");
    let raw = conn
        .query_row(&sql, params![code], raw_case_from_row)
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Case".into(),
            id: code.into(),
        })?;
    case_from_raw(raw)
}

pub fn list_cases_for_patient(
    conn: &Connection,
    patient_id: Uuid,
) -> Result<Vec<Case>, DatabaseError> {
    let sql = format!(
        "SELECT {CASE_COLUMNS} FROM cases WHERE patient_id = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], raw_case_from_row)?;

    let mut cases = Vec::new();
    for row in rows {
        cases.push(case_from_raw(row?)?);
    }
    Ok(cases)
}

pub fn set_case_status(
    conn: &Connection,
    id: Uuid,
    status: CaseStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_iso(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Case".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn store_assessment(
    conn: &Connection,
    id: Uuid,
    assessment: &Assessment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE cases SET assessment_diagnosis = ?1, chief_complaint = ?2,
         present_history = ?3, pain_score = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            assessment.diagnosis,
            assessment.chief_complaint,
            assessment.present_history,
            assessment.pain_score,
            now_iso(),
            id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn clear_assessment(conn: &Connection, id: Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE cases SET assessment_diagnosis = NULL, chief_complaint = NULL,
         present_history = NULL, pain_score = NULL, updated_at = ?1 WHERE id = ?2",
        params![now_iso(), id.to_string()],
    )?;
    Ok(())
}

pub fn store_soap_note(conn: &Connection, id: Uuid, note: &SoapNote) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE cases SET soap_subjective = ?1, soap_objective = ?2,
         soap_assessment = ?3, soap_plan = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            note.subjective,
            note.objective,
            note.assessment,
            note.plan,
            now_iso(),
            id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn set_reversed(
    conn: &Connection,
    id: Uuid,
    reason: &str,
    at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE cases SET is_reversed = 1, last_reversal_reason = ?1, last_reversal_at = ?2,
         updated_at = ?3 WHERE id = ?4",
        params![reason, at, now_iso(), id.to_string()],
    )?;
    Ok(())
}

pub fn clear_reversed(conn: &Connection, id: Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE cases SET is_reversed = 0, updated_at = ?1 WHERE id = ?2",
        params![now_iso(), id.to_string()],
    )?;
    Ok(())
}

pub fn link_case_appointment(
    conn: &Connection,
    case_id: Uuid,
    appointment_id: Option<Uuid>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE cases SET appointment_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            appointment_id.map(|a| a.to_string()),
            now_iso(),
            case_id.to_string(),
        ],
    )?;
    Ok(())
}

/// Null every case link pointing at the given appointment. Used when an
/// appointment is deleted so the case side never dangles.
pub fn unlink_appointment_refs(
    conn: &Connection,
    appointment_id: Uuid,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET appointment_id = NULL, updated_at = ?1 WHERE appointment_id = ?2",
        params![now_iso(), appointment_id.to_string()],
    )?;
    Ok(changed)
}

struct RawCase {
    id: String,
    code: String,
    patient_id: String,
    purpose: String,
    status: String,
    source_clinic: String,
    target_clinic: String,
    course_id: Option<String>,
    appointment_id: Option<String>,
    assessment_diagnosis: Option<String>,
    chief_complaint: Option<String>,
    present_history: Option<String>,
    pain_score: Option<u8>,
    soap_subjective: Option<String>,
    soap_objective: Option<String>,
    soap_assessment: Option<String>,
    soap_plan: Option<String>,
    is_reversed: bool,
    last_reversal_reason: Option<String>,
    last_reversal_at: Option<String>,
    created_by: String,
    created_at: String,
    updated_at: String,
}

fn raw_case_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCase> {
    Ok(RawCase {
        id: row.get(0)?,
        code: row.get(1)?,
        patient_id: row.get(2)?,
        purpose: row.get(3)?,
        status: row.get(4)?,
        source_clinic: row.get(5)?,
        target_clinic: row.get(6)?,
        course_id: row.get(7)?,
        appointment_id: row.get(8)?,
        assessment_diagnosis: row.get(9)?,
        chief_complaint: row.get(10)?,
        present_history: row.get(11)?,
        pain_score: row.get(12)?,
        soap_subjective: row.get(13)?,
        soap_objective: row.get(14)?,
        soap_assessment: row.get(15)?,
        soap_plan: row.get(16)?,
        is_reversed: row.get(17)?,
        last_reversal_reason: row.get(18)?,
        last_reversal_at: row.get(19)?,
        created_by: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

fn case_from_raw(raw: RawCase) -> Result<Case, DatabaseError> {
    let assessment = match (
        raw.assessment_diagnosis,
        raw.chief_complaint,
        raw.present_history,
        raw.pain_score,
    ) {
        (Some(diagnosis), Some(chief_complaint), Some(present_history), Some(pain_score)) => {
            Some(Assessment {
                diagnosis,
                chief_complaint,
                present_history,
                pain_score,
            })
        }
        _ => None,
    };

    let soap_note = match (
        raw.soap_subjective,
        raw.soap_objective,
        raw.soap_assessment,
        raw.soap_plan,
    ) {
        (Some(subjective), Some(objective), Some(assessment), Some(plan)) => Some(SoapNote {
            subjective,
            objective,
            assessment,
            plan,
        }),
        _ => None,
    };

    Ok(Case {
        id: parse_uuid(&raw.id)?,
        code: raw.code,
        patient_id: parse_uuid(&raw.patient_id)?,
        purpose: raw.purpose,
        status: CaseStatus::from_str(&raw.status)?,
        source_clinic: raw.source_clinic,
        target_clinic: raw.target_clinic,
        course_id: parse_opt_uuid(raw.course_id)?,
        appointment_id: parse_opt_uuid(raw.appointment_id)?,
        assessment,
        soap_note,
        is_reversed: raw.is_reversed,
        last_reversal_reason: raw.last_reversal_reason,
        last_reversal_at: raw.last_reversal_at,
        created_by: parse_uuid(&raw.created_by)?,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}
