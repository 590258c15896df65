use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{now_iso, parse_date, parse_opt_uuid, parse_time, parse_uuid, time_str};
use crate::db::DatabaseError;
use crate::models::enums::AppointmentStatus;
use crate::models::Appointment;

const APPOINTMENT_COLUMNS: &str = "id, patient_id, walk_in_name, clinician_id, clinic, date,
     start_time, end_time, status, case_id, course_id, auto_created_pn, note,
     cancel_reason, cancelled_by, cancelled_at, created_by, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, walk_in_name, clinician_id, clinic, date,
         start_time, end_time, status, case_id, course_id, auto_created_pn, note,
         cancel_reason, cancelled_by, cancelled_at, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            appt.id.to_string(),
            appt.patient_id.map(|p| p.to_string()),
            appt.walk_in_name,
            appt.clinician_id.to_string(),
            appt.clinic,
            appt.date.to_string(),
            time_str(appt.start_time),
            time_str(appt.end_time),
            appt.status.as_str(),
            appt.case_id.map(|c| c.to_string()),
            appt.course_id.map(|c| c.to_string()),
            appt.auto_created_pn,
            appt.note,
            appt.cancel_reason,
            appt.cancelled_by.map(|u| u.to_string()),
            appt.cancelled_at,
            appt.created_by.to_string(),
            appt.created_at,
            appt.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: Uuid) -> Result<Appointment, DatabaseError> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
    let raw = conn
        .query_row(&sql, params![id.to_string()], raw_appointment_from_row)
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: id.to_string(),
        })?;
    appointment_from_raw(raw)
}

pub fn set_appointment_status(
    conn: &Connection,
    id: Uuid,
    status: AppointmentStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_iso(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Cancel in one write: status, reason, actor and time together.
pub fn set_cancellation(
    conn: &Connection,
    id: Uuid,
    reason: &str,
    cancelled_by: Uuid,
) -> Result<(), DatabaseError> {
    let now = now_iso();
    let changed = conn.execute(
        "UPDATE appointments SET status = 'cancelled', cancel_reason = ?1, cancelled_by = ?2,
         cancelled_at = ?3, updated_at = ?3 WHERE id = ?4",
        params![reason, cancelled_by.to_string(), now, id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn link_appointment_case(
    conn: &Connection,
    appointment_id: Uuid,
    case_id: Uuid,
    auto_created: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE appointments SET case_id = ?1, auto_created_pn = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            case_id.to_string(),
            auto_created,
            now_iso(),
            appointment_id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn set_schedule(
    conn: &Connection,
    id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE appointments SET date = ?1, start_time = ?2, end_time = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            date.to_string(),
            time_str(start_time),
            time_str(end_time),
            now_iso(),
            id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn delete_appointment_row(conn: &Connection, id: Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM appointments WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Undelivered slots for a clinician on one date, for conflict checks.
pub fn list_pending_for_clinician(
    conn: &Connection,
    clinician_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE clinician_id = ?1 AND date = ?2 AND status IN ('scheduled', 'confirmed')
         ORDER BY start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![clinician_id.to_string(), date.to_string()],
        raw_appointment_from_row,
    )?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_raw(row?)?);
    }
    Ok(appointments)
}

pub fn list_appointments_for_patient(
    conn: &Connection,
    patient_id: Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE patient_id = ?1 ORDER BY date DESC, start_time DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], raw_appointment_from_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_raw(row?)?);
    }
    Ok(appointments)
}

struct RawAppointment {
    id: String,
    patient_id: Option<String>,
    walk_in_name: Option<String>,
    clinician_id: String,
    clinic: String,
    date: String,
    start_time: String,
    end_time: String,
    status: String,
    case_id: Option<String>,
    course_id: Option<String>,
    auto_created_pn: bool,
    note: Option<String>,
    cancel_reason: Option<String>,
    cancelled_by: Option<String>,
    cancelled_at: Option<String>,
    created_by: String,
    created_at: String,
    updated_at: String,
}

fn raw_appointment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAppointment> {
    Ok(RawAppointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        walk_in_name: row.get(2)?,
        clinician_id: row.get(3)?,
        clinic: row.get(4)?,
        date: row.get(5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        status: row.get(8)?,
        case_id: row.get(9)?,
        course_id: row.get(10)?,
        auto_created_pn: row.get(11)?,
        note: row.get(12)?,
        cancel_reason: row.get(13)?,
        cancelled_by: row.get(14)?,
        cancelled_at: row.get(15)?,
        created_by: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn appointment_from_raw(raw: RawAppointment) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: parse_uuid(&raw.id)?,
        patient_id: parse_opt_uuid(raw.patient_id)?,
        walk_in_name: raw.walk_in_name,
        clinician_id: parse_uuid(&raw.clinician_id)?,
        clinic: raw.clinic,
        date: parse_date(&raw.date)?,
        start_time: parse_time(&raw.start_time)?,
        end_time: parse_time(&raw.end_time)?,
        status: AppointmentStatus::from_str(&raw.status)?,
        case_id: parse_opt_uuid(raw.case_id)?,
        course_id: parse_opt_uuid(raw.course_id)?,
        auto_created_pn: raw.auto_created_pn,
        note: raw.note,
        cancel_reason: raw.cancel_reason,
        cancelled_by: parse_opt_uuid(raw.cancelled_by)?,
        cancelled_at: raw.cancelled_at,
        created_by: parse_uuid(&raw.created_by)?,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}
