use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{now_iso, parse_date, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::CourseStatus;
use crate::models::{Course, NewCourse};

const COURSE_COLUMNS: &str = "id, patient_id, clinic, name, total_sessions, used_sessions,
     remaining_sessions, price, paid_amount, purchase_date, expiry_date, status,
     created_by, created_at";

/// Record a course purchase: all sessions start unconsumed.
pub fn create_course(
    conn: &Connection,
    new_course: &NewCourse,
    created_by: Uuid,
) -> Result<Course, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO courses (id, patient_id, clinic, name, total_sessions, used_sessions,
         remaining_sessions, price, paid_amount, purchase_date, expiry_date, status,
         created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?5, ?6, ?7, ?8, ?9, 'active', ?10, ?11)",
        params![
            id.to_string(),
            new_course.patient_id.to_string(),
            new_course.clinic,
            new_course.name,
            new_course.total_sessions,
            new_course.price,
            new_course.paid_amount,
            new_course.purchase_date.to_string(),
            new_course.expiry_date.map(|d| d.to_string()),
            created_by.to_string(),
            now_iso(),
        ],
    )?;
    get_course(conn, id)
}

pub fn get_course(conn: &Connection, id: Uuid) -> Result<Course, DatabaseError> {
    let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1");
    let raw = conn
        .query_row(&sql, params![id.to_string()], raw_course_from_row)
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Course".into(),
            id: id.to_string(),
        })?;
    course_from_raw(raw)
}

pub fn list_courses_for_patient(
    conn: &Connection,
    patient_id: Uuid,
) -> Result<Vec<Course>, DatabaseError> {
    let sql = format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE patient_id = ?1 ORDER BY purchase_date DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], raw_course_from_row)?;

    let mut courses = Vec::new();
    for row in rows {
        courses.push(course_from_raw(row?)?);
    }
    Ok(courses)
}

/// Apply new counter values and status in one statement. The table CHECK
/// rejects any write where `total != used + remaining` or a counter goes
/// negative, so a ledger bug cannot persist inconsistent counters.
pub fn update_course_counters(
    conn: &Connection,
    id: Uuid,
    used: u32,
    remaining: u32,
    status: CourseStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE courses SET used_sessions = ?1, remaining_sessions = ?2, status = ?3
         WHERE id = ?4",
        params![used, remaining, status.as_str(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Course".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn set_course_status(
    conn: &Connection,
    id: Uuid,
    status: CourseStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE courses SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Course".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct RawCourse {
    id: String,
    patient_id: String,
    clinic: String,
    name: String,
    total_sessions: u32,
    used_sessions: u32,
    remaining_sessions: u32,
    price: f64,
    paid_amount: f64,
    purchase_date: String,
    expiry_date: Option<String>,
    status: String,
    created_by: String,
    created_at: String,
}

fn raw_course_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCourse> {
    Ok(RawCourse {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        clinic: row.get(2)?,
        name: row.get(3)?,
        total_sessions: row.get(4)?,
        used_sessions: row.get(5)?,
        remaining_sessions: row.get(6)?,
        price: row.get(7)?,
        paid_amount: row.get(8)?,
        purchase_date: row.get(9)?,
        expiry_date: row.get(10)?,
        status: row.get(11)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn course_from_raw(raw: RawCourse) -> Result<Course, DatabaseError> {
    Ok(Course {
        id: parse_uuid(&raw.id)?,
        patient_id: parse_uuid(&raw.patient_id)?,
        clinic: raw.clinic,
        name: raw.name,
        total_sessions: raw.total_sessions,
        used_sessions: raw.used_sessions,
        remaining_sessions: raw.remaining_sessions,
        price: raw.price,
        paid_amount: raw.paid_amount,
        purchase_date: parse_date(&raw.purchase_date)?,
        expiry_date: raw.expiry_date.as_deref().map(parse_date).transpose()?,
        status: CourseStatus::from_str(&raw.status)?,
        created_by: parse_uuid(&raw.created_by)?,
        created_at: raw.created_at,
    })
}
