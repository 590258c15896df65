use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_date, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::UsageKind;
use crate::models::CourseUsageEntry;

/// Append one ledger row. Entries are never updated or deleted.
pub fn insert_usage(conn: &Connection, entry: &CourseUsageEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO course_usages (id, course_id, case_id, bill_id, kind, session_delta,
         usage_date, note, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id.to_string(),
            entry.course_id.to_string(),
            entry.case_id.map(|c| c.to_string()),
            entry.bill_id.map(|b| b.to_string()),
            entry.kind.as_str(),
            entry.session_delta,
            entry.usage_date.to_string(),
            entry.note,
            entry.created_by.to_string(),
            entry.created_at,
        ],
    )?;
    Ok(())
}

pub fn usage_for_course(
    conn: &Connection,
    course_id: Uuid,
) -> Result<Vec<CourseUsageEntry>, DatabaseError> {
    usage_query(
        conn,
        "SELECT id, course_id, case_id, bill_id, kind, session_delta, usage_date, note,
                created_by, created_at
         FROM course_usages WHERE course_id = ?1 ORDER BY created_at ASC, rowid ASC",
        &course_id.to_string(),
    )
}

pub fn usage_for_case(
    conn: &Connection,
    case_id: Uuid,
) -> Result<Vec<CourseUsageEntry>, DatabaseError> {
    usage_query(
        conn,
        "SELECT id, course_id, case_id, bill_id, kind, session_delta, usage_date, note,
                created_by, created_at
         FROM course_usages WHERE case_id = ?1 ORDER BY created_at ASC, rowid ASC",
        &case_id.to_string(),
    )
}

/// Number of USE entries for the case not yet matched by a RETURN.
/// The idempotency checks in the ledger rely on this scan, never on
/// caller intent.
pub fn outstanding_use_count(
    conn: &Connection,
    course_id: Uuid,
    case_id: Uuid,
) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COALESCE(SUM(CASE kind WHEN 'use' THEN 1 WHEN 'return' THEN -1 ELSE 0 END), 0)
         FROM course_usages WHERE course_id = ?1 AND case_id = ?2",
        params![course_id.to_string(), case_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Running sum of signed deltas for a course. Must equal the course's
/// `used_sessions` counter at all times.
pub fn delta_sum(conn: &Connection, course_id: Uuid) -> Result<i64, DatabaseError> {
    let sum: i64 = conn.query_row(
        "SELECT COALESCE(SUM(session_delta), 0) FROM course_usages WHERE course_id = ?1",
        params![course_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(sum)
}

fn usage_query(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Vec<CourseUsageEntry>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, course_id, case_id, bill_id, kind, delta, usage_date, note, created_by, created_at) =
            row?;
        entries.push(CourseUsageEntry {
            id: parse_uuid(&id)?,
            course_id: parse_uuid(&course_id)?,
            case_id: parse_opt_uuid(case_id)?,
            bill_id: parse_opt_uuid(bill_id)?,
            kind: UsageKind::from_str(&kind)?,
            session_delta: delta,
            usage_date: parse_date(&usage_date)?,
            note,
            created_by: parse_uuid(&created_by)?,
            created_at,
        });
    }
    Ok(entries)
}
