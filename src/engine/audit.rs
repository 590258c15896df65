//! Status-history audit trail — append-only recorder for case status
//! changes. Entries are written inside the caller's transaction and never
//! mutated afterward.

use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::Actor;
use crate::db::repository::now_iso;
use crate::db::DatabaseError;
use crate::models::enums::CaseStatus;
use crate::models::StatusHistoryEntry;

/// Append one history entry and return its id.
pub fn record_transition(
    conn: &Connection,
    case_id: Uuid,
    old_status: CaseStatus,
    new_status: CaseStatus,
    actor: &Actor,
    reason: &str,
    is_reversal: bool,
) -> Result<Uuid, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO case_status_history (id, case_id, old_status, new_status, actor_id,
         reason, is_reversal, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.to_string(),
            case_id.to_string(),
            old_status.as_str(),
            new_status.as_str(),
            actor.id.to_string(),
            reason,
            is_reversal,
            now_iso(),
        ],
    )?;
    Ok(id)
}

/// Full trail for a case, oldest first.
pub fn history_for_case(
    conn: &Connection,
    case_id: Uuid,
) -> Result<Vec<StatusHistoryEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, old_status, new_status, actor_id, reason, is_reversal, created_at
         FROM case_status_history WHERE case_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![case_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, bool>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, case_id, old_status, new_status, actor_id, reason, is_reversal, created_at) = row?;
        entries.push(StatusHistoryEntry {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            case_id: Uuid::parse_str(&case_id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            old_status: CaseStatus::from_str(&old_status)?,
            new_status: CaseStatus::from_str(&new_status)?,
            actor_id: Uuid::parse_str(&actor_id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            reason,
            is_reversal,
            created_at,
        });
    }
    Ok(entries)
}
