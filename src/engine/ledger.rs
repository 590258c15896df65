//! Course session ledger — the only code path that moves a course's
//! counters. Every movement appends an immutable `course_usages` row, so
//! `SUM(session_delta)` always reconciles against `used_sessions`.
//!
//! Idempotency is enforced by scanning the usage log (at most one
//! unreturned USE per case), never by trusting caller intent: a retried
//! return is a reported-success no-op, and a re-issued use after a
//! completion reversal does not double-charge.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{Actor, EngineError};
use crate::db::repository::{
    get_course, insert_usage, now_iso, outstanding_use_count, update_course_counters,
};
use crate::models::enums::{CourseStatus, UsageKind};
use crate::models::CourseUsageEntry;

/// Consume one session from the course for the given case.
///
/// Returns `Ok(true)` if a USE entry was written, `Ok(false)` if the case
/// already holds an unreturned USE (retry / re-completion after reversal).
pub fn use_session(
    conn: &Connection,
    course_id: Uuid,
    case_id: Uuid,
    actor: &Actor,
) -> Result<bool, EngineError> {
    let tx = conn.unchecked_transaction()?;
    let written = apply_use(&tx, course_id, case_id, actor)?;
    tx.commit()?;
    Ok(written)
}

/// Give back the session consumed for the given case.
///
/// Returns `Ok(true)` if a RETURN entry was written, `Ok(false)` if no
/// unreturned USE exists for the case (double return tolerated).
pub fn return_session(
    conn: &Connection,
    course_id: Uuid,
    case_id: Uuid,
    actor: &Actor,
) -> Result<bool, EngineError> {
    let tx = conn.unchecked_transaction()?;
    let written = apply_return(&tx, course_id, case_id, actor)?;
    tx.commit()?;
    Ok(written)
}

/// Transaction-scoped body of [`use_session`]; also called by the state
/// machine inside its own transaction.
pub(crate) fn apply_use(
    conn: &Connection,
    course_id: Uuid,
    case_id: Uuid,
    actor: &Actor,
) -> Result<bool, EngineError> {
    if outstanding_use_count(conn, course_id, case_id)? > 0 {
        tracing::debug!(%case_id, "case already holds an unreturned use, skipping");
        return Ok(false);
    }

    let course = get_course(conn, course_id)?;
    if course.remaining_sessions < 1 {
        return Err(EngineError::InsufficientSessions {
            course_id,
            remaining: course.remaining_sessions,
        });
    }

    let used = course.used_sessions + 1;
    let remaining = course.remaining_sessions - 1;
    let status = if remaining == 0 {
        CourseStatus::Completed
    } else {
        course.status
    };

    update_course_counters(conn, course_id, used, remaining, status)?;
    insert_usage(
        conn,
        &ledger_entry(course_id, Some(case_id), UsageKind::Use, 1, None, actor),
    )?;

    if remaining == 0 {
        tracing::info!(%course_id, "last session consumed, course completed");
    }
    Ok(true)
}

/// Transaction-scoped body of [`return_session`].
pub(crate) fn apply_return(
    conn: &Connection,
    course_id: Uuid,
    case_id: Uuid,
    actor: &Actor,
) -> Result<bool, EngineError> {
    if outstanding_use_count(conn, course_id, case_id)? <= 0 {
        tracing::debug!(%case_id, "no unreturned use for case, nothing to give back");
        return Ok(false);
    }

    let course = get_course(conn, course_id)?;
    if course.used_sessions < 1 {
        return Err(EngineError::OverReturn { course_id });
    }

    let used = course.used_sessions - 1;
    let remaining = course.remaining_sessions + 1;
    let status = match course.status {
        CourseStatus::Completed | CourseStatus::Expired => {
            tracing::info!(%course_id, "sessions available again, course reactivated");
            CourseStatus::Active
        }
        other => other,
    };

    update_course_counters(conn, course_id, used, remaining, status)?;
    insert_usage(
        conn,
        &ledger_entry(course_id, Some(case_id), UsageKind::Return, -1, None, actor),
    )?;
    Ok(true)
}

/// Manual correction by a privileged actor. Bypasses case linkage but
/// still may not drive `used` or `remaining` negative.
pub fn adjust_sessions(
    conn: &Connection,
    course_id: Uuid,
    delta: i64,
    reason: &str,
    actor: &Actor,
) -> Result<(), EngineError> {
    if !actor.is_privileged() {
        return Err(EngineError::Forbidden {
            action: "manual session adjustment".into(),
        });
    }
    if reason.trim().is_empty() {
        return Err(EngineError::MissingReason);
    }
    if delta == 0 {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;

    let course = get_course(&tx, course_id)?;
    let used = i64::from(course.used_sessions) + delta;
    if used < 0 {
        return Err(EngineError::OverReturn { course_id });
    }
    let remaining = i64::from(course.total_sessions) - used;
    if remaining < 0 {
        return Err(EngineError::InsufficientSessions {
            course_id,
            remaining: course.remaining_sessions,
        });
    }

    let status = if remaining == 0 {
        CourseStatus::Completed
    } else if matches!(course.status, CourseStatus::Completed | CourseStatus::Expired) {
        CourseStatus::Active
    } else {
        course.status
    };

    update_course_counters(&tx, course_id, used as u32, remaining as u32, status)?;
    insert_usage(
        &tx,
        &ledger_entry(
            course_id,
            None,
            UsageKind::Adjust,
            delta,
            Some(reason.to_string()),
            actor,
        ),
    )?;

    tx.commit()?;
    tracing::info!(%course_id, delta, "manual session adjustment applied");
    Ok(())
}

/// Flip ACTIVE courses past their expiry date to EXPIRED. Returns the
/// number of courses touched.
pub fn expire_courses(conn: &Connection, as_of: NaiveDate) -> Result<usize, EngineError> {
    let changed = conn.execute(
        "UPDATE courses SET status = 'expired'
         WHERE status = 'active' AND expiry_date IS NOT NULL AND expiry_date < ?1",
        params![as_of.to_string()],
    )?;
    if changed > 0 {
        tracing::info!(count = changed, "courses expired");
    }
    Ok(changed)
}

fn ledger_entry(
    course_id: Uuid,
    case_id: Option<Uuid>,
    kind: UsageKind,
    delta: i64,
    note: Option<String>,
    actor: &Actor,
) -> CourseUsageEntry {
    CourseUsageEntry {
        id: Uuid::new_v4(),
        course_id,
        case_id,
        bill_id: None,
        kind,
        session_delta: delta,
        usage_date: Utc::now().date_naive(),
        note,
        created_by: actor.id,
        created_at: now_iso(),
    }
}
