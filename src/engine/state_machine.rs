//! Case state machine — the single authority for PN case status changes.
//!
//! Every entry point (calendar, dashboard, referral screen) funnels a
//! requested transition through [`transition_case`]; the legal edges and
//! their side effects live in one table-shaped `match` instead of being
//! re-implemented per screen. Each call is one transaction: status
//! update, ledger movement, history entry and appointment propagation
//! commit or roll back together.
//!
//! Lifecycle: PENDING → ACCEPTED → COMPLETED, with CANCELLED reachable
//! from PENDING and ACCEPTED. Two privileged reversals walk backwards:
//! ACCEPTED → PENDING (undoes acceptance, returns any consumed session)
//! and COMPLETED → ACCEPTED (flags the case reversed, keeps the session
//! spent).

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{audit, bridge, ledger, Actor, EngineError};
use crate::config::EngineConfig;
use crate::db::repository::{
    clear_assessment, clear_reversed, get_case, now_iso, set_case_status, set_reversed,
    store_assessment, store_soap_note,
};
use crate::models::enums::CaseStatus;
use crate::models::{Assessment, Case, SoapNote};

// ─── Request/response types ───────────────────────────────────────────────────

/// Optional payload accompanying a transition request. Which parts are
/// required depends on the edge being taken (see module docs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub reason: Option<String>,
    pub assessment: Option<Assessment>,
    pub soap_note: Option<SoapNote>,
}

impl TransitionPayload {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Parse a payload as submitted by a UI request builder.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub new_status: CaseStatus,
    pub history_entry_id: Uuid,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

/// Drive a case to `target`, applying the edge's side effects atomically.
pub fn transition_case(
    conn: &Connection,
    cfg: &EngineConfig,
    case_id: Uuid,
    target: CaseStatus,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    let tx = conn.unchecked_transaction()?;
    let outcome = apply_transition(&tx, cfg, case_id, target, actor, payload)?;
    tx.commit()?;
    Ok(outcome)
}

/// Transaction-scoped body of [`transition_case`]; also called by the
/// bridge inside its own transaction.
pub(crate) fn apply_transition(
    conn: &Connection,
    cfg: &EngineConfig,
    case_id: Uuid,
    target: CaseStatus,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    let case = get_case(conn, case_id)?;

    use CaseStatus::*;
    match (case.status, target) {
        (Pending, Accepted) => accept(conn, cfg, &case, actor, payload),
        (Pending, Cancelled) => cancel_from_pending(conn, &case, actor, payload),
        (Accepted, Completed) => complete(conn, &case, actor, payload),
        (Accepted, Cancelled) => cancel_from_accepted(conn, &case, actor, payload),
        (Accepted, Pending) => reverse_acceptance(conn, &case, actor, payload),
        (Completed, Accepted) => reverse_completion(conn, &case, actor, payload),
        (from, to) => Err(EngineError::InvalidTransition { from, to }),
    }
}

// ─── Edges ────────────────────────────────────────────────────────────────────

fn accept(
    conn: &Connection,
    cfg: &EngineConfig,
    case: &Case,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    let assessment_required = case.source_clinic != case.target_clinic
        && case.target_clinic != cfg.no_assessment_clinic;

    match (&payload.assessment, assessment_required) {
        (Some(assessment), _) => {
            validate_assessment(assessment)?;
            store_assessment(conn, case.id, assessment)?;
        }
        (None, true) => {
            return Err(EngineError::IncompleteAssessment {
                missing: "diagnosis, chief_complaint, present_history, pain_score".into(),
            })
        }
        (None, false) => {}
    }

    let reason = payload.reason.as_deref().unwrap_or("Accepted");
    finish(conn, case, CaseStatus::Accepted, actor, reason, false)
}

fn cancel_from_pending(
    conn: &Connection,
    case: &Case,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    let reason = required_reason(payload)?;
    finish(conn, case, CaseStatus::Cancelled, actor, reason, false)
}

fn complete(
    conn: &Connection,
    case: &Case,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    let soap = payload
        .soap_note
        .as_ref()
        .ok_or_else(|| EngineError::IncompleteSoap {
            missing: "subjective, objective, assessment, plan".into(),
        })?;
    validate_soap(soap)?;
    store_soap_note(conn, case.id, soap)?;

    // After a completion reversal this finds the original unreturned USE
    // and writes nothing, so re-completion never double-charges.
    if let Some(course_id) = case.course_id {
        ledger::apply_use(conn, course_id, case.id, actor)?;
    }

    if case.is_reversed {
        clear_reversed(conn, case.id)?;
    }

    let reason = payload.reason.as_deref().unwrap_or("Completed");
    finish(conn, case, CaseStatus::Completed, actor, reason, false)
}

fn cancel_from_accepted(
    conn: &Connection,
    case: &Case,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    let reason = required_reason(payload)?;

    if let Some(course_id) = case.course_id {
        ledger::apply_return(conn, course_id, case.id, actor)?;
    }

    if let Some(appointment_id) = case.appointment_id {
        bridge::cancel_linked_appointment(conn, case, appointment_id, actor)?;
    }

    if case.is_reversed {
        clear_reversed(conn, case.id)?;
    }

    finish(conn, case, CaseStatus::Cancelled, actor, reason, false)
}

fn reverse_acceptance(
    conn: &Connection,
    case: &Case,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    require_privilege(actor, "acceptance reversal")?;
    let reason = required_reason(payload)?;

    if let Some(course_id) = case.course_id {
        ledger::apply_return(conn, course_id, case.id, actor)?;
    }
    clear_assessment(conn, case.id)?;
    if case.is_reversed {
        clear_reversed(conn, case.id)?;
    }

    finish(conn, case, CaseStatus::Pending, actor, reason, true)
}

fn reverse_completion(
    conn: &Connection,
    case: &Case,
    actor: &Actor,
    payload: &TransitionPayload,
) -> Result<TransitionOutcome, EngineError> {
    require_privilege(actor, "completion reversal")?;
    let reason = required_reason(payload)?;

    // The consumed session stays spent: only a subsequent cancellation or
    // acceptance reversal gives it back.
    set_reversed(conn, case.id, reason, &now_iso())?;

    finish(conn, case, CaseStatus::Accepted, actor, reason, true)
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

fn finish(
    conn: &Connection,
    case: &Case,
    new_status: CaseStatus,
    actor: &Actor,
    reason: &str,
    is_reversal: bool,
) -> Result<TransitionOutcome, EngineError> {
    set_case_status(conn, case.id, new_status)?;
    let history_entry_id =
        audit::record_transition(conn, case.id, case.status, new_status, actor, reason, is_reversal)?;
    tracing::info!(
        case = %case.code,
        from = %case.status,
        to = %new_status,
        "case transitioned"
    );
    Ok(TransitionOutcome {
        new_status,
        history_entry_id,
    })
}

fn required_reason(payload: &TransitionPayload) -> Result<&str, EngineError> {
    payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or(EngineError::MissingReason)
}

fn require_privilege(actor: &Actor, action: &str) -> Result<(), EngineError> {
    if actor.is_privileged() {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            action: action.into(),
        })
    }
}

fn validate_assessment(assessment: &Assessment) -> Result<(), EngineError> {
    let mut missing = Vec::new();
    if assessment.diagnosis.trim().is_empty() {
        missing.push("diagnosis");
    }
    if assessment.chief_complaint.trim().is_empty() {
        missing.push("chief_complaint");
    }
    if assessment.present_history.trim().is_empty() {
        missing.push("present_history");
    }
    if assessment.pain_score > 10 {
        missing.push("pain_score (0-10)");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::IncompleteAssessment {
            missing: missing.join(", "),
        })
    }
}

fn validate_soap(soap: &SoapNote) -> Result<(), EngineError> {
    let mut missing = Vec::new();
    if soap.subjective.trim().is_empty() {
        missing.push("subjective");
    }
    if soap.objective.trim().is_empty() {
        missing.push("objective");
    }
    if soap.assessment.trim().is_empty() {
        missing.push("assessment");
    }
    if soap.plan.trim().is_empty() {
        missing.push("plan");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::IncompleteSoap {
            missing: missing.join(", "),
        })
    }
}
