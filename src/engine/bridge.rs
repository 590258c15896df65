//! Appointment bridge — the single authority for keeping an Appointment
//! and its linked PN case status-consistent, in both directions.
//!
//! Booking can auto-create a PENDING case for a known patient; completing
//! or cancelling an appointment drives the linked case through the state
//! machine; cancelling a case walks back to a still-pending appointment.
//! Propagation cannot loop: each side is marked before the other is
//! driven, and the drive skips anything no longer pending.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state_machine::{apply_transition, TransitionPayload};
use super::{
    Actor, EngineError, REASON_ACCEPTED_FROM_APPOINTMENT, REASON_CANCELLED_FROM_APPOINTMENT,
    REASON_CANCELLED_FROM_CASE, REASON_COMPLETED_FROM_APPOINTMENT,
};
use crate::config::EngineConfig;
use crate::db::repository::{
    create_case, delete_appointment_row, get_appointment, get_case, get_clinician,
    insert_appointment, link_appointment_case, link_case_appointment, list_pending_for_clinician,
    now_iso, set_appointment_status, set_cancellation, set_schedule, unlink_appointment_refs,
};
use crate::db::DatabaseError;
use crate::models::enums::{AppointmentStatus, CaseStatus};
use crate::models::{Appointment, Assessment, Case, NewCase, SoapNote};

// ─── Request/response types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    /// None books an anonymous walk-in (see `walk_in_name`).
    pub patient_id: Option<Uuid>,
    pub walk_in_name: Option<String>,
    pub clinician_id: Uuid,
    pub clinic: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub note: Option<String>,
    pub course_id: Option<Uuid>,
    /// Create and link a PENDING case at booking. Ignored for walk-ins.
    pub auto_create_case: bool,
}

impl BookingRequest {
    /// Parse a booking as submitted by a UI request builder.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingOutcome {
    pub appointment_id: Uuid,
    pub case_id: Option<Uuid>,
    /// Overlapping undelivered slots for the same clinician. Advisory:
    /// the booking is still created; the caller decides what to do.
    pub conflicts: Vec<ScheduleConflict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConflict {
    pub appointment_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
}

/// Clinical payloads collected in the same user action that completes an
/// appointment; forwarded to the case hops that need them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub assessment: Option<Assessment>,
    pub soap_note: SoapNote,
}

// ─── Booking ──────────────────────────────────────────────────────────────────

/// Book an appointment, reporting conflicts and auto-creating a linked
/// case when requested for a known patient.
pub fn book_appointment(
    conn: &Connection,
    req: &BookingRequest,
    actor: &Actor,
) -> Result<BookingOutcome, EngineError> {
    validate_times(req.start_time, req.end_time)?;
    if req.patient_id.is_none() && req.walk_in_name.as_deref().map_or(true, |n| n.trim().is_empty())
    {
        return Err(EngineError::ScheduleInvalid(
            "either a patient or a walk-in name is required".into(),
        ));
    }

    let tx = conn.unchecked_transaction()?;

    let conflicts = find_conflicts(&tx, req.clinician_id, req.date, req.start_time, req.end_time, None)?;
    if !conflicts.is_empty() {
        tracing::warn!(
            clinician = %req.clinician_id,
            date = %req.date,
            count = conflicts.len(),
            "booking overlaps existing slots"
        );
    }

    let now = now_iso();
    let appointment = Appointment {
        id: Uuid::new_v4(),
        patient_id: req.patient_id,
        walk_in_name: req.walk_in_name.clone(),
        clinician_id: req.clinician_id,
        clinic: req.clinic.clone(),
        date: req.date,
        start_time: req.start_time,
        end_time: req.end_time,
        status: AppointmentStatus::Scheduled,
        case_id: None,
        course_id: req.course_id,
        auto_created_pn: false,
        note: req.note.clone(),
        cancel_reason: None,
        cancelled_by: None,
        cancelled_at: None,
        created_by: actor.id,
        created_at: now.clone(),
        updated_at: now,
    };
    insert_appointment(&tx, &appointment)?;

    let mut case_id = None;
    if req.auto_create_case {
        if let Some(patient_id) = req.patient_id {
            let case = auto_create_case(&tx, req, patient_id, appointment.id, actor)?;
            case_id = Some(case.id);
        } else {
            tracing::debug!(appointment = %appointment.id, "walk-in booking, no case auto-created");
        }
    }

    tx.commit()?;
    Ok(BookingOutcome {
        appointment_id: appointment.id,
        case_id,
        conflicts,
    })
}

fn auto_create_case(
    conn: &Connection,
    req: &BookingRequest,
    patient_id: Uuid,
    appointment_id: Uuid,
    actor: &Actor,
) -> Result<Case, EngineError> {
    let clinician = get_clinician(conn, req.clinician_id)?;
    let mut purpose = format!(
        "Physiotherapy appointment with {} on {}",
        clinician.name, req.date
    );
    if let Some(note) = req.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        purpose.push_str(": ");
        purpose.push_str(note);
    }

    let case = create_case(
        conn,
        &NewCase {
            patient_id,
            purpose,
            source_clinic: req.clinic.clone(),
            target_clinic: req.clinic.clone(),
            course_id: req.course_id,
        },
        actor.id,
    )?;
    link_case_appointment(conn, case.id, Some(appointment_id))?;
    link_appointment_case(conn, appointment_id, case.id, true)?;

    tracing::info!(case = %case.code, appointment = %appointment_id, "case auto-created from booking");
    Ok(case)
}

// ─── Conflict detection ───────────────────────────────────────────────────────

/// All undelivered slots for the clinician on `date` overlapping the
/// given range. Every conflict is reported, not just the first.
pub fn find_conflicts(
    conn: &Connection,
    clinician_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    exclude: Option<Uuid>,
) -> Result<Vec<ScheduleConflict>, EngineError> {
    let pending = list_pending_for_clinician(conn, clinician_id, date)?;
    Ok(pending
        .into_iter()
        .filter(|appt| Some(appt.id) != exclude)
        .filter(|appt| start_time < appt.end_time && end_time > appt.start_time)
        .map(|appt| ScheduleConflict {
            appointment_id: appt.id,
            patient_id: appt.patient_id,
            date: appt.date,
            start_time: appt.start_time,
            end_time: appt.end_time,
            status: appt.status,
        })
        .collect())
}

// ─── Appointment → case propagation ───────────────────────────────────────────

/// Complete an appointment and drive its linked case to COMPLETED,
/// returning the case's resulting status when one is linked.
pub fn complete_appointment(
    conn: &Connection,
    cfg: &EngineConfig,
    appointment_id: Uuid,
    payload: &CompletionPayload,
    actor: &Actor,
) -> Result<Option<CaseStatus>, EngineError> {
    let tx = conn.unchecked_transaction()?;

    let appointment = get_appointment(&tx, appointment_id)?;
    if appointment.status.is_terminal() {
        return Err(EngineError::InvalidAppointmentTransition {
            from: appointment.status,
            to: AppointmentStatus::Completed,
        });
    }
    set_appointment_status(&tx, appointment_id, AppointmentStatus::Completed)?;

    let mut case_status = None;
    if let Some(case_id) = appointment.case_id {
        let case = linked_case(&tx, appointment_id, case_id)?;
        case_status = Some(drive_case_to_completed(&tx, cfg, &case, payload, actor)?);
    }

    tx.commit()?;
    Ok(case_status)
}

fn drive_case_to_completed(
    conn: &Connection,
    cfg: &EngineConfig,
    case: &Case,
    payload: &CompletionPayload,
    actor: &Actor,
) -> Result<CaseStatus, EngineError> {
    let mut status = case.status;

    if status == CaseStatus::Pending {
        let hop = TransitionPayload {
            reason: Some(REASON_ACCEPTED_FROM_APPOINTMENT.into()),
            assessment: payload.assessment.clone(),
            soap_note: None,
        };
        status = apply_transition(conn, cfg, case.id, CaseStatus::Accepted, actor, &hop)?.new_status;
    }

    match status {
        CaseStatus::Accepted => {
            let hop = TransitionPayload {
                reason: Some(REASON_COMPLETED_FROM_APPOINTMENT.into()),
                assessment: None,
                soap_note: Some(payload.soap_note.clone()),
            };
            Ok(apply_transition(conn, cfg, case.id, CaseStatus::Completed, actor, &hop)?.new_status)
        }
        CaseStatus::Completed => Ok(status),
        other => {
            tracing::warn!(case = %case.code, status = %other, "linked case not completable, left as is");
            Ok(other)
        }
    }
}

/// Cancel an appointment and drive its linked, still-open case to
/// CANCELLED (returning any consumed session along the way).
pub fn cancel_appointment(
    conn: &Connection,
    cfg: &EngineConfig,
    appointment_id: Uuid,
    reason: &str,
    actor: &Actor,
) -> Result<Option<CaseStatus>, EngineError> {
    if reason.trim().is_empty() {
        return Err(EngineError::MissingReason);
    }

    let tx = conn.unchecked_transaction()?;

    let appointment = get_appointment(&tx, appointment_id)?;
    if appointment.status.is_terminal() {
        return Err(EngineError::InvalidAppointmentTransition {
            from: appointment.status,
            to: AppointmentStatus::Cancelled,
        });
    }
    // Mark the appointment first so the case-side propagation sees a
    // non-pending slot and stops.
    set_cancellation(&tx, appointment_id, reason, actor.id)?;

    let mut case_status = None;
    if let Some(case_id) = appointment.case_id {
        let case = linked_case(&tx, appointment_id, case_id)?;
        case_status = Some(match case.status {
            CaseStatus::Pending | CaseStatus::Accepted => {
                apply_transition(
                    &tx,
                    cfg,
                    case.id,
                    CaseStatus::Cancelled,
                    actor,
                    &TransitionPayload::with_reason(REASON_CANCELLED_FROM_APPOINTMENT),
                )?
                .new_status
            }
            terminal => terminal,
        });
    }

    tx.commit()?;
    Ok(case_status)
}

// ─── Case → appointment propagation ───────────────────────────────────────────

/// Cancel the appointment linked to a case while the slot is still
/// pending. Called by the state machine inside its transaction.
pub(crate) fn cancel_linked_appointment(
    conn: &Connection,
    case: &Case,
    appointment_id: Uuid,
    actor: &Actor,
) -> Result<(), EngineError> {
    match get_appointment(conn, appointment_id) {
        Ok(appointment) if appointment.status.is_pending() => {
            set_cancellation(conn, appointment_id, REASON_CANCELLED_FROM_CASE, actor.id)?;
            tracing::info!(case = %case.code, appointment = %appointment_id, "linked appointment cancelled");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(DatabaseError::NotFound { .. }) => {
            tracing::warn!(case = %case.code, appointment = %appointment_id, "case links a missing appointment");
            Err(EngineError::LinkageInconsistency(format!(
                "case {} links appointment {appointment_id} which does not exist",
                case.code
            )))
        }
        Err(e) => Err(e.into()),
    }
}

// ─── Appointment lifecycle ────────────────────────────────────────────────────

pub fn confirm_appointment(
    conn: &Connection,
    appointment_id: Uuid,
    _actor: &Actor,
) -> Result<(), EngineError> {
    let appointment = get_appointment(conn, appointment_id)?;
    if appointment.status != AppointmentStatus::Scheduled {
        return Err(EngineError::InvalidAppointmentTransition {
            from: appointment.status,
            to: AppointmentStatus::Confirmed,
        });
    }
    set_appointment_status(conn, appointment_id, AppointmentStatus::Confirmed)?;
    Ok(())
}

pub fn start_appointment(
    conn: &Connection,
    appointment_id: Uuid,
    _actor: &Actor,
) -> Result<(), EngineError> {
    let appointment = get_appointment(conn, appointment_id)?;
    if !appointment.status.is_pending() {
        return Err(EngineError::InvalidAppointmentTransition {
            from: appointment.status,
            to: AppointmentStatus::InProgress,
        });
    }
    set_appointment_status(conn, appointment_id, AppointmentStatus::InProgress)?;
    Ok(())
}

pub fn mark_no_show(
    conn: &Connection,
    appointment_id: Uuid,
    _actor: &Actor,
) -> Result<(), EngineError> {
    let appointment = get_appointment(conn, appointment_id)?;
    if !appointment.status.is_pending() {
        return Err(EngineError::InvalidAppointmentTransition {
            from: appointment.status,
            to: AppointmentStatus::NoShow,
        });
    }
    set_appointment_status(conn, appointment_id, AppointmentStatus::NoShow)?;
    Ok(())
}

/// Move a still-pending appointment to a new slot, re-reporting conflicts.
pub fn reschedule_appointment(
    conn: &Connection,
    appointment_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    _actor: &Actor,
) -> Result<Vec<ScheduleConflict>, EngineError> {
    validate_times(start_time, end_time)?;

    let tx = conn.unchecked_transaction()?;

    let appointment = get_appointment(&tx, appointment_id)?;
    if !appointment.status.is_pending() {
        return Err(EngineError::ScheduleInvalid(format!(
            "appointment is {} and can no longer be moved",
            appointment.status
        )));
    }

    let conflicts = find_conflicts(
        &tx,
        appointment.clinician_id,
        date,
        start_time,
        end_time,
        Some(appointment_id),
    )?;
    set_schedule(&tx, appointment_id, date, start_time, end_time)?;

    tx.commit()?;
    Ok(conflicts)
}

/// Delete an appointment outright, nulling any case link pointing at it
/// instead of cascading.
pub fn delete_appointment(conn: &Connection, appointment_id: Uuid) -> Result<(), EngineError> {
    let tx = conn.unchecked_transaction()?;

    // Existence check first so a missing id reports NotFound, not a no-op.
    get_appointment(&tx, appointment_id)?;
    let unlinked = unlink_appointment_refs(&tx, appointment_id)?;
    if unlinked > 0 {
        tracing::info!(appointment = %appointment_id, cases = unlinked, "case links nulled before delete");
    }
    delete_appointment_row(&tx, appointment_id)?;

    tx.commit()?;
    Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn validate_times(start_time: NaiveTime, end_time: NaiveTime) -> Result<(), EngineError> {
    if end_time <= start_time {
        return Err(EngineError::ScheduleInvalid(format!(
            "end time {end_time} is not after start time {start_time}"
        )));
    }
    Ok(())
}

fn linked_case(
    conn: &Connection,
    appointment_id: Uuid,
    case_id: Uuid,
) -> Result<Case, EngineError> {
    match get_case(conn, case_id) {
        Ok(case) => Ok(case),
        Err(DatabaseError::NotFound { .. }) => {
            tracing::warn!(appointment = %appointment_id, case = %case_id, "appointment links a missing case");
            Err(EngineError::LinkageInconsistency(format!(
                "appointment {appointment_id} links case {case_id} which does not exist"
            )))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::{
        create_course, create_patient, create_clinician, get_course, insert_clinic,
        usage_for_case,
    };
    use crate::engine::audit::history_for_case;
    use crate::engine::state_machine::transition_case;
    use crate::engine::ActorRole;
    use crate::models::enums::UsageKind;
    use crate::models::{NewCourse, NewPatient, Patient};

    struct Fixture {
        conn: rusqlite::Connection,
        cfg: EngineConfig,
        patient: Patient,
        clinician_id: Uuid,
        staff: Actor,
    }

    fn setup() -> Fixture {
        let conn = open_memory_database().unwrap();
        insert_clinic(&conn, "CL001", "HQ").unwrap();
        insert_clinic(&conn, "CL002", "Riverside").unwrap();
        let patient = create_patient(
            &conn,
            &NewPatient {
                first_name: "Anong".into(),
                last_name: "T.".into(),
                phone: None,
                home_clinic: Some("CL001".into()),
            },
        )
        .unwrap();
        let clinician = create_clinician(&conn, "Khun Lek", "CL001", Some("MSK")).unwrap();
        Fixture {
            conn,
            cfg: EngineConfig::default(),
            patient,
            clinician_id: clinician.id,
            staff: Actor::new(Uuid::new_v4(), "front-desk", ActorRole::Ordinary),
        }
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn booking(f: &Fixture, start: NaiveTime, end: NaiveTime, auto_create: bool) -> BookingRequest {
        BookingRequest {
            patient_id: Some(f.patient.id),
            walk_in_name: None,
            clinician_id: f.clinician_id,
            clinic: "CL001".into(),
            date: NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            start_time: start,
            end_time: end,
            note: None,
            course_id: None,
            auto_create_case: auto_create,
        }
    }

    fn soap() -> SoapNote {
        SoapNote {
            subjective: "Stiff in the morning".into(),
            objective: "ROM improved".into(),
            assessment: "On track".into(),
            plan: "Two more sessions".into(),
        }
    }

    #[test]
    fn booking_with_auto_create_links_both_sides() {
        let f = setup();

        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), true), &f.staff)
            .unwrap();

        let case_id = out.case_id.expect("case should be auto-created");
        let case = get_case(&f.conn, case_id).unwrap();
        assert_eq!(case.status, CaseStatus::Pending);
        assert_eq!(case.appointment_id, Some(out.appointment_id));
        assert!(case.purpose.contains("Khun Lek"));

        let appointment = get_appointment(&f.conn, out.appointment_id).unwrap();
        assert_eq!(appointment.case_id, Some(case_id));
        assert!(appointment.auto_created_pn);
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn walk_in_booking_never_auto_creates() {
        let f = setup();
        let mut req = booking(&f, time(9, 0), time(10, 0), true);
        req.patient_id = None;
        req.walk_in_name = Some("Drop-in customer".into());

        let out = book_appointment(&f.conn, &req, &f.staff).unwrap();
        assert!(out.case_id.is_none());

        let appointment = get_appointment(&f.conn, out.appointment_id).unwrap();
        assert!(!appointment.auto_created_pn);
    }

    #[test]
    fn booking_requires_patient_or_walk_in_name() {
        let f = setup();
        let mut req = booking(&f, time(9, 0), time(10, 0), false);
        req.patient_id = None;

        let err = book_appointment(&f.conn, &req, &f.staff).unwrap_err();
        assert!(matches!(err, EngineError::ScheduleInvalid(_)));
    }

    #[test]
    fn overlapping_bookings_are_reported_not_blocked() {
        let f = setup();
        book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), false), &f.staff).unwrap();
        book_appointment(&f.conn, &booking(&f, time(11, 0), time(12, 0), false), &f.staff).unwrap();

        // Overlaps both earlier slots
        let out = book_appointment(&f.conn, &booking(&f, time(9, 30), time(11, 30), false), &f.staff)
            .unwrap();

        assert_eq!(out.conflicts.len(), 2);
        // Advisory only: the slot exists regardless
        get_appointment(&f.conn, out.appointment_id).unwrap();
    }

    #[test]
    fn back_to_back_slots_do_not_conflict() {
        let f = setup();
        book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), false), &f.staff).unwrap();

        let out = book_appointment(&f.conn, &booking(&f, time(10, 0), time(11, 0), false), &f.staff)
            .unwrap();
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn cancelled_slots_do_not_conflict() {
        let f = setup();
        let first = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), false), &f.staff)
            .unwrap();
        cancel_appointment(&f.conn, &f.cfg, first.appointment_id, "patient called", &f.staff)
            .unwrap();

        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), false), &f.staff)
            .unwrap();
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn rejects_inverted_times() {
        let f = setup();
        let err = book_appointment(&f.conn, &booking(&f, time(10, 0), time(9, 0), false), &f.staff)
            .unwrap_err();
        assert!(matches!(err, EngineError::ScheduleInvalid(_)));
    }

    #[test]
    fn completing_appointment_drives_case_through_both_hops() {
        // Booking with auto-create, then completion with a valid note:
        // exactly one case, driven to COMPLETED, one history entry per
        // hop, zero ledger entries without a course.
        let f = setup();
        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), true), &f.staff)
            .unwrap();
        let case_id = out.case_id.unwrap();

        let payload = CompletionPayload {
            assessment: None,
            soap_note: soap(),
        };
        let status =
            complete_appointment(&f.conn, &f.cfg, out.appointment_id, &payload, &f.staff).unwrap();

        assert_eq!(status, Some(CaseStatus::Completed));
        let appointment = get_appointment(&f.conn, out.appointment_id).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Completed);

        let trail = history_for_case(&f.conn, case_id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].reason, REASON_ACCEPTED_FROM_APPOINTMENT);
        assert_eq!(trail[1].reason, REASON_COMPLETED_FROM_APPOINTMENT);

        assert!(usage_for_case(&f.conn, case_id).unwrap().is_empty());
    }

    #[test]
    fn completing_appointment_without_note_rolls_back_everything() {
        let f = setup();
        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), true), &f.staff)
            .unwrap();

        let mut bad = soap();
        bad.objective = "".into();
        let err = complete_appointment(
            &f.conn,
            &f.cfg,
            out.appointment_id,
            &CompletionPayload {
                assessment: None,
                soap_note: bad,
            },
            &f.staff,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::IncompleteSoap { .. }));

        // Appointment completion rolled back with the failed case hop
        let appointment = get_appointment(&f.conn, out.appointment_id).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        let case = get_case(&f.conn, out.case_id.unwrap()).unwrap();
        assert_eq!(case.status, CaseStatus::Pending);
    }

    #[test]
    fn cancelling_appointment_cancels_case_and_returns_session() {
        let f = setup();
        let course = create_course(
            &f.conn,
            &NewCourse {
                patient_id: f.patient.id,
                clinic: "CL001".into(),
                name: "PT x5".into(),
                total_sessions: 5,
                price: 4500.0,
                paid_amount: 4500.0,
                purchase_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
                expiry_date: None,
            },
            f.staff.id,
        )
        .unwrap();

        let mut req = booking(&f, time(9, 0), time(10, 0), true);
        req.course_id = Some(course.id);
        let out = book_appointment(&f.conn, &req, &f.staff).unwrap();
        let case_id = out.case_id.unwrap();

        // Complete first so a session is consumed, then reverse to
        // ACCEPTED so cancellation has something to give back.
        complete_appointment(
            &f.conn,
            &f.cfg,
            out.appointment_id,
            &CompletionPayload {
                assessment: None,
                soap_note: soap(),
            },
            &f.staff,
        )
        .unwrap();
        let manager = Actor::new(Uuid::new_v4(), "manager", ActorRole::Privileged);
        transition_case(
            &f.conn,
            &f.cfg,
            case_id,
            CaseStatus::Accepted,
            &manager,
            &TransitionPayload::with_reason("billing error"),
        )
        .unwrap();

        // Re-book the slot and cancel it; the case cancels and the
        // session comes back.
        let second = book_appointment(&f.conn, &booking(&f, time(14, 0), time(15, 0), false), &f.staff)
            .unwrap();
        link_case_appointment(&f.conn, case_id, Some(second.appointment_id)).unwrap();
        link_appointment_case(&f.conn, second.appointment_id, case_id, false).unwrap();

        let status =
            cancel_appointment(&f.conn, &f.cfg, second.appointment_id, "clinic closed", &f.staff)
                .unwrap();

        assert_eq!(status, Some(CaseStatus::Cancelled));
        let course = get_course(&f.conn, course.id).unwrap();
        assert_eq!(course.used_sessions, 0);
        assert_eq!(course.remaining_sessions, 5);

        let log = usage_for_case(&f.conn, case_id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].kind, UsageKind::Return);
    }

    #[test]
    fn cancelling_case_cancels_pending_appointment() {
        let f = setup();
        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), true), &f.staff)
            .unwrap();
        let case_id = out.case_id.unwrap();

        transition_case(
            &f.conn,
            &f.cfg,
            case_id,
            CaseStatus::Accepted,
            &f.staff,
            &TransitionPayload::default(),
        )
        .unwrap();
        transition_case(
            &f.conn,
            &f.cfg,
            case_id,
            CaseStatus::Cancelled,
            &f.staff,
            &TransitionPayload::with_reason("patient moved away"),
        )
        .unwrap();

        let appointment = get_appointment(&f.conn, out.appointment_id).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Cancelled);
        assert_eq!(
            appointment.cancel_reason.as_deref(),
            Some(REASON_CANCELLED_FROM_CASE)
        );
    }

    #[test]
    fn terminal_appointments_reject_further_moves() {
        let f = setup();
        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), false), &f.staff)
            .unwrap();
        cancel_appointment(&f.conn, &f.cfg, out.appointment_id, "double entry", &f.staff).unwrap();

        let err = complete_appointment(
            &f.conn,
            &f.cfg,
            out.appointment_id,
            &CompletionPayload {
                assessment: None,
                soap_note: soap(),
            },
            &f.staff,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAppointmentTransition { .. }));

        let err = cancel_appointment(&f.conn, &f.cfg, out.appointment_id, "again", &f.staff)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAppointmentTransition { .. }));
    }

    #[test]
    fn confirm_start_and_no_show_lifecycle() {
        let f = setup();
        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), false), &f.staff)
            .unwrap();

        confirm_appointment(&f.conn, out.appointment_id, &f.staff).unwrap();
        let err = confirm_appointment(&f.conn, out.appointment_id, &f.staff).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAppointmentTransition { .. }));

        start_appointment(&f.conn, out.appointment_id, &f.staff).unwrap();
        let appointment = get_appointment(&f.conn, out.appointment_id).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::InProgress);

        // No-show only from a pending slot
        let err = mark_no_show(&f.conn, out.appointment_id, &f.staff).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAppointmentTransition { .. }));

        let second = book_appointment(&f.conn, &booking(&f, time(11, 0), time(12, 0), false), &f.staff)
            .unwrap();
        mark_no_show(&f.conn, second.appointment_id, &f.staff).unwrap();
        let appointment = get_appointment(&f.conn, second.appointment_id).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::NoShow);
    }

    #[test]
    fn reschedule_rechecks_conflicts_and_moves_slot() {
        let f = setup();
        book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), false), &f.staff).unwrap();
        let movable = book_appointment(&f.conn, &booking(&f, time(14, 0), time(15, 0), false), &f.staff)
            .unwrap();

        let conflicts = reschedule_appointment(
            &f.conn,
            movable.appointment_id,
            NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            time(9, 30),
            time(10, 30),
            &f.staff,
        )
        .unwrap();

        assert_eq!(conflicts.len(), 1);
        let appointment = get_appointment(&f.conn, movable.appointment_id).unwrap();
        assert_eq!(appointment.start_time, time(9, 30));
    }

    #[test]
    fn booking_request_parses_from_ui_json() {
        let raw = format!(
            r#"{{"patient_id": "{}", "walk_in_name": null, "clinician_id": "{}",
                "clinic": "CL001", "date": "2026-08-10", "start_time": "09:00:00",
                "end_time": "10:00:00", "auto_create_case": true}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );

        let req = BookingRequest::from_json(&raw).unwrap();
        assert!(req.auto_create_case);
        assert_eq!(req.clinic, "CL001");
        assert!(req.note.is_none());

        assert!(BookingRequest::from_json("{}").is_err());
    }

    #[test]
    fn deleting_appointment_nulls_case_link() {
        let f = setup();
        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), true), &f.staff)
            .unwrap();
        let case_id = out.case_id.unwrap();

        delete_appointment(&f.conn, out.appointment_id).unwrap();

        let case = get_case(&f.conn, case_id).unwrap();
        assert!(case.appointment_id.is_none());
        assert!(matches!(
            get_appointment(&f.conn, out.appointment_id),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn cancelling_case_with_dangling_appointment_link_surfaces_inconsistency() {
        let f = setup();
        let out = book_appointment(&f.conn, &booking(&f, time(9, 0), time(10, 0), true), &f.staff)
            .unwrap();
        let case_id = out.case_id.unwrap();
        transition_case(&f.conn, &f.cfg, case_id, CaseStatus::Accepted, &f.staff, &TransitionPayload::default()).unwrap();

        // Delete the row out from under the link (bypassing the bridge)
        crate::db::repository::delete_appointment_row(&f.conn, out.appointment_id).unwrap();

        let err = transition_case(
            &f.conn,
            &f.cfg,
            case_id,
            CaseStatus::Cancelled,
            &f.staff,
            &TransitionPayload::with_reason("cleanup"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::LinkageInconsistency(_)));

        // Whole unit of work rolled back
        let case = get_case(&f.conn, case_id).unwrap();
        assert_eq!(case.status, CaseStatus::Accepted);
    }
}
