use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;

use super::common::*;
use crate::complaints::domain::{ComplaintStatus, InvariantViolation, Priority, ValidationError};
use crate::complaints::lifecycle::EngineError;
use crate::complaints::repository::ComplaintStore;
use crate::complaints::resolution::is_follow_up_overdue;

#[test]
fn resolving_an_in_progress_complaint_records_final_resolution() {
    let (service, store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    service
        .start_work(&complaint.id, now + hours(1))
        .expect("start succeeds");

    let resolution = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(5) + chrono::Duration::minutes(50))
        .expect("resolution recorded");

    assert!(resolution.is_final);
    // floored to whole hours
    assert_eq!(resolution.time_to_resolve_hours, 5);

    let stored = service.get_complaint(&complaint.id).expect("fetch succeeds");
    assert_eq!(stored.status, ComplaintStatus::Resolved);

    // resolving terminates the current assignment
    let current = store
        .current_assignment(&complaint.id)
        .expect("fetch succeeds");
    assert!(current.is_none());
    let rows = store
        .assignments_for_complaint(&complaint.id)
        .expect("fetch succeeds");
    assert!(rows[0].duration_hours.is_some());
}

#[test]
fn resolving_requires_an_active_assignment_cycle() {
    let (service, _store, _events) = build_service();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), t0())
        .expect("complaint filed");

    match service.create_resolution(&complaint.id, resolve_request(), t0()) {
        Err(EngineError::Invariant(InvariantViolation::InvalidTransition { from, .. })) => {
            assert_eq!(from, ComplaintStatus::Open);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn reopen_flips_final_flag_and_preserves_history() {
    let (service, store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let resolution = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(4))
        .expect("resolution recorded");

    let reopened = service
        .reopen(&resolution.id, "leak came back".to_string(), now + hours(20))
        .expect("reopen succeeds");
    assert_eq!(reopened.status, ComplaintStatus::Reopened);
    assert_eq!(reopened.reopened_count, 1);

    let stored = store
        .fetch_resolution(&resolution.id)
        .expect("fetch succeeds")
        .expect("resolution present");
    assert!(stored.reopened);
    assert!(!stored.is_final);
    assert_eq!(stored.reopen_reason.as_deref(), Some("leak came back"));
    assert_eq!(stored.reopened_at, Some(now + hours(20)));

    // a fresh assignment restarts the cycle and a second resolution
    // supersedes the first without deleting it
    service
        .assign(&complaint.id, assign_request("bob"), now + hours(21))
        .expect("assignment succeeds");
    let second = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(30))
        .expect("resolution recorded");

    let rows = store
        .resolutions_for_complaint(&complaint.id)
        .expect("fetch succeeds");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|row| row.is_final).count(), 1);
    assert_eq!(
        store
            .final_resolution(&complaint.id)
            .expect("fetch succeeds")
            .expect("final present")
            .id,
        second.id
    );
}

#[test]
fn reopen_rejects_superseded_resolutions() {
    let (service, _store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let resolution = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(2))
        .expect("resolution recorded");
    service
        .reopen(&resolution.id, "not fixed".to_string(), now + hours(3))
        .expect("reopen succeeds");

    match service.reopen(&resolution.id, "again".to_string(), now + hours(4)) {
        Err(EngineError::Invariant(InvariantViolation::ResolutionNotFinal(_))) => {}
        other => panic!("expected non-final error, got {other:?}"),
    }
}

#[test]
fn reopen_works_from_closed_as_well() {
    let (service, _store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::Medium), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let resolution = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(2))
        .expect("resolution recorded");
    service.close(&complaint.id, now + hours(3)).expect("close succeeds");

    let reopened = service
        .reopen(&resolution.id, "recurred".to_string(), now + hours(50))
        .expect("reopen succeeds");
    assert_eq!(reopened.status, ComplaintStatus::Reopened);
}

#[test]
fn quality_check_validates_range_and_applies_once() {
    let (service, _store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let resolution = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(2))
        .expect("resolution recorded");

    match service.quality_check(&resolution.id, staff("manager"), 11, None, now + hours(3)) {
        Err(EngineError::Validation(ValidationError::QualityScoreRange(11))) => {}
        other => panic!("expected score range error, got {other:?}"),
    }

    let checked = service
        .quality_check(
            &resolution.id,
            staff("manager"),
            8,
            Some("solid fix".to_string()),
            now + hours(3),
        )
        .expect("quality check succeeds");
    assert!(checked.quality_checked);
    assert_eq!(checked.quality_score, Some(8));

    match service.quality_check(&resolution.id, staff("manager"), 9, None, now + hours(4)) {
        Err(EngineError::Invariant(InvariantViolation::QualityAlreadyChecked(_))) => {}
        other => panic!("expected already checked error, got {other:?}"),
    }
}

#[test]
fn racing_quality_checks_record_exactly_one_score() {
    let (service, store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let resolution = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(2))
        .expect("resolution recorded");

    let handles: Vec<_> = [6u8, 7, 8]
        .into_iter()
        .map(|score| {
            let service = Arc::clone(&service);
            let id = resolution.id.clone();
            thread::spawn(move || {
                service.quality_check(&id, staff("manager"), score, None, t0() + hours(3))
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("checker thread"))
        .collect();

    let winners: Vec<_> = results
        .iter()
        .filter_map(|result| result.as_ref().ok())
        .collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(
                err,
                EngineError::Invariant(InvariantViolation::QualityAlreadyChecked(_))
            ));
        }
    }

    let stored = store
        .fetch_resolution(&resolution.id)
        .expect("fetch succeeds")
        .expect("resolution present");
    assert!(stored.quality_checked);
    assert_eq!(stored.quality_score, winners[0].quality_score);
}

#[test]
fn follow_up_completion_and_overdue_predicate() {
    let (service, _store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");

    let mut request = resolve_request();
    request.follow_up_required = true;
    request.follow_up_date = NaiveDate::from_ymd_opt(2025, 6, 3);
    let resolution = service
        .create_resolution(&complaint.id, request, now + hours(2))
        .expect("resolution recorded");

    let before = NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date");
    let after = NaiveDate::from_ymd_opt(2025, 6, 4).expect("valid date");
    assert!(!is_follow_up_overdue(&resolution, before));
    assert!(is_follow_up_overdue(&resolution, after));

    let completed = service
        .complete_follow_up(&resolution.id, now + hours(30))
        .expect("follow-up completed");
    assert!(completed.follow_up_completed);
    assert_eq!(completed.follow_up_completed_at, Some(now + hours(30)));
    assert!(!is_follow_up_overdue(&completed, after));
}

#[test]
fn follow_up_completion_requires_a_follow_up() {
    let (service, _store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let resolution = service
        .create_resolution(&complaint.id, resolve_request(), now + hours(2))
        .expect("resolution recorded");

    match service.complete_follow_up(&resolution.id, now + hours(3)) {
        Err(EngineError::Invariant(InvariantViolation::NoFollowUpRequired(_))) => {}
        other => panic!("expected no-follow-up error, got {other:?}"),
    }
}

#[test]
fn resolving_an_escalated_complaint_marks_the_escalation() {
    let (service, store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let escalation = service
        .escalate(&complaint.id, escalate_request("warden"), now + hours(1))
        .expect("escalation succeeds");

    service
        .create_resolution(&complaint.id, resolve_request(), now + hours(6))
        .expect("resolution recorded");

    let stored = store
        .fetch_escalation(&escalation.id)
        .expect("fetch succeeds")
        .expect("escalation present");
    assert!(stored.resolved_after_escalation);
}
