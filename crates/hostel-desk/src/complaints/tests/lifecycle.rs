use std::sync::Arc;
use std::thread;

use super::common::*;
use crate::complaints::domain::{ComplaintStatus, InvariantViolation, Priority};
use crate::complaints::lifecycle::EngineError;
use crate::complaints::repository::{ComplaintStore, EngineEvent};

#[test]
fn filing_starts_open_with_sla_from_active_rule() {
    let (service, _store, _events) = build_service();
    let now = t0();
    service
        .create_rule(rule_spec("default", 1), now)
        .expect("rule created");

    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");

    assert_eq!(complaint.status, ComplaintStatus::Open);
    assert_eq!(complaint.opened_at, now);
    // high threshold is 12h in the fixture rule
    assert_eq!(complaint.sla_due_at, Some(now + hours(12)));
    assert!(!complaint.sla_breach);
    assert_eq!(complaint.reopened_count, 0);
}

#[test]
fn filing_without_rule_leaves_sla_unset() {
    let (service, _store, _events) = build_service();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), t0())
        .expect("complaint filed");
    assert_eq!(complaint.sla_due_at, None);
}

#[test]
fn filing_rejects_empty_title() {
    let (service, _store, _events) = build_service();
    let mut request = new_complaint(Priority::Low);
    request.title = "  ".to_string();
    match service.file_complaint(request, t0()) {
        Err(EngineError::Validation(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn assign_moves_open_complaint_to_assigned_and_emits_event() {
    let (service, _store, events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");

    let assignment = service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");

    assert!(assignment.is_current);
    assert_eq!(assignment.assignee, staff("alice"));
    assert_eq!(assignment.workload_score, 55);

    let stored = service.get_complaint(&complaint.id).expect("fetch succeeds");
    assert_eq!(stored.status, ComplaintStatus::Assigned);
    assert_eq!(stored.reassigned_count, 0);

    assert!(matches!(
        events.events().as_slice(),
        [EngineEvent::AssignmentChanged {
            previous_assignee: None,
            ..
        }]
    ));
}

#[test]
fn reassignment_terminates_previous_and_keeps_one_current_row() {
    let (service, store, events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");

    let first = service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let second = service
        .assign(&complaint.id, assign_request("bob"), now + hours(3))
        .expect("reassignment succeeds");

    let current = service
        .current_assignment(&complaint.id)
        .expect("fetch succeeds")
        .expect("current assignment present");
    assert_eq!(current.id, second.id);
    assert_eq!(current.assignee, staff("bob"));

    let rows = store
        .assignments_for_complaint(&complaint.id)
        .expect("fetch succeeds");
    assert_eq!(rows.iter().filter(|row| row.is_current).count(), 1);

    let terminated = rows
        .iter()
        .find(|row| row.id == first.id)
        .expect("first assignment still stored");
    assert!(!terminated.is_current);
    assert_eq!(terminated.unassigned_at, Some(now + hours(3)));
    assert_eq!(terminated.duration_hours, Some(3));

    let stored = service.get_complaint(&complaint.id).expect("fetch succeeds");
    assert_eq!(stored.reassigned_count, 1);

    let events = events.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        EngineEvent::AssignmentChanged {
            previous_assignee: Some(previous),
            ..
        } if *previous == staff("alice")
    ));
}

#[test]
fn assign_rejects_unknown_assignee() {
    let (service, _store, _events) = build_service();
    let complaint = service
        .file_complaint(new_complaint(Priority::Low), t0())
        .expect("complaint filed");
    match service.assign(&complaint.id, assign_request("nobody"), t0()) {
        Err(EngineError::StaffNotFound(user)) => assert_eq!(user, staff("nobody")),
        other => panic!("expected staff not found, got {other:?}"),
    }
}

#[test]
fn start_work_requires_assigned_status() {
    let (service, _store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::Medium), now)
        .expect("complaint filed");

    match service.start_work(&complaint.id, now) {
        Err(EngineError::Invariant(InvariantViolation::InvalidTransition { from, .. })) => {
            assert_eq!(from, ComplaintStatus::Open);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    let stored = service
        .start_work(&complaint.id, now + hours(1))
        .expect("start succeeds");
    assert_eq!(stored.status, ComplaintStatus::InProgress);
}

#[test]
fn close_requires_resolved_status() {
    let (service, _store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::Medium), now)
        .expect("complaint filed");

    match service.close(&complaint.id, now) {
        Err(EngineError::Invariant(InvariantViolation::InvalidTransition { .. })) => {}
        other => panic!("expected invalid transition, got {other:?}"),
    }

    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");
    service
        .create_resolution(&complaint.id, resolve_request(), now + hours(5))
        .expect("resolution recorded");
    let closed = service
        .close(&complaint.id, now + hours(6))
        .expect("close succeeds");
    assert_eq!(closed.status, ComplaintStatus::Closed);
}

#[test]
fn archived_complaints_reject_mutations_and_leave_sweeps() {
    let (service, store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");

    let archived = service
        .archive_complaint(&complaint.id, now)
        .expect("archive succeeds");
    assert!(archived.audit.is_deleted());

    match service.assign(&complaint.id, assign_request("alice"), now) {
        Err(EngineError::Invariant(InvariantViolation::ComplaintArchived(_))) => {}
        other => panic!("expected archived error, got {other:?}"),
    }

    assert!(store
        .active_complaints(Some(&hostel()))
        .expect("fetch succeeds")
        .is_empty());
}

#[test]
fn unknown_complaint_is_not_found() {
    let (service, _store, _events) = build_service();
    match service.get_complaint(&crate::complaints::ComplaintId("missing".to_string())) {
        Err(EngineError::ComplaintNotFound(_)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn concurrent_reassignments_never_leave_two_current_rows() {
    let (service, store, _events) = build_service();
    let now = t0();
    let complaint = service
        .file_complaint(new_complaint(Priority::High), now)
        .expect("complaint filed");
    service
        .assign(&complaint.id, assign_request("alice"), now)
        .expect("assignment succeeds");

    let mut handles = Vec::new();
    for assignee in ["bob", "carol", "dana"] {
        let service = Arc::clone(&service);
        let id = complaint.id.clone();
        handles.push(thread::spawn(move || {
            service.assign(&id, assign_request(assignee), t0() + hours(1))
        }));
    }
    for handle in handles {
        handle.join().expect("assign thread").expect("assignment succeeds");
    }

    let rows = store
        .assignments_for_complaint(&complaint.id)
        .expect("fetch succeeds");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.iter().filter(|row| row.is_current).count(), 1);

    let stored = service.get_complaint(&complaint.id).expect("fetch succeeds");
    assert_eq!(stored.reassigned_count, 3);
}

#[test]
fn lock_registry_drops_entries_once_operations_finish() {
    let (service, _store, _events) = build_service();
    let now = t0();

    for _ in 0..3 {
        let complaint = service
            .file_complaint(new_complaint(Priority::High), now)
            .expect("complaint filed");
        service
            .assign(&complaint.id, assign_request("alice"), now)
            .expect("assignment succeeds");
    }

    // only the most recent lookup can still be registered
    assert!(service.lock_registry_len() <= 1);
}
