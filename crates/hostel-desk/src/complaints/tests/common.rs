use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::complaints::domain::{
    Assignment, AssignmentId, AssignmentKind, AutoEscalationRule, Category, Complaint,
    ComplaintId, Escalation, EscalationId, HostelId, Priority, Resolution, ResolutionId, RuleId,
    StaffId,
};
use crate::complaints::lifecycle::{
    AssignRequest, ComplaintService, EngineConfig, EscalateRequest, NewComplaint,
    ResolveRequest, RuleSpec,
};
use crate::complaints::repository::{
    ComplaintStore, EngineEvent, EventPublisher, PublishError, StoreError,
};

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).single().expect("valid instant")
}

pub(super) fn hours(count: i64) -> Duration {
    Duration::hours(count)
}

pub(super) fn hostel() -> HostelId {
    HostelId("hostel-1".to_string())
}

pub(super) fn staff(name: &str) -> StaffId {
    StaffId(name.to_string())
}

#[derive(Default)]
struct Tables {
    staff: HashSet<StaffId>,
    complaints: HashMap<ComplaintId, Complaint>,
    assignments: Vec<Assignment>,
    escalations: Vec<Escalation>,
    rules: HashMap<RuleId, AutoEscalationRule>,
    resolutions: Vec<Resolution>,
}

impl Tables {
    fn commit_complaint(&mut self, complaint: Complaint) -> Result<Complaint, StoreError> {
        let stored = self
            .complaints
            .get(&complaint.id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != complaint.version {
            return Err(StoreError::VersionConflict(complaint.id.clone()));
        }
        let mut fresh = complaint;
        fresh.version += 1;
        self.complaints.insert(fresh.id.clone(), fresh.clone());
        Ok(fresh)
    }
}

/// In-memory store; every mutating method commits under one mutex so the
/// multi-row methods are atomic.
#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl ComplaintStore for MemoryStore {
    fn register_staff(&self, staff: StaffId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.staff.insert(staff);
        Ok(())
    }

    fn staff_known(&self, staff: &StaffId) -> Result<bool, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.staff.contains(staff))
    }

    fn insert_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.complaints.contains_key(&complaint.id) {
            return Err(StoreError::Conflict);
        }
        tables
            .complaints
            .insert(complaint.id.clone(), complaint.clone());
        Ok(complaint)
    }

    fn fetch_complaint(&self, id: &ComplaintId) -> Result<Option<Complaint>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.complaints.get(id).cloned())
    }

    fn update_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.commit_complaint(complaint)
    }

    fn active_complaints(&self, hostel: Option<&HostelId>) -> Result<Vec<Complaint>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut rows: Vec<Complaint> = tables
            .complaints
            .values()
            .filter(|complaint| complaint.status.is_active() && !complaint.audit.is_deleted())
            .filter(|complaint| hostel.map_or(true, |scope| complaint.hostel == *scope))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn record_assignment_change(
        &self,
        complaint: Complaint,
        closed: Option<Assignment>,
        opened: Assignment,
    ) -> Result<Complaint, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let stored = tables.commit_complaint(complaint)?;
        if let Some(closed) = closed {
            if let Some(slot) = tables
                .assignments
                .iter_mut()
                .find(|entry| entry.id == closed.id)
            {
                *slot = closed;
            }
        }
        tables.assignments.push(opened);
        Ok(stored)
    }

    fn fetch_assignment(&self, id: &AssignmentId) -> Result<Option<Assignment>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .assignments
            .iter()
            .find(|entry| entry.id == *id)
            .cloned())
    }

    fn update_assignment(&self, assignment: Assignment) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .assignments
            .iter_mut()
            .find(|entry| entry.id == assignment.id)
            .ok_or(StoreError::NotFound)?;
        *slot = assignment;
        Ok(())
    }

    fn current_assignment(&self, id: &ComplaintId) -> Result<Option<Assignment>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .assignments
            .iter()
            .find(|entry| entry.complaint_id == *id && entry.is_current)
            .cloned())
    }

    fn assignments_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .assignments
            .iter()
            .filter(|entry| entry.complaint_id == *id)
            .cloned()
            .collect())
    }

    fn assignments_for_user(&self, user: &StaffId) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .assignments
            .iter()
            .filter(|entry| entry.assignee == *user)
            .cloned()
            .collect())
    }

    fn record_escalation(
        &self,
        complaint: Complaint,
        escalation: Escalation,
    ) -> Result<Escalation, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.commit_complaint(complaint)?;
        tables.escalations.push(escalation.clone());
        Ok(escalation)
    }

    fn fetch_escalation(&self, id: &EscalationId) -> Result<Option<Escalation>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .escalations
            .iter()
            .find(|entry| entry.id == *id)
            .cloned())
    }

    fn update_escalation(&self, escalation: Escalation) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .escalations
            .iter_mut()
            .find(|entry| entry.id == escalation.id)
            .ok_or(StoreError::NotFound)?;
        *slot = escalation;
        Ok(())
    }

    fn escalations_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Escalation>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .escalations
            .iter()
            .filter(|entry| entry.complaint_id == *id)
            .cloned()
            .collect())
    }

    fn insert_rule(&self, rule: AutoEscalationRule) -> Result<AutoEscalationRule, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.rules.contains_key(&rule.id) {
            return Err(StoreError::Conflict);
        }
        tables.rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    fn fetch_rule(&self, id: &RuleId) -> Result<Option<AutoEscalationRule>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.rules.get(id).cloned())
    }

    fn update_rule(&self, rule: AutoEscalationRule) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.rules.contains_key(&rule.id) {
            return Err(StoreError::NotFound);
        }
        tables.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn active_rules(&self, hostel: &HostelId) -> Result<Vec<AutoEscalationRule>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut rules: Vec<AutoEscalationRule> = tables
            .rules
            .values()
            .filter(|rule| rule.active && rule.hostel == *hostel)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| rule.priority);
        Ok(rules)
    }

    fn record_resolution(
        &self,
        complaint: Complaint,
        superseded: Option<Resolution>,
        closed_assignment: Option<Assignment>,
        fresh: Resolution,
    ) -> Result<Resolution, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.commit_complaint(complaint)?;
        if let Some(superseded) = superseded {
            if let Some(slot) = tables
                .resolutions
                .iter_mut()
                .find(|entry| entry.id == superseded.id)
            {
                *slot = superseded;
            }
        }
        if let Some(closed) = closed_assignment {
            if let Some(slot) = tables
                .assignments
                .iter_mut()
                .find(|entry| entry.id == closed.id)
            {
                *slot = closed;
            }
        }
        tables.resolutions.push(fresh.clone());
        Ok(fresh)
    }

    fn fetch_resolution(&self, id: &ResolutionId) -> Result<Option<Resolution>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .resolutions
            .iter()
            .find(|entry| entry.id == *id)
            .cloned())
    }

    fn update_resolution(&self, resolution: Resolution) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .resolutions
            .iter_mut()
            .find(|entry| entry.id == resolution.id)
            .ok_or(StoreError::NotFound)?;
        *slot = resolution;
        Ok(())
    }

    fn resolutions_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Resolution>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .resolutions
            .iter()
            .filter(|entry| entry.complaint_id == *id)
            .cloned()
            .collect())
    }

    fn final_resolution(&self, id: &ComplaintId) -> Result<Option<Resolution>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .resolutions
            .iter()
            .find(|entry| entry.complaint_id == *id && entry.is_final)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryEvents {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl MemoryEvents {
    pub(super) fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }
}

impl EventPublisher for MemoryEvents {
    fn publish(&self, event: EngineEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) type TestService = ComplaintService<MemoryStore, MemoryEvents>;

pub(super) fn build_service() -> (Arc<TestService>, Arc<MemoryStore>, Arc<MemoryEvents>) {
    let store = Arc::new(MemoryStore::default());
    let events = Arc::new(MemoryEvents::default());
    for name in ["alice", "bob", "carol", "dana", "warden", "manager"] {
        store
            .register_staff(staff(name))
            .expect("staff registration succeeds");
    }
    let service = Arc::new(ComplaintService::new(
        store.clone(),
        events.clone(),
        EngineConfig::default(),
    ));
    (service, store, events)
}

pub(super) fn new_complaint(priority: Priority) -> NewComplaint {
    NewComplaint {
        hostel: hostel(),
        title: "Leaking shower in block B".to_string(),
        category: Category::Plumbing,
        priority,
    }
}

pub(super) fn assign_request(assignee: &str) -> AssignRequest {
    AssignRequest {
        assignee: staff(assignee),
        assigner: staff("warden"),
        kind: AssignmentKind::Manual,
        reason: None,
        estimated_hours: Some(4.0),
    }
}

pub(super) fn escalate_request(target: &str) -> EscalateRequest {
    EscalateRequest {
        escalated_by: staff("warden"),
        escalated_to: staff(target),
        reason: "no progress after repeated reminders".to_string(),
    }
}

pub(super) fn resolve_request() -> ResolveRequest {
    ResolveRequest {
        resolved_by: staff("alice"),
        notes: "Replaced the shower valve".to_string(),
        actions_taken: vec!["replaced valve".to_string()],
        attachments: Vec::new(),
        follow_up_required: false,
        follow_up_date: None,
    }
}

pub(super) fn rule_spec(name: &str, priority: i32) -> RuleSpec {
    RuleSpec {
        hostel: hostel(),
        name: name.to_string(),
        urgent_hours: 4,
        high_hours: 12,
        medium_hours: 24,
        low_hours: 48,
        escalate_on_sla_breach: false,
        first_escalation_to: Some(staff("warden")),
        second_escalation_to: Some(staff("manager")),
        third_escalation_to: Some(staff("dana")),
        active: true,
        priority,
        conditions: Default::default(),
    }
}
