use hostel_desk::complaints::{
    Assignment, AssignmentId, AutoEscalationRule, Complaint, ComplaintId, ComplaintStore,
    EngineConfig, EngineEvent, Escalation, EscalationId, EventPublisher, HostelId, PublishError,
    Resolution, ResolutionId, RuleId, StaffId, StoreError,
};
use hostel_desk::config::SweepConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn engine_config(sweep: &SweepConfig) -> EngineConfig {
    EngineConfig {
        max_escalation_level: sweep.max_escalation_level,
        sweep_window_hours: sweep.window_hours,
        at_risk_buffer_hours: sweep.at_risk_buffer_hours,
        ..EngineConfig::default()
    }
}

/// All tables live behind one mutex so the multi-row store methods commit
/// as a unit, matching the atomicity the engine requires.
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

#[derive(Default, Clone)]
pub(crate) struct InMemoryComplaintStore {
    tables: Arc<Mutex<Tables>>,
}

impl ComplaintStore for InMemoryComplaintStore {
    fn register_staff(&self, staff: StaffId) -> Result<(), StoreError> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .staff
            .insert(staff);
        Ok(())
    }

    fn staff_known(&self, staff: &StaffId) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
            .staff
            .contains(staff))
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
            .complaints
            .get(id)
            .cloned())
    }

    fn update_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .commit_complaint(complaint)
    }

    fn active_complaints(&self, hostel: Option<&HostelId>) -> Result<Vec<Complaint>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut rows: Vec<Complaint> = tables
            .complaints
            .values()
            .filter(|row| row.status.is_active() && !row.audit.is_deleted())
            .filter(|row| hostel.map_or(true, |scope| row.hostel == *scope))
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
            .assignments
            .iter()
            .find(|entry| entry.complaint_id == *id && entry.is_current)
            .cloned())
    }

    fn assignments_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
            .assignments
            .iter()
            .filter(|entry| entry.complaint_id == *id)
            .cloned()
            .collect())
    }

    fn assignments_for_user(&self, user: &StaffId) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
            .rules
            .get(id)
            .cloned())
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
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
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
            .resolutions
            .iter()
            .filter(|entry| entry.complaint_id == *id)
            .cloned()
            .collect())
    }

    fn final_resolution(&self, id: &ComplaintId) -> Result<Option<Resolution>, StoreError> {
        Ok(self
            .tables
            .lock()
            .expect("store mutex poisoned")
            .resolutions
            .iter()
            .find(|entry| entry.complaint_id == *id && entry.is_final)
            .cloned())
    }
}

/// Logs each engine event; a queue-backed publisher slots in here once the
/// notification dispatcher grows a transport.
#[derive(Default, Clone)]
pub(crate) struct LoggingEventPublisher;

impl EventPublisher for LoggingEventPublisher {
    fn publish(&self, event: EngineEvent) -> Result<(), PublishError> {
        match &event {
            EngineEvent::AssignmentChanged {
                complaint_id,
                assignee,
                ..
            } => info!(complaint = %complaint_id, assignee = %assignee, "assignment changed"),
            EngineEvent::EscalationCreated {
                complaint_id,
                level,
                escalated_to,
                ..
            } => info!(
                complaint = %complaint_id,
                level,
                target = %escalated_to,
                "escalation created"
            ),
        }
        Ok(())
    }
}
