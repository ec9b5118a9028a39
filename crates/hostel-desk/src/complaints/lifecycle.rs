//! The lifecycle controller: every status transition, the scheduled sweep
//! entry points, and the workload read side run through
//! [`ComplaintService`].
//!
//! Mutations on a single complaint are serialized through a per-complaint
//! lock registry; the store's optimistic version check remains as the
//! backstop and surfaces as [`EngineError::Conflict`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::assignment::{self, CandidateLoad, WorkloadBalanceReport, WorkloadSummary};
use super::domain::{
    Assignment, AssignmentId, AssignmentKind, AuditStamp, AutoEscalationRule, Category,
    Complaint, ComplaintId, ComplaintStatus, Escalation, EscalationId, HostelId,
    InvariantViolation, Priority, Resolution, ResolutionId, RuleId, StaffId, ValidationError,
};
use super::escalation;
use super::repository::{ComplaintStore, EngineEvent, EventPublisher, PublishError, StoreError};
use super::resolution::{self, QualityCheckRejection};
use super::sla::{self, SlaStatus};

/// Tunables for the engine, loaded from configuration by the service
/// binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_escalation_level: u32,
    /// Evaluation window for sweep idempotence: complaints escalated within
    /// the window are skipped by subsequent sweeps.
    pub sweep_window_hours: i64,
    pub at_risk_buffer_hours: i64,
    pub balance_threshold_pct: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_escalation_level: 3,
            sweep_window_hours: 1,
            at_risk_buffer_hours: 4,
            balance_threshold_pct: 30.0,
        }
    }
}

static COMPLAINT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static ASSIGNMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static ESCALATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static RULE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static RESOLUTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_id(sequence: &AtomicU64, prefix: &str) -> String {
    let id = sequence.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

/// Error raised by the lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error("complaint {0} not found")]
    ComplaintNotFound(ComplaintId),
    #[error("staff member {0} not found")]
    StaffNotFound(StaffId),
    #[error("escalation {0} not found")]
    EscalationNotFound(EscalationId),
    #[error("resolution {0} not found")]
    ResolutionNotFound(ResolutionId),
    #[error("rule {0} not found")]
    RuleNotFound(RuleId),
    #[error("complaint {0} was modified concurrently, retry")]
    Conflict(ComplaintId),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionConflict(id) => Self::Conflict(id),
            other => Self::Store(other),
        }
    }
}

/// Parameters for filing a new complaint.
#[derive(Debug, Clone, Deserialize)]
pub struct NewComplaint {
    pub hostel: HostelId,
    pub title: String,
    pub category: Category,
    pub priority: Priority,
}

/// Parameters for assigning (or reassigning) a complaint.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub assignee: StaffId,
    pub assigner: StaffId,
    pub kind: AssignmentKind,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

/// Parameters for a manual escalation. Auto escalations resolve their
/// target from the rule chain instead.
#[derive(Debug, Clone, Deserialize)]
pub struct EscalateRequest {
    pub escalated_by: StaffId,
    pub escalated_to: StaffId,
    pub reason: String,
}

/// Parameters for recording a resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: StaffId,
    pub notes: String,
    #[serde(default)]
    pub actions_taken: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub follow_up_required: bool,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
}

/// Parameters for creating or replacing an auto-escalation rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub hostel: HostelId,
    pub name: String,
    pub urgent_hours: i64,
    pub high_hours: i64,
    pub medium_hours: i64,
    pub low_hours: i64,
    #[serde(default)]
    pub escalate_on_sla_breach: bool,
    #[serde(default)]
    pub first_escalation_to: Option<StaffId>,
    #[serde(default)]
    pub second_escalation_to: Option<StaffId>,
    #[serde(default)]
    pub third_escalation_to: Option<StaffId>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub priority: i32,
    #[serde(default)]
    pub conditions: std::collections::BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Result of one escalation sweep run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub evaluated: u32,
    pub escalated: Vec<ComplaintId>,
    pub skipped_recent: u32,
    pub skipped_ineligible: u32,
}

/// Result of one SLA breach scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SlaScanReport {
    pub scanned: u32,
    pub newly_breached: Vec<ComplaintId>,
}

/// Service composing the storage and notification collaborators with the
/// engine rules.
pub struct ComplaintService<S, P> {
    store: Arc<S>,
    events: Arc<P>,
    config: EngineConfig,
    locks: Mutex<HashMap<ComplaintId, Arc<Mutex<()>>>>,
}

impl<S, P> ComplaintService<S, P>
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<P>, config: EngineConfig) -> Self {
        Self {
            store,
            events,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock_for(&self, id: &ComplaintId) -> Arc<Mutex<()>> {
        let mut registry = self.locks.lock().expect("lock registry poisoned");
        // Evict locks nobody holds so the registry only tracks in-flight
        // complaints instead of growing with every id ever touched.
        registry.retain(|_, lock| Arc::strong_count(lock) > 1);
        registry.entry(id.clone()).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) fn lock_registry_len(&self) -> usize {
        self.locks.lock().expect("lock registry poisoned").len()
    }

    fn fetch_required(&self, id: &ComplaintId) -> Result<Complaint, EngineError> {
        self.store
            .fetch_complaint(id)?
            .ok_or_else(|| EngineError::ComplaintNotFound(id.clone()))
    }

    fn require_live(&self, complaint: &Complaint) -> Result<(), EngineError> {
        if complaint.audit.is_deleted() {
            return Err(InvariantViolation::ComplaintArchived(complaint.id.clone()).into());
        }
        Ok(())
    }

    fn require_staff(&self, staff: &StaffId) -> Result<(), EngineError> {
        if self.store.staff_known(staff)? {
            Ok(())
        } else {
            Err(EngineError::StaffNotFound(staff.clone()))
        }
    }

    /// File a new complaint in `OPEN`, computing the SLA due date from the
    /// hostel's first applicable active rule when one exists.
    pub fn file_complaint(
        &self,
        request: NewComplaint,
        now: DateTime<Utc>,
    ) -> Result<Complaint, EngineError> {
        if request.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let sla_due_at = self
            .store
            .active_rules(&request.hostel)?
            .first()
            .map(|rule| sla::due_date(rule, request.priority, now));

        let complaint = Complaint {
            id: ComplaintId(next_id(&COMPLAINT_SEQUENCE, "cmp")),
            hostel: request.hostel,
            title: request.title,
            category: request.category,
            priority: request.priority,
            status: ComplaintStatus::Open,
            opened_at: now,
            sla_due_at,
            sla_breach: false,
            escalated: false,
            reopened_count: 0,
            reassigned_count: 0,
            version: 0,
            audit: AuditStamp::at(now),
        };

        let stored = self.store.insert_complaint(complaint)?;
        info!(complaint = %stored.id, hostel = %stored.hostel, "complaint filed");
        Ok(stored)
    }

    pub fn get_complaint(&self, id: &ComplaintId) -> Result<Complaint, EngineError> {
        self.fetch_required(id)
    }

    /// Assign or reassign a complaint. Terminating the previous current
    /// assignment and inserting the new one commit as one transaction.
    pub fn assign(
        &self,
        id: &ComplaintId,
        request: AssignRequest,
        now: DateTime<Utc>,
    ) -> Result<Assignment, EngineError> {
        let lock = self.lock_for(id);
        let _guard: MutexGuard<'_, ()> = lock.lock().expect("complaint lock poisoned");

        let mut complaint = self.fetch_required(id)?;
        self.require_live(&complaint)?;
        self.require_staff(&request.assignee)?;

        if !complaint.status.is_active() {
            return Err(InvariantViolation::InvalidTransition {
                complaint: id.clone(),
                from: complaint.status,
                action: "assign",
            }
            .into());
        }

        let closed = match self.store.current_assignment(id)? {
            Some(mut previous) => {
                previous.is_current = false;
                previous.unassigned_at = Some(now);
                previous.duration_hours =
                    Some(sla::hours_between_rounded(previous.assigned_at, now));
                previous.audit.touch(now);
                complaint.reassigned_count += 1;
                Some(previous)
            }
            None => None,
        };
        let previous_assignee = closed.as_ref().map(|previous| previous.assignee.clone());

        let score = assignment::workload_score(
            complaint.priority,
            complaint.category,
            request.estimated_hours,
        );
        let opened = Assignment {
            id: AssignmentId(next_id(&ASSIGNMENT_SEQUENCE, "asg")),
            complaint_id: id.clone(),
            assignee: request.assignee.clone(),
            assigner: request.assigner,
            kind: request.kind,
            reason: request.reason,
            estimated_hours: request.estimated_hours,
            assigned_at: now,
            unassigned_at: None,
            is_current: true,
            workload_score: score,
            duration_hours: None,
            audit: AuditStamp::at(now),
        };

        if matches!(
            complaint.status,
            ComplaintStatus::Open | ComplaintStatus::Reopened
        ) {
            complaint.status = ComplaintStatus::Assigned;
        }
        if complaint.sla_due_at.is_none() {
            complaint.sla_due_at = self
                .store
                .active_rules(&complaint.hostel)?
                .first()
                .map(|rule| sla::due_date(rule, complaint.priority, complaint.opened_at));
        }
        complaint.audit.touch(now);

        self.store
            .record_assignment_change(complaint, closed, opened.clone())?;

        info!(complaint = %id, assignee = %opened.assignee, "complaint assigned");
        self.events.publish(EngineEvent::AssignmentChanged {
            complaint_id: id.clone(),
            assignee: opened.assignee.clone(),
            previous_assignee,
        })?;

        Ok(opened)
    }

    /// Optional `ASSIGNED -> IN_PROGRESS` transition.
    pub fn start_work(&self, id: &ComplaintId, now: DateTime<Utc>) -> Result<Complaint, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        let mut complaint = self.fetch_required(id)?;
        self.require_live(&complaint)?;
        if complaint.status != ComplaintStatus::Assigned {
            return Err(InvariantViolation::InvalidTransition {
                complaint: id.clone(),
                from: complaint.status,
                action: "start_work",
            }
            .into());
        }

        complaint.status = ComplaintStatus::InProgress;
        complaint.audit.touch(now);
        Ok(self.store.update_complaint(complaint)?)
    }

    /// Record a resolution and move the complaint to `RESOLVED`. Any
    /// previous final resolution flips to non-final and the current
    /// assignment terminates in the same transaction.
    pub fn create_resolution(
        &self,
        id: &ComplaintId,
        request: ResolveRequest,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        let mut complaint = self.fetch_required(id)?;
        self.require_live(&complaint)?;
        if !matches!(
            complaint.status,
            ComplaintStatus::Assigned | ComplaintStatus::InProgress
        ) {
            return Err(InvariantViolation::InvalidTransition {
                complaint: id.clone(),
                from: complaint.status,
                action: "resolve",
            }
            .into());
        }

        let superseded = match self.store.final_resolution(id)? {
            Some(mut previous) => {
                previous.is_final = false;
                previous.audit.touch(now);
                Some(previous)
            }
            None => None,
        };

        let closed_assignment = match self.store.current_assignment(id)? {
            Some(mut current) => {
                current.is_current = false;
                current.unassigned_at = Some(now);
                current.duration_hours =
                    Some(sla::hours_between_rounded(current.assigned_at, now));
                current.audit.touch(now);
                Some(current)
            }
            None => None,
        };

        let fresh = Resolution {
            id: ResolutionId(next_id(&RESOLUTION_SEQUENCE, "res")),
            complaint_id: id.clone(),
            resolved_by: request.resolved_by,
            resolved_at: now,
            notes: request.notes,
            actions_taken: request.actions_taken,
            attachments: request.attachments,
            time_to_resolve_hours: sla::hours_between(complaint.opened_at, now),
            follow_up_required: request.follow_up_required,
            follow_up_date: request.follow_up_date,
            follow_up_completed: false,
            follow_up_completed_at: None,
            quality_checked: false,
            quality_checked_by: None,
            quality_score: None,
            quality_notes: None,
            reopened: false,
            reopened_at: None,
            reopen_reason: None,
            is_final: true,
            audit: AuditStamp::at(now),
        };

        complaint.status = ComplaintStatus::Resolved;
        complaint.sla_breach = false;
        complaint.audit.touch(now);
        let was_escalated = complaint.escalated;

        let stored = self
            .store
            .record_resolution(complaint, superseded, closed_assignment, fresh)?;

        if was_escalated {
            if let Some(mut latest) = self.store.escalations_for_complaint(id)?.pop() {
                latest.resolved_after_escalation = true;
                latest.audit.touch(now);
                self.store.update_escalation(latest)?;
            }
        }

        info!(complaint = %id, resolution = %stored.id, "complaint resolved");
        Ok(stored)
    }

    /// `RESOLVED -> CLOSED`.
    pub fn close(&self, id: &ComplaintId, now: DateTime<Utc>) -> Result<Complaint, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        let mut complaint = self.fetch_required(id)?;
        self.require_live(&complaint)?;
        if complaint.status != ComplaintStatus::Resolved {
            return Err(InvariantViolation::InvalidTransition {
                complaint: id.clone(),
                from: complaint.status,
                action: "close",
            }
            .into());
        }

        complaint.status = ComplaintStatus::Closed;
        complaint.audit.touch(now);
        Ok(self.store.update_complaint(complaint)?)
    }

    /// Reopen a resolved or closed complaint through its final resolution.
    /// The resolution record is preserved, flipped to non-final; a
    /// subsequent `assign` moves the complaint back into an active cycle.
    pub fn reopen(
        &self,
        resolution_id: &ResolutionId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Complaint, EngineError> {
        let resolution = self
            .store
            .fetch_resolution(resolution_id)?
            .ok_or_else(|| EngineError::ResolutionNotFound(resolution_id.clone()))?;

        let lock = self.lock_for(&resolution.complaint_id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        // Re-read under the lock; the row may have been superseded.
        let mut resolution = self
            .store
            .fetch_resolution(resolution_id)?
            .ok_or_else(|| EngineError::ResolutionNotFound(resolution_id.clone()))?;
        if !resolution.is_final {
            return Err(InvariantViolation::ResolutionNotFinal(resolution_id.clone()).into());
        }

        let mut complaint = self.fetch_required(&resolution.complaint_id)?;
        self.require_live(&complaint)?;
        if !matches!(
            complaint.status,
            ComplaintStatus::Resolved | ComplaintStatus::Closed
        ) {
            return Err(InvariantViolation::InvalidTransition {
                complaint: complaint.id.clone(),
                from: complaint.status,
                action: "reopen",
            }
            .into());
        }

        resolution.reopened = true;
        resolution.reopened_at = Some(now);
        resolution.reopen_reason = Some(reason);
        resolution.is_final = false;
        resolution.audit.touch(now);
        self.store.update_resolution(resolution)?;

        complaint.status = ComplaintStatus::Reopened;
        complaint.reopened_count += 1;
        complaint.audit.touch(now);
        let stored = self.store.update_complaint(complaint)?;

        info!(complaint = %stored.id, count = stored.reopened_count, "complaint reopened");
        Ok(stored)
    }

    /// Manual escalation; the caller names the target.
    pub fn escalate(
        &self,
        id: &ComplaintId,
        request: EscalateRequest,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EngineError> {
        if request.reason.trim().is_empty() {
            return Err(ValidationError::EmptyReason.into());
        }
        self.require_staff(&request.escalated_to)?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().expect("complaint lock poisoned");
        self.escalate_locked(
            id,
            request.reason,
            request.escalated_by,
            request.escalated_to,
            false,
            None,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn escalate_locked(
        &self,
        id: &ComplaintId,
        reason: String,
        escalated_by: StaffId,
        escalated_to: StaffId,
        auto_escalated: bool,
        rule_id: Option<RuleId>,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EngineError> {
        let mut complaint = self.fetch_required(id)?;
        self.require_live(&complaint)?;
        if !complaint.status.is_active() {
            return Err(InvariantViolation::InvalidTransition {
                complaint: id.clone(),
                from: complaint.status,
                action: "escalate",
            }
            .into());
        }

        let existing = self.store.escalations_for_complaint(id)?;
        let level =
            escalation::check_eligibility(id, &existing, self.config.max_escalation_level)?;

        let escalation = Escalation {
            id: EscalationId(next_id(&ESCALATION_SEQUENCE, "esc")),
            complaint_id: id.clone(),
            escalation_level: level,
            escalated_to: escalated_to.clone(),
            escalated_by,
            escalated_at: now,
            reason,
            status_before: complaint.status,
            status_after: complaint.status,
            priority_before: complaint.priority,
            priority_after: complaint.priority,
            responded_at: None,
            responded_by: None,
            response_notes: None,
            resolution_time_hours: None,
            resolved_after_escalation: false,
            auto_escalated,
            rule_id,
            audit: AuditStamp::at(now),
        };

        complaint.escalated = true;
        complaint.audit.touch(now);
        let stored = self.store.record_escalation(complaint, escalation)?;

        info!(
            complaint = %id,
            level = stored.escalation_level,
            auto = auto_escalated,
            "complaint escalated"
        );
        self.events.publish(EngineEvent::EscalationCreated {
            complaint_id: id.clone(),
            escalation_id: stored.id.clone(),
            level: stored.escalation_level,
            escalated_to,
            auto_escalated,
        })?;

        Ok(stored)
    }

    /// Record the response to an escalation and its response time.
    pub fn respond_to_escalation(
        &self,
        id: &EscalationId,
        responder: StaffId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EngineError> {
        let escalation = self
            .store
            .fetch_escalation(id)?
            .ok_or_else(|| EngineError::EscalationNotFound(id.clone()))?;

        let lock = self.lock_for(&escalation.complaint_id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        // Re-read under the lock; a concurrent responder may have won.
        let mut escalation = self
            .store
            .fetch_escalation(id)?
            .ok_or_else(|| EngineError::EscalationNotFound(id.clone()))?;
        if escalation.responded_at.is_some() {
            return Err(InvariantViolation::EscalationAlreadyResponded(id.clone()).into());
        }

        escalation.responded_at = Some(now);
        escalation.responded_by = Some(responder);
        escalation.response_notes = notes;
        escalation.resolution_time_hours = Some(sla::hours_between(escalation.escalated_at, now));
        escalation.audit.touch(now);
        self.store.update_escalation(escalation.clone())?;
        Ok(escalation)
    }

    pub fn escalations(&self, id: &ComplaintId) -> Result<Vec<Escalation>, EngineError> {
        self.fetch_required(id)?;
        Ok(self.store.escalations_for_complaint(id)?)
    }

    /// Apply a one-time quality check to a resolution.
    pub fn quality_check(
        &self,
        id: &ResolutionId,
        checker: StaffId,
        score: u8,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let resolution = self
            .store
            .fetch_resolution(id)?
            .ok_or_else(|| EngineError::ResolutionNotFound(id.clone()))?;

        let lock = self.lock_for(&resolution.complaint_id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        // Re-read under the lock so the once-only check is race free.
        let mut resolution = self
            .store
            .fetch_resolution(id)?
            .ok_or_else(|| EngineError::ResolutionNotFound(id.clone()))?;

        resolution::validate_quality_check(&resolution, score).map_err(|rejection| {
            match rejection {
                QualityCheckRejection::Validation(err) => EngineError::Validation(err),
                QualityCheckRejection::Invariant(err) => EngineError::Invariant(err),
            }
        })?;

        resolution.quality_checked = true;
        resolution.quality_checked_by = Some(checker);
        resolution.quality_score = Some(score);
        resolution.quality_notes = notes;
        resolution.audit.touch(now);
        self.store.update_resolution(resolution.clone())?;
        Ok(resolution)
    }

    pub fn complete_follow_up(
        &self,
        id: &ResolutionId,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let resolution = self
            .store
            .fetch_resolution(id)?
            .ok_or_else(|| EngineError::ResolutionNotFound(id.clone()))?;

        let lock = self.lock_for(&resolution.complaint_id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        let mut resolution = self
            .store
            .fetch_resolution(id)?
            .ok_or_else(|| EngineError::ResolutionNotFound(id.clone()))?;
        if !resolution.follow_up_required {
            return Err(InvariantViolation::NoFollowUpRequired(id.clone()).into());
        }

        resolution.follow_up_completed = true;
        resolution.follow_up_completed_at = Some(now);
        resolution.audit.touch(now);
        self.store.update_resolution(resolution.clone())?;
        Ok(resolution)
    }

    pub fn resolutions(&self, id: &ComplaintId) -> Result<Vec<Resolution>, EngineError> {
        self.fetch_required(id)?;
        Ok(self.store.resolutions_for_complaint(id)?)
    }

    /// Soft-mark a complaint; it drops out of sweeps and workload but the
    /// record and its history remain.
    pub fn archive_complaint(
        &self,
        id: &ComplaintId,
        now: DateTime<Utc>,
    ) -> Result<Complaint, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().expect("complaint lock poisoned");

        let mut complaint = self.fetch_required(id)?;
        if complaint.audit.is_deleted() {
            return Ok(complaint);
        }
        complaint.audit.deleted_at = Some(now);
        complaint.audit.updated_at = now;
        Ok(self.store.update_complaint(complaint)?)
    }

    /// Validate and persist a new auto-escalation rule. Chain targets must
    /// exist at creation time.
    pub fn create_rule(
        &self,
        spec: RuleSpec,
        now: DateTime<Utc>,
    ) -> Result<AutoEscalationRule, EngineError> {
        let rule = self.rule_from_spec(RuleId(next_id(&RULE_SEQUENCE, "rul")), spec, now, None)?;
        Ok(self.store.insert_rule(rule)?)
    }

    /// Replace a rule's configuration; a validation failure persists no
    /// change.
    pub fn update_rule(
        &self,
        id: &RuleId,
        spec: RuleSpec,
        now: DateTime<Utc>,
    ) -> Result<AutoEscalationRule, EngineError> {
        let existing = self
            .store
            .fetch_rule(id)?
            .ok_or_else(|| EngineError::RuleNotFound(id.clone()))?;
        let rule = self.rule_from_spec(id.clone(), spec, now, Some(existing.audit))?;
        self.store.update_rule(rule.clone())?;
        Ok(rule)
    }

    fn rule_from_spec(
        &self,
        id: RuleId,
        spec: RuleSpec,
        now: DateTime<Utc>,
        existing_audit: Option<AuditStamp>,
    ) -> Result<AutoEscalationRule, EngineError> {
        let mut audit = existing_audit.unwrap_or_else(|| AuditStamp::at(now));
        audit.touch(now);

        let rule = AutoEscalationRule {
            id,
            hostel: spec.hostel,
            name: spec.name,
            urgent_hours: spec.urgent_hours,
            high_hours: spec.high_hours,
            medium_hours: spec.medium_hours,
            low_hours: spec.low_hours,
            escalate_on_sla_breach: spec.escalate_on_sla_breach,
            first_escalation_to: spec.first_escalation_to,
            second_escalation_to: spec.second_escalation_to,
            third_escalation_to: spec.third_escalation_to,
            active: spec.active,
            priority: spec.priority,
            conditions: spec.conditions,
            audit,
        };
        escalation::validate_rule(&rule)?;
        for target in [
            &rule.first_escalation_to,
            &rule.second_escalation_to,
            &rule.third_escalation_to,
        ]
        .into_iter()
        .flatten()
        {
            self.require_staff(target)?;
        }
        Ok(rule)
    }

    /// Scheduled entry point: evaluate every active complaint in scope
    /// against its hostel's rules and auto-escalate the eligible ones.
    /// Safe to re-run: complaints escalated inside the evaluation window
    /// are skipped, so a duplicate trigger creates no duplicate rows.
    pub fn run_escalation_sweep(
        &self,
        scope: Option<&HostelId>,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, EngineError> {
        let mut report = SweepReport::default();
        let mut rules_by_hostel: HashMap<HostelId, Vec<AutoEscalationRule>> = HashMap::new();
        let window = chrono::Duration::hours(self.config.sweep_window_hours);

        for complaint in self.store.active_complaints(scope)? {
            report.evaluated += 1;

            if !rules_by_hostel.contains_key(&complaint.hostel) {
                let fetched = self.store.active_rules(&complaint.hostel)?;
                rules_by_hostel.insert(complaint.hostel.clone(), fetched);
            }
            let rules = &rules_by_hostel[&complaint.hostel];

            let age_hours = sla::hours_between(complaint.opened_at, now);
            let breached = sla::is_breached(&complaint, now);
            let Some(rule) =
                escalation::find_applicable_rule(rules, complaint.priority, age_hours, breached)
            else {
                continue;
            };
            let rule = rule.clone();

            let lock = self.lock_for(&complaint.id);
            let _guard = lock.lock().expect("complaint lock poisoned");

            let history = self.store.escalations_for_complaint(&complaint.id)?;
            if history
                .iter()
                .any(|escalation| now - escalation.escalated_at < window)
            {
                report.skipped_recent += 1;
                continue;
            }
            let level = match escalation::check_eligibility(
                &complaint.id,
                &history,
                self.config.max_escalation_level,
            ) {
                Ok(level) => level,
                Err(_) => {
                    report.skipped_ineligible += 1;
                    continue;
                }
            };
            let target = match escalation::auto_target(&rule, level) {
                Ok(target) => target,
                Err(err) => {
                    warn!(complaint = %complaint.id, rule = %rule.id, %err, "sweep skipped");
                    report.skipped_ineligible += 1;
                    continue;
                }
            };

            let reason = if breached && rule.escalate_on_sla_breach {
                format!("sla breached {}h after opening", age_hours)
            } else {
                format!(
                    "unresolved for {}h, {} threshold is {}h",
                    age_hours,
                    complaint.priority.label(),
                    sla::threshold_for(&rule, complaint.priority)
                )
            };
            match self.escalate_locked(
                &complaint.id,
                reason,
                StaffId("system".to_string()),
                target,
                true,
                Some(rule.id.clone()),
                now,
            ) {
                Ok(_) => report.escalated.push(complaint.id.clone()),
                // One failed complaint must not starve the rest of the
                // sweep; the snapshot can be stale by the time the lock is
                // held, and the publish hook can be down.
                Err(err) => {
                    warn!(complaint = %complaint.id, %err, "sweep escalation failed");
                    report.skipped_ineligible += 1;
                }
            }
        }

        info!(
            evaluated = report.evaluated,
            escalated = report.escalated.len(),
            "escalation sweep finished"
        );
        Ok(report)
    }

    /// Scheduled entry point: persist the breach flag for every active
    /// complaint whose SLA due date has passed.
    pub fn run_sla_breach_scan(
        &self,
        scope: Option<&HostelId>,
        now: DateTime<Utc>,
    ) -> Result<SlaScanReport, EngineError> {
        let mut report = SlaScanReport::default();

        for complaint in self.store.active_complaints(scope)? {
            report.scanned += 1;
            if complaint.sla_breach || !sla::is_breached(&complaint, now) {
                continue;
            }

            let lock = self.lock_for(&complaint.id);
            let _guard = lock.lock().expect("complaint lock poisoned");

            let mut current = self.fetch_required(&complaint.id)?;
            if current.sla_breach || !sla::is_breached(&current, now) {
                continue;
            }
            current.sla_breach = true;
            current.audit.touch(now);
            self.store.update_complaint(current)?;
            report.newly_breached.push(complaint.id.clone());
        }

        info!(
            scanned = report.scanned,
            breached = report.newly_breached.len(),
            "sla breach scan finished"
        );
        Ok(report)
    }

    /// On-demand SLA view for display.
    pub fn sla_status(&self, id: &ComplaintId, now: DateTime<Utc>) -> Result<SlaStatus, EngineError> {
        let complaint = self.fetch_required(id)?;
        Ok(sla::sla_status(
            &complaint,
            now,
            self.config.at_risk_buffer_hours,
        ))
    }

    pub fn current_assignment(&self, id: &ComplaintId) -> Result<Option<Assignment>, EngineError> {
        self.fetch_required(id)?;
        Ok(self.store.current_assignment(id)?)
    }

    pub fn assignments(&self, id: &ComplaintId) -> Result<Vec<Assignment>, EngineError> {
        self.fetch_required(id)?;
        Ok(self.store.assignments_for_complaint(id)?)
    }

    /// Current workload summary for one staff member.
    pub fn get_user_workload(
        &self,
        user: &StaffId,
        now: DateTime<Utc>,
    ) -> Result<WorkloadSummary, EngineError> {
        self.require_staff(user)?;
        let pairs = self.assignment_pairs(user)?;
        Ok(assignment::summarize_workload(user.clone(), &pairs, now))
    }

    /// Least-loaded candidate by the composite score; candidate order
    /// breaks ties.
    pub fn suggest_optimal_assignee(
        &self,
        candidates: &[StaffId],
        now: DateTime<Utc>,
    ) -> Result<Option<StaffId>, EngineError> {
        let mut loads = Vec::with_capacity(candidates.len());
        for user in candidates {
            self.require_staff(user)?;
            let history = self.store.assignments_for_user(user)?;
            let terminated = history.iter().filter(|entry| !entry.is_current).count();
            let reassignment_rate = if history.is_empty() {
                0.0
            } else {
                terminated as f64 / history.len() as f64
            };
            let pairs = self.assignment_pairs(user)?;
            let summary = assignment::summarize_workload(user.clone(), &pairs, now);
            loads.push(CandidateLoad {
                user: user.clone(),
                total_score: summary.total_score,
                reassignment_rate,
            });
        }
        Ok(assignment::suggest_optimal_assignee(&loads).map(|best| best.user.clone()))
    }

    /// Advisory balance report across the given staff; never reassigns.
    pub fn balance_workload(
        &self,
        users: &[StaffId],
        threshold_pct: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<WorkloadBalanceReport, EngineError> {
        let threshold = threshold_pct.unwrap_or(self.config.balance_threshold_pct);
        let mut loads = Vec::with_capacity(users.len());
        for user in users {
            self.require_staff(user)?;
            let pairs = self.assignment_pairs(user)?;
            let summary = assignment::summarize_workload(user.clone(), &pairs, now);
            loads.push((user.clone(), summary.total_score));
        }
        Ok(assignment::balance_workload(&loads, threshold))
    }

    fn assignment_pairs(
        &self,
        user: &StaffId,
    ) -> Result<Vec<(Assignment, Complaint)>, EngineError> {
        let mut pairs = Vec::new();
        for entry in self.store.assignments_for_user(user)? {
            if !entry.is_current {
                continue;
            }
            if let Some(complaint) = self.store.fetch_complaint(&entry.complaint_id)? {
                pairs.push((entry, complaint));
            }
        }
        Ok(pairs)
    }
}
