use serde::{Deserialize, Serialize};

use super::domain::{
    Assignment, AssignmentId, AutoEscalationRule, Complaint, ComplaintId, Escalation,
    EscalationId, HostelId, Resolution, ResolutionId, RuleId, StaffId,
};

/// Storage abstraction for the engine. Implementations must make each
/// mutating method atomic: the multi-row methods
/// (`record_assignment_change`, `record_resolution`, `record_escalation`)
/// commit every row they are handed in one unit or none at all.
///
/// `update_complaint` and the multi-row methods compare the `version` on the
/// passed complaint against the stored row and return
/// [`StoreError::VersionConflict`] on mismatch, bumping the version on
/// success.
pub trait ComplaintStore: Send + Sync {
    /// Staff directory seam. The engine validates assignees and escalation
    /// chain members against it; identity management itself lives elsewhere.
    fn register_staff(&self, staff: StaffId) -> Result<(), StoreError>;
    fn staff_known(&self, staff: &StaffId) -> Result<bool, StoreError>;

    fn insert_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError>;
    fn fetch_complaint(&self, id: &ComplaintId) -> Result<Option<Complaint>, StoreError>;
    fn update_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError>;
    /// Complaints in active statuses for one hostel, or all hostels when
    /// `hostel` is `None`. Soft-deleted complaints are excluded.
    fn active_complaints(&self, hostel: Option<&HostelId>) -> Result<Vec<Complaint>, StoreError>;

    /// Terminate `closed` (when given) and insert `opened` together with the
    /// complaint update, as one transaction.
    fn record_assignment_change(
        &self,
        complaint: Complaint,
        closed: Option<Assignment>,
        opened: Assignment,
    ) -> Result<Complaint, StoreError>;
    fn fetch_assignment(&self, id: &AssignmentId) -> Result<Option<Assignment>, StoreError>;
    fn update_assignment(&self, assignment: Assignment) -> Result<(), StoreError>;
    fn current_assignment(&self, id: &ComplaintId) -> Result<Option<Assignment>, StoreError>;
    fn assignments_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Assignment>, StoreError>;
    fn assignments_for_user(&self, user: &StaffId) -> Result<Vec<Assignment>, StoreError>;

    /// Insert the escalation together with the complaint update, as one
    /// transaction.
    fn record_escalation(
        &self,
        complaint: Complaint,
        escalation: Escalation,
    ) -> Result<Escalation, StoreError>;
    fn fetch_escalation(&self, id: &EscalationId) -> Result<Option<Escalation>, StoreError>;
    fn update_escalation(&self, escalation: Escalation) -> Result<(), StoreError>;
    /// All escalations for a complaint in creation order.
    fn escalations_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Escalation>, StoreError>;

    fn insert_rule(&self, rule: AutoEscalationRule) -> Result<AutoEscalationRule, StoreError>;
    fn fetch_rule(&self, id: &RuleId) -> Result<Option<AutoEscalationRule>, StoreError>;
    fn update_rule(&self, rule: AutoEscalationRule) -> Result<(), StoreError>;
    /// Active rules for a hostel ordered by rule priority ascending.
    fn active_rules(&self, hostel: &HostelId) -> Result<Vec<AutoEscalationRule>, StoreError>;

    /// Flip `superseded` (when given) to non-final, terminate
    /// `closed_assignment` (when given), and insert `fresh` together with
    /// the complaint update, as one transaction.
    fn record_resolution(
        &self,
        complaint: Complaint,
        superseded: Option<Resolution>,
        closed_assignment: Option<Assignment>,
        fresh: Resolution,
    ) -> Result<Resolution, StoreError>;
    fn fetch_resolution(&self, id: &ResolutionId) -> Result<Option<Resolution>, StoreError>;
    fn update_resolution(&self, resolution: Resolution) -> Result<(), StoreError>;
    fn resolutions_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Resolution>, StoreError>;
    fn final_resolution(&self, id: &ComplaintId) -> Result<Option<Resolution>, StoreError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("complaint {0} was modified concurrently")]
    VersionConflict(ComplaintId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Events emitted after a successful commit so the notification dispatcher
/// can fan them out. The engine never formats or sends notifications itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    AssignmentChanged {
        complaint_id: ComplaintId,
        assignee: StaffId,
        previous_assignee: Option<StaffId>,
    },
    EscalationCreated {
        complaint_id: ComplaintId,
        escalation_id: EscalationId,
        level: u32,
        escalated_to: StaffId,
        auto_escalated: bool,
    },
}

/// Outbound hook for the notification dispatcher collaborator.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: EngineEvent) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}
