//! The complaint lifecycle engine: state machine, staff workload balancing,
//! auto-escalation rules with SLA timers, and the resolution/reopen cycle.
//!
//! Storage and notification delivery are collaborators behind the
//! [`repository::ComplaintStore`] and [`repository::EventPublisher`] traits;
//! the engine owns the state and its invariants, nothing else.

pub mod assignment;
pub mod domain;
pub mod escalation;
pub mod lifecycle;
pub mod repository;
pub mod resolution;
pub mod router;
pub mod sla;

#[cfg(test)]
mod tests;

pub use assignment::{
    suggest_optimal_assignee, workload_score, CandidateLoad, LoadDeviation,
    ReassignmentSuggestion, WorkloadBalanceReport, WorkloadSummary,
};
pub use domain::{
    Assignment, AssignmentId, AssignmentKind, AuditStamp, AutoEscalationRule, Category,
    Complaint, ComplaintId, ComplaintStatus, Escalation, EscalationId, HostelId,
    InvariantViolation, Priority, Resolution, ResolutionId, RuleId, StaffId, ValidationError,
};
pub use lifecycle::{
    AssignRequest, ComplaintService, EngineConfig, EngineError, EscalateRequest, NewComplaint,
    ResolveRequest, RuleSpec, SlaScanReport, SweepReport,
};
pub use repository::{
    ComplaintStore, EngineEvent, EventPublisher, PublishError, StoreError,
};
pub use router::complaint_router;
pub use sla::SlaStatus;
