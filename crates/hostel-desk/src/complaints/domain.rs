use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for complaints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComplaintId(pub String);

/// Identifier wrapper for the hostel (tenant) a complaint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostelId(pub String);

/// Identifier wrapper for staff members (assignees, escalation targets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaffId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionId(pub String);

macro_rules! display_as_inner {
    ($($id:ty),+) => {
        $(impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_as_inner!(
    ComplaintId,
    HostelId,
    StaffId,
    AssignmentId,
    EscalationId,
    RuleId,
    ResolutionId
);

/// Creation/update/soft-delete stamps embedded by value in every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AuditStamp {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Lifecycle states of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    Assigned,
    InProgress,
    Resolved,
    Closed,
    Reopened,
}

impl ComplaintStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::Assigned => "assigned",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
            ComplaintStatus::Reopened => "reopened",
        }
    }

    /// Active complaints still count toward workload, SLA tracking, and sweeps.
    pub const fn is_active(self) -> bool {
        !matches!(self, ComplaintStatus::Resolved | ComplaintStatus::Closed)
    }
}

/// Severity ladder used for SLA thresholds and workload scoring.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl Priority {
    pub const fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
            Priority::Critical => "critical",
        }
    }

    /// Base workload points carried by an assignment at this priority.
    pub const fn workload_base(self) -> u32 {
        match self {
            Priority::Critical => 100,
            Priority::Urgent => 75,
            Priority::High => 50,
            Priority::Medium => 25,
            Priority::Low => 10,
        }
    }
}

/// Complaint categories, each with a fixed effort multiplier in [0.8, 1.3].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Plumbing,
    Electrical,
    Cleaning,
    Maintenance,
    Security,
    Internet,
    FoodService,
    Noise,
    Other,
}

impl Category {
    pub const fn label(self) -> &'static str {
        match self {
            Category::Plumbing => "plumbing",
            Category::Electrical => "electrical",
            Category::Cleaning => "cleaning",
            Category::Maintenance => "maintenance",
            Category::Security => "security",
            Category::Internet => "internet",
            Category::FoodService => "food_service",
            Category::Noise => "noise",
            Category::Other => "other",
        }
    }

    pub const fn workload_multiplier(self) -> f64 {
        match self {
            Category::Security => 1.3,
            Category::Electrical => 1.2,
            Category::Plumbing => 1.1,
            Category::Maintenance => 1.0,
            Category::FoodService => 1.0,
            Category::Internet => 0.9,
            Category::Noise => 0.9,
            Category::Cleaning => 0.8,
            Category::Other => 0.8,
        }
    }
}

/// The complaint entity. Owned by the engine, mutated only through the
/// lifecycle controller, soft-marked instead of deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub hostel: HostelId,
    pub title: String,
    pub category: Category,
    pub priority: Priority,
    pub status: ComplaintStatus,
    pub opened_at: DateTime<Utc>,
    pub sla_due_at: Option<DateTime<Utc>>,
    pub sla_breach: bool,
    pub escalated: bool,
    pub reopened_count: u32,
    pub reassigned_count: u32,
    /// Optimistic concurrency token, bumped by the store on every write.
    pub version: u64,
    pub audit: AuditStamp,
}

/// How an assignment came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Manual,
    Auto,
    Transfer,
}

impl AssignmentKind {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentKind::Manual => "manual",
            AssignmentKind::Auto => "auto",
            AssignmentKind::Transfer => "transfer",
        }
    }
}

/// A staffing record for one complaint. At most one row per complaint has
/// `is_current = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub complaint_id: ComplaintId,
    pub assignee: StaffId,
    pub assigner: StaffId,
    pub kind: AssignmentKind,
    pub reason: Option<String>,
    pub estimated_hours: Option<f64>,
    pub assigned_at: DateTime<Utc>,
    pub unassigned_at: Option<DateTime<Utc>>,
    pub is_current: bool,
    pub workload_score: i64,
    pub duration_hours: Option<i64>,
    pub audit: AuditStamp,
}

/// One rung of a complaint's escalation chain. Levels are strictly
/// increasing per complaint; rows are immutable except for the response and
/// resolution fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: EscalationId,
    pub complaint_id: ComplaintId,
    pub escalation_level: u32,
    pub escalated_to: StaffId,
    pub escalated_by: StaffId,
    pub escalated_at: DateTime<Utc>,
    pub reason: String,
    pub status_before: ComplaintStatus,
    pub status_after: ComplaintStatus,
    pub priority_before: Priority,
    pub priority_after: Priority,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<StaffId>,
    pub response_notes: Option<String>,
    pub resolution_time_hours: Option<i64>,
    pub resolved_after_escalation: bool,
    pub auto_escalated: bool,
    pub rule_id: Option<RuleId>,
    pub audit: AuditStamp,
}

impl Escalation {
    pub fn is_pending(&self) -> bool {
        self.responded_at.is_none()
    }
}

/// Per-hostel auto-escalation configuration. Threshold ordering
/// (`urgent < high < medium < low`, all positive) is validated before any
/// write; violating updates are rejected wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoEscalationRule {
    pub id: RuleId,
    pub hostel: HostelId,
    pub name: String,
    pub urgent_hours: i64,
    pub high_hours: i64,
    pub medium_hours: i64,
    pub low_hours: i64,
    pub escalate_on_sla_breach: bool,
    pub first_escalation_to: Option<StaffId>,
    pub second_escalation_to: Option<StaffId>,
    pub third_escalation_to: Option<StaffId>,
    pub active: bool,
    /// Tie-break ordering across a hostel's rules; lower evaluates first.
    pub priority: i32,
    pub conditions: BTreeMap<String, String>,
    pub audit: AuditStamp,
}

impl AutoEscalationRule {
    /// Chain target for a given escalation level (1-based).
    pub fn chain_target(&self, level: u32) -> Option<&StaffId> {
        match level {
            1 => self.first_escalation_to.as_ref(),
            2 => self.second_escalation_to.as_ref(),
            3 => self.third_escalation_to.as_ref(),
            _ => None,
        }
    }
}

/// Outcome record for a complaint. At most one row per complaint has
/// `is_final = true`; reopening flips the previous final row instead of
/// deleting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: ResolutionId,
    pub complaint_id: ComplaintId,
    pub resolved_by: StaffId,
    pub resolved_at: DateTime<Utc>,
    pub notes: String,
    pub actions_taken: Vec<String>,
    pub attachments: Vec<String>,
    pub time_to_resolve_hours: i64,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_completed: bool,
    pub follow_up_completed_at: Option<DateTime<Utc>>,
    pub quality_checked: bool,
    pub quality_checked_by: Option<StaffId>,
    pub quality_score: Option<u8>,
    pub quality_notes: Option<String>,
    pub reopened: bool,
    pub reopened_at: Option<DateTime<Utc>>,
    pub reopen_reason: Option<String>,
    pub is_final: bool,
    pub audit: AuditStamp,
}

/// Request-shaped validation failures, rejected before any write.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "rule thresholds must satisfy urgent < high < medium < low, got {urgent} / {high} / {medium} / {low}"
    )]
    ThresholdOrder {
        urgent: i64,
        high: i64,
        medium: i64,
        low: i64,
    },
    #[error("rule thresholds must all be positive")]
    NonPositiveThreshold,
    #[error("rule priority must be positive, got {0}")]
    NonPositiveRulePriority(i32),
    #[error("rule defines no escalation target for level {level}")]
    MissingChainTarget { level: u32 },
    #[error("quality score must be between 1 and 10, got {0}")]
    QualityScoreRange(u8),
    #[error("complaint title must not be empty")]
    EmptyTitle,
    #[error("escalation reason must not be empty")]
    EmptyReason,
}

/// Broken engine invariants. Each maps to a rejected request that persisted
/// no change.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("complaint {complaint} cannot {action} from status {}", from.label())]
    InvalidTransition {
        complaint: ComplaintId,
        from: ComplaintStatus,
        action: &'static str,
    },
    #[error("previous escalation for complaint {0} is still pending a response")]
    EscalationPending(ComplaintId),
    #[error("complaint {complaint} already escalated to the maximum level {max_level}")]
    MaxEscalationLevel {
        complaint: ComplaintId,
        max_level: u32,
    },
    #[error("escalation {0} was already responded to")]
    EscalationAlreadyResponded(EscalationId),
    #[error("resolution {0} was already quality checked")]
    QualityAlreadyChecked(ResolutionId),
    #[error("resolution {0} does not require a follow-up")]
    NoFollowUpRequired(ResolutionId),
    #[error("resolution {0} is no longer the final resolution")]
    ResolutionNotFinal(ResolutionId),
    #[error("complaint {0} is archived")]
    ComplaintArchived(ComplaintId),
}
