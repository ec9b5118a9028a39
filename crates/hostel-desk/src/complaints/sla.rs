//! SLA due dates and breach status, computed from a complaint and the
//! hostel's active rule. "At risk" is never persisted; callers pass the
//! buffer they care about.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{AutoEscalationRule, Complaint, Priority};

/// Escalation threshold in hours for a priority under a rule. Critical
/// complaints share the urgent threshold.
pub fn threshold_for(rule: &AutoEscalationRule, priority: Priority) -> i64 {
    match priority {
        Priority::Critical | Priority::Urgent => rule.urgent_hours,
        Priority::High => rule.high_hours,
        Priority::Medium => rule.medium_hours,
        Priority::Low => rule.low_hours,
    }
}

/// Due date for a complaint opened at `opened_at` under `rule`.
pub fn due_date(
    rule: &AutoEscalationRule,
    priority: Priority,
    opened_at: DateTime<Utc>,
) -> DateTime<Utc> {
    opened_at + Duration::hours(threshold_for(rule, priority))
}

/// A complaint breaches once its due date has passed while it is still
/// active.
pub fn is_breached(complaint: &Complaint, now: DateTime<Utc>) -> bool {
    match complaint.sla_due_at {
        Some(due) => complaint.status.is_active() && now > due,
        None => false,
    }
}

/// Due within `buffer_hours` but not yet breached.
pub fn is_at_risk(complaint: &Complaint, now: DateTime<Utc>, buffer_hours: i64) -> bool {
    match complaint.sla_due_at {
        Some(due) => {
            complaint.status.is_active() && now <= due && due - now <= Duration::hours(buffer_hours)
        }
        None => false,
    }
}

/// Whole hours between two instants, floored.
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_hours()
}

/// Hours between two instants, rounded to the nearest whole hour.
pub fn hours_between_rounded(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let minutes = (end - start).num_minutes();
    (minutes as f64 / 60.0).round() as i64
}

/// On-demand SLA read model for display.
#[derive(Debug, Clone, Serialize)]
pub struct SlaStatus {
    pub due_at: Option<DateTime<Utc>>,
    pub breached: bool,
    pub at_risk: bool,
    pub hours_remaining: Option<i64>,
}

pub fn sla_status(complaint: &Complaint, now: DateTime<Utc>, buffer_hours: i64) -> SlaStatus {
    SlaStatus {
        due_at: complaint.sla_due_at,
        breached: is_breached(complaint, now),
        at_risk: is_at_risk(complaint, now, buffer_hours),
        hours_remaining: complaint
            .sla_due_at
            .map(|due| hours_between(now, due)),
    }
}
