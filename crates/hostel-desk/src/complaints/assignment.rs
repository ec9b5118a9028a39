//! Workload scoring and staff load balancing. Pure functions over slices;
//! the lifecycle controller supplies the data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Assignment, Category, Complaint, Priority, StaffId};
use super::sla;

/// Effort factor is `estimated_hours / 4` capped at 2.0; an assignment with
/// no estimate carries a neutral factor of 1.0.
fn effort_factor(estimated_hours: Option<f64>) -> f64 {
    match estimated_hours {
        Some(hours) => (hours / 4.0).min(2.0),
        None => 1.0,
    }
}

/// Workload points for one assignment, truncated to an integer.
pub fn workload_score(
    priority: Priority,
    category: Category,
    estimated_hours: Option<f64>,
) -> i64 {
    let raw = f64::from(priority.workload_base())
        * category.workload_multiplier()
        * effort_factor(estimated_hours);
    raw.trunc() as i64
}

/// Aggregated load for one staff member over their current assignments on
/// active complaints.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadSummary {
    pub user: StaffId,
    pub total_score: i64,
    pub active_assignments: u32,
    pub by_priority: BTreeMap<Priority, u32>,
    pub overdue: u32,
}

/// Build a summary from a user's assignments paired with their complaints.
/// Non-current assignments and resolved/closed complaints are skipped.
pub fn summarize_workload(
    user: StaffId,
    assignments: &[(Assignment, Complaint)],
    now: DateTime<Utc>,
) -> WorkloadSummary {
    let mut summary = WorkloadSummary {
        user,
        total_score: 0,
        active_assignments: 0,
        by_priority: BTreeMap::new(),
        overdue: 0,
    };

    for (assignment, complaint) in assignments {
        if !assignment.is_current || !complaint.status.is_active() || complaint.audit.is_deleted()
        {
            continue;
        }
        summary.total_score += assignment.workload_score;
        summary.active_assignments += 1;
        *summary.by_priority.entry(complaint.priority).or_default() += 1;
        if sla::is_breached(complaint, now) {
            summary.overdue += 1;
        }
    }

    summary
}

/// Inputs for assignee suggestion: current load plus how often the
/// candidate's past assignments were handed off.
#[derive(Debug, Clone)]
pub struct CandidateLoad {
    pub user: StaffId,
    pub total_score: i64,
    /// Terminated assignments / all assignments, in [0, 1].
    pub reassignment_rate: f64,
}

impl CandidateLoad {
    fn composite(&self) -> f64 {
        0.5 * self.total_score as f64 + 0.3 * (self.reassignment_rate * 10.0)
    }
}

/// Candidate with the lowest composite load. Ties keep the earlier
/// candidate, so the result is deterministic for a given input order.
pub fn suggest_optimal_assignee(candidates: &[CandidateLoad]) -> Option<&CandidateLoad> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.composite() <= candidate.composite() => Some(current),
        _ => Some(candidate),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadDeviation {
    pub user: StaffId,
    pub total_score: i64,
    pub deviation_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReassignmentSuggestion {
    pub from: StaffId,
    pub to: StaffId,
}

/// Advisory report: who sits outside the threshold band around the mean and
/// which handoffs would narrow the spread. Never mutates assignments.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkloadBalanceReport {
    pub mean_score: f64,
    pub overloaded: Vec<LoadDeviation>,
    pub underloaded: Vec<LoadDeviation>,
    pub suggestions: Vec<ReassignmentSuggestion>,
}

pub fn balance_workload(
    loads: &[(StaffId, i64)],
    threshold_pct: f64,
) -> WorkloadBalanceReport {
    if loads.is_empty() {
        return WorkloadBalanceReport::default();
    }

    let mean = loads.iter().map(|(_, score)| *score as f64).sum::<f64>() / loads.len() as f64;
    let mut report = WorkloadBalanceReport {
        mean_score: mean,
        ..WorkloadBalanceReport::default()
    };
    if mean == 0.0 {
        return report;
    }

    for (user, score) in loads {
        let deviation_pct = (*score as f64 - mean) / mean * 100.0;
        let entry = LoadDeviation {
            user: user.clone(),
            total_score: *score,
            deviation_pct,
        };
        if deviation_pct > threshold_pct {
            report.overloaded.push(entry);
        } else if deviation_pct < -threshold_pct {
            report.underloaded.push(entry);
        }
    }

    for over in &report.overloaded {
        for under in &report.underloaded {
            report.suggestions.push(ReassignmentSuggestion {
                from: over.user.clone(),
                to: under.user.clone(),
            });
        }
    }

    report
}
