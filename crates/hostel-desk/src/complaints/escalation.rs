//! Rule validation and escalation eligibility. The lifecycle controller
//! owns the writes; everything here is pure.

use super::domain::{
    AutoEscalationRule, ComplaintId, Escalation, InvariantViolation, StaffId, ValidationError,
};
use super::sla;

/// Reject rules whose thresholds are not strictly ordered
/// (`urgent < high < medium < low`), not positive, or whose tie-break
/// priority is not positive.
pub fn validate_rule(rule: &AutoEscalationRule) -> Result<(), ValidationError> {
    if rule.urgent_hours <= 0 || rule.high_hours <= 0 || rule.medium_hours <= 0 || rule.low_hours <= 0 {
        return Err(ValidationError::NonPositiveThreshold);
    }
    if !(rule.urgent_hours < rule.high_hours
        && rule.high_hours < rule.medium_hours
        && rule.medium_hours < rule.low_hours)
    {
        return Err(ValidationError::ThresholdOrder {
            urgent: rule.urgent_hours,
            high: rule.high_hours,
            medium: rule.medium_hours,
            low: rule.low_hours,
        });
    }
    if rule.priority <= 0 {
        return Err(ValidationError::NonPositiveRulePriority(rule.priority));
    }
    Ok(())
}

/// First active rule (by rule priority ascending) that fires for the given
/// complaint state: either the complaint breached its SLA and the rule
/// escalates on breach, or the complaint's age reached the rule's threshold
/// for its priority.
pub fn find_applicable_rule<'a>(
    rules: &'a [AutoEscalationRule],
    priority: super::domain::Priority,
    age_hours: i64,
    sla_breached: bool,
) -> Option<&'a AutoEscalationRule> {
    rules.iter().find(|rule| {
        (sla_breached && rule.escalate_on_sla_breach)
            || age_hours >= sla::threshold_for(rule, priority)
    })
}

/// Next escalation level for a complaint: max existing level + 1.
pub fn next_level(existing: &[Escalation]) -> u32 {
    existing
        .iter()
        .map(|escalation| escalation.escalation_level)
        .max()
        .unwrap_or(0)
        + 1
}

/// Eligibility gate for a new escalation: the most recent escalation must
/// have been responded to, and the chain must not already sit at the
/// maximum level.
pub fn check_eligibility(
    complaint_id: &ComplaintId,
    existing: &[Escalation],
    max_level: u32,
) -> Result<u32, InvariantViolation> {
    if let Some(latest) = existing.last() {
        if latest.is_pending() {
            return Err(InvariantViolation::EscalationPending(complaint_id.clone()));
        }
    }
    let level = next_level(existing);
    if level > max_level {
        return Err(InvariantViolation::MaxEscalationLevel {
            complaint: complaint_id.clone(),
            max_level,
        });
    }
    Ok(level)
}

/// Target for an auto escalation at `level`, taken from the rule's chain.
/// Chain membership is only validated at rule-creation time; a hole at the
/// reached level is a validation error here.
pub fn auto_target(rule: &AutoEscalationRule, level: u32) -> Result<StaffId, ValidationError> {
    rule.chain_target(level)
        .cloned()
        .ok_or(ValidationError::MissingChainTarget { level })
}
