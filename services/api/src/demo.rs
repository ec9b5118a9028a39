use crate::infra::{InMemoryComplaintStore, LoggingEventPublisher};
use chrono::{Duration, Utc};
use clap::Args;
use hostel_desk::complaints::{
    AssignRequest, AssignmentKind, Category, ComplaintService, ComplaintStore, EngineConfig,
    EngineError, HostelId, NewComplaint, Priority, ResolveRequest, RuleSpec, StaffId,
};
use hostel_desk::error::AppError;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Hostel name used for the seeded data
    #[arg(long, default_value = "aurora-house")]
    pub(crate) hostel: String,
    /// Skip the workload and balance report at the end
    #[arg(long)]
    pub(crate) skip_reports: bool,
}

/// Console walkthrough: seeds a rule and staff, then drives one complaint
/// through assignment, auto-escalation, resolution and a reopen cycle with
/// a simulated clock.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let hostel = HostelId(args.hostel);
    let staff = ["asha", "ben", "warden", "manager", "director"];

    let store = Arc::new(InMemoryComplaintStore::default());
    let events = Arc::new(LoggingEventPublisher);
    let service = ComplaintService::new(store.clone(), events, EngineConfig::default());

    for name in staff {
        store.register_staff(StaffId(name.to_string())).map_err(EngineError::from)?;
    }

    // walk a two-day window ending now
    let opened_at = Utc::now() - Duration::hours(48);

    println!("Hostel complaint desk demo ({})", hostel);
    let rule = service.create_rule(
        RuleSpec {
            hostel: hostel.clone(),
            name: "standard response times".to_string(),
            urgent_hours: 4,
            high_hours: 12,
            medium_hours: 24,
            low_hours: 48,
            escalate_on_sla_breach: true,
            first_escalation_to: Some(StaffId("warden".to_string())),
            second_escalation_to: Some(StaffId("manager".to_string())),
            third_escalation_to: Some(StaffId("director".to_string())),
            active: true,
            priority: 1,
            conditions: Default::default(),
        },
        opened_at,
    )?;
    println!(
        "- Rule '{}' active (urgent {}h / high {}h / medium {}h / low {}h)",
        rule.name, rule.urgent_hours, rule.high_hours, rule.medium_hours, rule.low_hours
    );

    let complaint = service.file_complaint(
        NewComplaint {
            hostel: hostel.clone(),
            title: "No hot water on floor two".to_string(),
            category: Category::Plumbing,
            priority: Priority::Urgent,
        },
        opened_at,
    )?;
    println!(
        "- Filed {} '{}' ({} / {}), SLA due {}",
        complaint.id,
        complaint.title,
        complaint.category.label(),
        complaint.priority.label(),
        complaint
            .sla_due_at
            .map(|due| due.to_rfc3339())
            .unwrap_or_else(|| "none".to_string()),
    );

    let assignment = service.assign(
        &complaint.id,
        AssignRequest {
            assignee: StaffId("asha".to_string()),
            assigner: StaffId("warden".to_string()),
            kind: AssignmentKind::Manual,
            reason: Some("plumbing rotation".to_string()),
            estimated_hours: Some(4.0),
        },
        opened_at + Duration::hours(1),
    )?;
    println!(
        "- Assigned to {} (workload score {})",
        assignment.assignee, assignment.workload_score
    );
    service.start_work(&complaint.id, opened_at + Duration::hours(2))?;

    // the urgent threshold passes unresolved, so the sweep escalates
    let sweep_at = opened_at + Duration::hours(6);
    let report = service.run_sla_breach_scan(Some(&hostel), sweep_at)?;
    println!(
        "- SLA scan at +6h: {} scanned, {} newly breached",
        report.scanned,
        report.newly_breached.len()
    );
    let sweep = service.run_escalation_sweep(Some(&hostel), sweep_at)?;
    println!(
        "- Escalation sweep: {} evaluated, {} escalated",
        sweep.evaluated,
        sweep.escalated.len()
    );
    for escalation in service.escalations(&complaint.id)? {
        println!(
            "  level {} -> {} ({})",
            escalation.escalation_level, escalation.escalated_to, escalation.reason
        );
        service.respond_to_escalation(
            &escalation.id,
            escalation.escalated_to.clone(),
            Some("picked up by the warden".to_string()),
            sweep_at + Duration::hours(1),
        )?;
    }

    let resolution = service.create_resolution(
        &complaint.id,
        ResolveRequest {
            resolved_by: StaffId("asha".to_string()),
            notes: "Boiler reset and descaled".to_string(),
            actions_taken: vec!["reset boiler".to_string(), "descale heat exchanger".to_string()],
            attachments: Vec::new(),
            follow_up_required: false,
            follow_up_date: None,
        },
        opened_at + Duration::hours(9),
    )?;
    println!(
        "- Resolved by {} after {}h",
        resolution.resolved_by, resolution.time_to_resolve_hours
    );

    let reopened = service.reopen(
        &resolution.id,
        "still lukewarm in the evening".to_string(),
        opened_at + Duration::hours(30),
    )?;
    println!(
        "- Reopened ({} reopen so far), status {}",
        reopened.reopened_count,
        reopened.status.label()
    );

    service.assign(
        &reopened.id,
        AssignRequest {
            assignee: StaffId("ben".to_string()),
            assigner: StaffId("warden".to_string()),
            kind: AssignmentKind::Transfer,
            reason: Some("fresh eyes".to_string()),
            estimated_hours: Some(2.0),
        },
        opened_at + Duration::hours(31),
    )?;
    let second = service.create_resolution(
        &complaint.id,
        ResolveRequest {
            resolved_by: StaffId("ben".to_string()),
            notes: "Replaced the mixing valve".to_string(),
            actions_taken: vec!["replace mixing valve".to_string()],
            attachments: Vec::new(),
            follow_up_required: true,
            follow_up_date: Some((opened_at + Duration::days(3)).date_naive()),
        },
        opened_at + Duration::hours(36),
    )?;
    let closed = service.close(&complaint.id, opened_at + Duration::hours(40))?;
    println!(
        "- Closed after second fix by {} (follow-up due {})",
        second.resolved_by,
        second
            .follow_up_date
            .map(|date| date.to_string())
            .unwrap_or_else(|| "none".to_string()),
    );
    println!("- Final status: {}", closed.status.label());

    if args.skip_reports {
        return Ok(());
    }

    let now = Utc::now();
    println!("\nWorkload");
    for name in ["asha", "ben"] {
        let summary = service.get_user_workload(&StaffId(name.to_string()), now)?;
        println!(
            "- {}: score {}, {} active, {} overdue",
            summary.user, summary.total_score, summary.active_assignments, summary.overdue
        );
    }

    let candidates: Vec<StaffId> = ["asha", "ben"]
        .iter()
        .map(|name| StaffId(name.to_string()))
        .collect();
    match service.suggest_optimal_assignee(&candidates, now)? {
        Some(best) => println!("Next assignment suggestion: {}", best),
        None => println!("Next assignment suggestion: none"),
    }

    let balance = service.balance_workload(&candidates, None, now)?;
    if balance.suggestions.is_empty() {
        println!("Balance report: workload within threshold");
    } else {
        for suggestion in &balance.suggestions {
            println!(
                "Balance suggestion: move work from {} to {}",
                suggestion.from, suggestion.to
            );
        }
    }

    Ok(())
}
