use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{ComplaintId, EscalationId, ResolutionId, RuleId, StaffId};
use super::lifecycle::{
    AssignRequest, ComplaintService, EngineError, EscalateRequest, NewComplaint, ResolveRequest,
    RuleSpec,
};
use super::repository::{ComplaintStore, EventPublisher};

/// Router builder exposing the engine's caller API.
pub fn complaint_router<S, P>(service: Arc<ComplaintService<S, P>>) -> Router
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route("/api/v1/complaints", post(file_complaint::<S, P>))
        .route("/api/v1/complaints/:id", get(get_complaint::<S, P>))
        .route(
            "/api/v1/complaints/:id/archive",
            post(archive_complaint::<S, P>),
        )
        .route("/api/v1/complaints/:id/assign", post(assign::<S, P>))
        .route("/api/v1/complaints/:id/start", post(start_work::<S, P>))
        .route("/api/v1/complaints/:id/resolve", post(resolve::<S, P>))
        .route("/api/v1/complaints/:id/close", post(close::<S, P>))
        .route("/api/v1/complaints/:id/escalate", post(escalate::<S, P>))
        .route(
            "/api/v1/complaints/:id/escalations",
            get(list_escalations::<S, P>),
        )
        .route("/api/v1/complaints/:id/sla", get(sla_status::<S, P>))
        .route(
            "/api/v1/escalations/:id/respond",
            post(respond_to_escalation::<S, P>),
        )
        .route("/api/v1/resolutions/:id/reopen", post(reopen::<S, P>))
        .route(
            "/api/v1/resolutions/:id/quality-check",
            post(quality_check::<S, P>),
        )
        .route(
            "/api/v1/resolutions/:id/follow-up/complete",
            post(complete_follow_up::<S, P>),
        )
        .route("/api/v1/rules", post(create_rule::<S, P>))
        .route("/api/v1/rules/:id", put(update_rule::<S, P>))
        .route("/api/v1/staff/:user/workload", get(user_workload::<S, P>))
        .route("/api/v1/staff/suggest", post(suggest_assignee::<S, P>))
        .route("/api/v1/staff/balance", post(balance_workload::<S, P>))
        .route(
            "/api/v1/sweeps/escalation",
            post(run_escalation_sweep::<S, P>),
        )
        .route("/api/v1/sweeps/sla", post(run_sla_scan::<S, P>))
        .with_state(service)
}

fn error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Invariant(_) | EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::ComplaintNotFound(_)
        | EngineError::StaffNotFound(_)
        | EngineError::EscalationNotFound(_)
        | EngineError::ResolutionNotFound(_)
        | EngineError::RuleNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Store(_) | EngineError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = Json(json!({ "error": error.to_string() }));
    (status, body).into_response()
}

fn respond<T: serde::Serialize>(
    result: Result<T, EngineError>,
    success: StatusCode,
) -> Response {
    match result {
        Ok(value) => (success, Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

type Service<S, P> = State<Arc<ComplaintService<S, P>>>;

async fn file_complaint<S, P>(
    State(service): Service<S, P>,
    Json(request): Json<NewComplaint>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.file_complaint(request, Utc::now()),
        StatusCode::CREATED,
    )
}

async fn get_complaint<S, P>(State(service): Service<S, P>, Path(id): Path<String>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(service.get_complaint(&ComplaintId(id)), StatusCode::OK)
}

async fn archive_complaint<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.archive_complaint(&ComplaintId(id), Utc::now()),
        StatusCode::OK,
    )
}

async fn assign<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.assign(&ComplaintId(id), request, Utc::now()),
        StatusCode::OK,
    )
}

async fn start_work<S, P>(State(service): Service<S, P>, Path(id): Path<String>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.start_work(&ComplaintId(id), Utc::now()),
        StatusCode::OK,
    )
}

async fn resolve<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.create_resolution(&ComplaintId(id), request, Utc::now()),
        StatusCode::CREATED,
    )
}

async fn close<S, P>(State(service): Service<S, P>, Path(id): Path<String>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(service.close(&ComplaintId(id), Utc::now()), StatusCode::OK)
}

async fn escalate<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
    Json(request): Json<EscalateRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.escalate(&ComplaintId(id), request, Utc::now()),
        StatusCode::CREATED,
    )
}

async fn list_escalations<S, P>(State(service): Service<S, P>, Path(id): Path<String>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(service.escalations(&ComplaintId(id)), StatusCode::OK)
}

async fn sla_status<S, P>(State(service): Service<S, P>, Path(id): Path<String>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.sla_status(&ComplaintId(id), Utc::now()),
        StatusCode::OK,
    )
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    responder: StaffId,
    #[serde(default)]
    notes: Option<String>,
}

async fn respond_to_escalation<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.respond_to_escalation(
            &EscalationId(id),
            request.responder,
            request.notes,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

#[derive(Debug, Deserialize)]
struct ReopenRequest {
    reason: String,
}

async fn reopen<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
    Json(request): Json<ReopenRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.reopen(&ResolutionId(id), request.reason, Utc::now()),
        StatusCode::OK,
    )
}

#[derive(Debug, Deserialize)]
struct QualityCheckRequest {
    checker: StaffId,
    score: u8,
    #[serde(default)]
    notes: Option<String>,
}

async fn quality_check<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
    Json(request): Json<QualityCheckRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.quality_check(
            &ResolutionId(id),
            request.checker,
            request.score,
            request.notes,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

async fn complete_follow_up<S, P>(State(service): Service<S, P>, Path(id): Path<String>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.complete_follow_up(&ResolutionId(id), Utc::now()),
        StatusCode::OK,
    )
}

async fn create_rule<S, P>(State(service): Service<S, P>, Json(spec): Json<RuleSpec>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(service.create_rule(spec, Utc::now()), StatusCode::CREATED)
}

async fn update_rule<S, P>(
    State(service): Service<S, P>,
    Path(id): Path<String>,
    Json(spec): Json<RuleSpec>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.update_rule(&RuleId(id), spec, Utc::now()),
        StatusCode::OK,
    )
}

async fn user_workload<S, P>(State(service): Service<S, P>, Path(user): Path<String>) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.get_user_workload(&StaffId(user), Utc::now()),
        StatusCode::OK,
    )
}

#[derive(Debug, Deserialize)]
struct CandidatesRequest {
    candidates: Vec<StaffId>,
}

async fn suggest_assignee<S, P>(
    State(service): Service<S, P>,
    Json(request): Json<CandidatesRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    match service.suggest_optimal_assignee(&request.candidates, Utc::now()) {
        Ok(best) => (StatusCode::OK, Json(json!({ "assignee": best }))).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct BalanceRequest {
    users: Vec<StaffId>,
    #[serde(default)]
    threshold_pct: Option<f64>,
}

async fn balance_workload<S, P>(
    State(service): Service<S, P>,
    Json(request): Json<BalanceRequest>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    respond(
        service.balance_workload(&request.users, request.threshold_pct, Utc::now()),
        StatusCode::OK,
    )
}

#[derive(Debug, Deserialize)]
struct SweepScope {
    #[serde(default)]
    hostel: Option<String>,
}

async fn run_escalation_sweep<S, P>(
    State(service): Service<S, P>,
    Query(scope): Query<SweepScope>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    let hostel = scope.hostel.map(super::domain::HostelId);
    respond(
        service.run_escalation_sweep(hostel.as_ref(), Utc::now()),
        StatusCode::OK,
    )
}

async fn run_sla_scan<S, P>(
    State(service): Service<S, P>,
    Query(scope): Query<SweepScope>,
) -> Response
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    let hostel = scope.hostel.map(super::domain::HostelId);
    respond(
        service.run_sla_breach_scan(hostel.as_ref(), Utc::now()),
        StatusCode::OK,
    )
}
