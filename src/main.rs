use axum::{
    Router,
    extract::{
        FromRequest, FromRequestParts, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::{
    BeginRunRes, DispatchReminderReq, DispatchReminderRes, ErrorRes, HealthRes, HealthService,
    ListPatientsRes, ListRemindersRes, SearchPatientsReq,
};
use outreach_core::{
    CatalogSummary, Classification, CohortCatalog, ContactInfo, CoreConfig, CoreContext,
    InterventionAnalysis, InterventionOptions, MembershipEvidence, OutreachError,
    OutreachService, Patient, ReminderDispatcher, RunId, RunReport, RuleTablePolicy,
    config::path_from_env_value, constants,
};

/// Application state shared across REST API handlers
///
/// The service holds the read-only context and the reminder dispatch log shared
/// by every run started through this server.
#[derive(Clone)]
struct AppState {
    service: OutreachService,
}

/// Error response: a status code and an `{error, message}` body.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorRes,
}

impl ApiError {
    fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorRes {
                error: kind.into(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<OutreachError> for ApiError {
    fn from(e: OutreachError) -> Self {
        let (status, kind) = match &e {
            OutreachError::PatientNotFound(_) => (StatusCode::NOT_FOUND, "patient_not_found"),
            OutreachError::CohortNotFound(_) => (StatusCode::NOT_FOUND, "cohort_not_found"),
            OutreachError::DuplicateDispatch { .. } => {
                (StatusCode::CONFLICT, "duplicate_dispatch")
            }
            OutreachError::DispatchFailure { .. } => (StatusCode::BAD_GATEWAY, "dispatch_failure"),
            OutreachError::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_input"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", e);
        }
        Self::new(status, kind, e.to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(rejection.status(), "invalid_path", rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "invalid_body", rejection.body_text())
    }
}

/// `Path` extractor that rejects with an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
struct ApiPath<T>(T);

/// `Json` extractor that rejects with an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct ApiJson<T>(T);

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_patients,
        get_patient,
        patient_contact,
        search_patients,
        list_cohorts,
        cohort_summary,
        classify_patient,
        evaluate_patient,
        membership_evidence,
        intervention_options,
        begin_run,
        list_reminders,
        dispatch_reminder,
        execute_run,
    ),
    components(schemas(
        HealthRes,
        ListPatientsRes,
        SearchPatientsReq,
        BeginRunRes,
        DispatchReminderReq,
        DispatchReminderRes,
        ListRemindersRes,
        ErrorRes,
    ))
)]
struct ApiDoc;

/// Main entry point for the outreach REST server
///
/// # Environment Variables
/// - `OUTREACH_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `OUTREACH_PATIENT_DATA`: patient data JSON file (default: demonstration patients)
/// - `OUTREACH_COHORT_CATALOG`: cohort catalog YAML file (default: built-in catalog)
///
/// # Errors
/// Returns an error if:
/// - the logging configuration cannot be initialised,
/// - the configured data files are missing or malformed,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("outreach=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("OUTREACH_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = CoreConfig::new(
        path_from_env_value(std::env::var(constants::PATIENT_DATA_ENV).ok()),
        path_from_env_value(std::env::var(constants::COHORT_CATALOG_ENV).ok()),
    )?;
    let ctx = CoreContext::from_config(&cfg)?;
    tracing::info!(
        "loaded {} patients and {} cohorts",
        ctx.patients().len(),
        ctx.catalog().len()
    );

    let service = OutreachService::new(Arc::new(ctx), Arc::new(ReminderDispatcher::default()));

    tracing::info!("++ Starting outreach REST on {}", rest_addr);

    let app = router(AppState { service })
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients", get(list_patients))
        .route("/patients/search", post(search_patients))
        .route("/patients/:id", get(get_patient))
        .route("/patients/:id/contact", get(patient_contact))
        .route("/patients/:id/cohorts", get(classify_patient))
        .route("/patients/:id/cohorts/:key/analysis", get(evaluate_patient))
        .route("/patients/:id/cohorts/:key/membership", get(membership_evidence))
        .route("/patients/:id/cohorts/:key/options", get(intervention_options))
        .route("/cohorts", get(list_cohorts))
        .route("/cohorts/summary", get(cohort_summary))
        .route("/runs", post(begin_run))
        .route(
            "/runs/:run_id/reminders",
            get(list_reminders).post(dispatch_reminder),
        )
        .route("/runs/:run_id/execute", post(execute_run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn find_patient(state: &AppState, id: i64) -> Result<&Patient, ApiError> {
    state
        .service
        .get_patient(id)
        .ok_or_else(|| OutreachError::PatientNotFound(id).into())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/patients",
    responses(
        (status = 200, description = "All patients in load order", body = ListPatientsRes)
    )
)]
/// List all patients in the system
async fn list_patients(State(state): State<AppState>) -> Json<ListPatientsRes> {
    Json(ListPatientsRes {
        patients: state.service.list_patients().to_vec(),
    })
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient record"),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
async fn get_patient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Patient>, ApiError> {
    find_patient(&state, id).map(|p| Json(p.clone()))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/contact",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Contact details for reminders"),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
async fn patient_contact(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ContactInfo>, ApiError> {
    find_patient(&state, id).map(|p| Json(p.contact_info()))
}

#[utoipa::path(
    post,
    path = "/patients/search",
    request_body = SearchPatientsReq,
    responses(
        (status = 200, description = "Patients whose facts mention any term", body = ListPatientsRes)
    )
)]
/// Search patients by supporting-fact terms
///
/// Matching is case-insensitive substring search; blank terms are ignored.
async fn search_patients(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SearchPatientsReq>,
) -> Json<ListPatientsRes> {
    let patients = state
        .service
        .search_patients(&req.terms)
        .into_iter()
        .cloned()
        .collect();
    Json(ListPatientsRes { patients })
}

#[utoipa::path(
    get,
    path = "/cohorts",
    responses(
        (status = 200, description = "Cohort definitions keyed by cohort, in catalog order")
    )
)]
async fn list_cohorts(State(state): State<AppState>) -> Json<CohortCatalog> {
    Json(state.service.list_cohorts().clone())
}

#[utoipa::path(
    get,
    path = "/cohorts/summary",
    responses(
        (status = 200, description = "Cohort counts and leading indicators")
    )
)]
async fn cohort_summary(State(state): State<AppState>) -> Json<CatalogSummary> {
    Json(state.service.list_cohorts().summary())
}

#[utoipa::path(
    get,
    path = "/patients/{id}/cohorts",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Cohorts the patient belongs to"),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
async fn classify_patient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Classification>, ApiError> {
    let patient = find_patient(&state, id)?;
    Ok(Json(state.service.classify(patient)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/cohorts/{key}/analysis",
    params(
        ("id" = i64, Path, description = "Patient id"),
        ("key" = String, Path, description = "Cohort key")
    ),
    responses(
        (status = 200, description = "Intervention analysis for the cohort"),
        (status = 404, description = "Unknown patient or cohort", body = ErrorRes)
    )
)]
async fn evaluate_patient(
    State(state): State<AppState>,
    ApiPath((id, key)): ApiPath<(i64, String)>,
) -> Result<Json<InterventionAnalysis>, ApiError> {
    let patient = find_patient(&state, id)?;
    state
        .service
        .evaluate(patient, &key)
        .map(Json)
        .map_err(ApiError::from)
}

#[utoipa::path(
    get,
    path = "/patients/{id}/cohorts/{key}/membership",
    params(
        ("id" = i64, Path, description = "Patient id"),
        ("key" = String, Path, description = "Cohort key")
    ),
    responses(
        (status = 200, description = "Evidence for confirming cohort membership"),
        (status = 404, description = "Unknown patient or cohort", body = ErrorRes)
    )
)]
async fn membership_evidence(
    State(state): State<AppState>,
    ApiPath((id, key)): ApiPath<(i64, String)>,
) -> Result<Json<MembershipEvidence>, ApiError> {
    let patient = find_patient(&state, id)?;
    state
        .service
        .evaluate_membership(patient, &key)
        .map(Json)
        .map_err(ApiError::from)
}

#[utoipa::path(
    get,
    path = "/patients/{id}/cohorts/{key}/options",
    params(
        ("id" = i64, Path, description = "Patient id"),
        ("key" = String, Path, description = "Cohort key")
    ),
    responses(
        (status = 200, description = "Analysis together with the cohort's interventions"),
        (status = 404, description = "Unknown patient or cohort", body = ErrorRes)
    )
)]
async fn intervention_options(
    State(state): State<AppState>,
    ApiPath((id, key)): ApiPath<(i64, String)>,
) -> Result<Json<InterventionOptions>, ApiError> {
    let patient = find_patient(&state, id)?;
    state
        .service
        .intervention_options(patient, &key)
        .map(Json)
        .map_err(ApiError::from)
}

#[utoipa::path(
    post,
    path = "/runs",
    responses(
        (status = 201, description = "Run started", body = BeginRunRes)
    )
)]
/// Start an outreach run
///
/// Reminders sent under the returned id are deduplicated per patient.
async fn begin_run(State(state): State<AppState>) -> (StatusCode, Json<BeginRunRes>) {
    let run = state.service.begin_run();
    (StatusCode::CREATED, Json(BeginRunRes { run_id: run.id() }))
}

#[utoipa::path(
    get,
    path = "/runs/{run_id}/reminders",
    params(("run_id" = String, Path, description = "Run id")),
    responses(
        (status = 200, description = "Reminders sent in the run", body = ListRemindersRes),
        (status = 400, description = "Malformed run id", body = ErrorRes)
    )
)]
async fn list_reminders(
    State(state): State<AppState>,
    ApiPath(run_id): ApiPath<RunId>,
) -> Json<ListRemindersRes> {
    let reminders = state.service.run(run_id).records();
    Json(ListRemindersRes { run_id, reminders })
}

#[utoipa::path(
    post,
    path = "/runs/{run_id}/reminders",
    params(("run_id" = String, Path, description = "Run id")),
    request_body = DispatchReminderReq,
    responses(
        (status = 201, description = "Reminder sent", body = DispatchReminderRes),
        (status = 404, description = "Unknown patient", body = ErrorRes),
        (status = 409, description = "Patient already reminded in this run", body = ErrorRes),
        (status = 400, description = "Malformed run id or JSON body", body = ErrorRes),
        (status = 422, description = "Invalid reminder request", body = ErrorRes),
        (status = 502, description = "Delivery failed; the request may be retried", body = ErrorRes)
    )
)]
/// Send one reminder within a run
async fn dispatch_reminder(
    State(state): State<AppState>,
    ApiPath(run_id): ApiPath<RunId>,
    ApiJson(req): ApiJson<DispatchReminderReq>,
) -> Result<(StatusCode, Json<DispatchReminderRes>), ApiError> {
    let reminder = state
        .service
        .run(run_id)
        .dispatch_reminder(req.patient_id, &req.reminder_type, req.priority)
        .map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(DispatchReminderRes { reminder })))
}

#[utoipa::path(
    post,
    path = "/runs/{run_id}/execute",
    params(("run_id" = String, Path, description = "Run id")),
    responses(
        (status = 200, description = "Report of the rule-table workflow over every patient")
    )
)]
/// Execute the rule-table workflow within a run
///
/// Executing the same run again sends nothing new except retries of failed
/// deliveries.
async fn execute_run(
    State(state): State<AppState>,
    ApiPath(run_id): ApiPath<RunId>,
) -> Result<Json<RunReport>, ApiError> {
    state
        .service
        .run(run_id)
        .execute(&RuleTablePolicy)
        .map(Json)
        .map_err(ApiError::from)
}
