use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::logic::{BatchRecalculator, ProgressTracker, RoleAuthorizer, TemplateService};
use crate::model::{
    Component, EffectiveTemplate, Id, MilestoneDefinition, MilestoneValue, TemplateChangeRecord,
    TemplateSummary, TemplateUpdate, TemplateUpdateOutcome, UserContext,
};
use crate::store::traits::Store;

/// Shared state behind every handler
pub struct AppContext<S> {
    pub store: Arc<S>,
    pub authorizer: RoleAuthorizer,
    pub recalculation_budget: Duration,
}

impl<S: Store> AppContext<S> {
    pub fn new(store: Arc<S>, authorizer: RoleAuthorizer, recalculation_budget: Duration) -> Self {
        Self {
            store,
            authorizer,
            recalculation_budget,
        }
    }

    fn templates(&self) -> TemplateService<'_, S> {
        TemplateService::new(&*self.store, &self.authorizer)
            .with_recalculator(BatchRecalculator::new(self.recalculation_budget))
    }
}

pub type AppState<S> = Arc<AppContext<S>>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(message: &str, kind: &str) -> Self {
        Self {
            error: message.to_string(),
            kind: kind.to_string(),
        }
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound { .. } | EngineError::ComponentNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        EngineError::AlreadyExists { .. } | EngineError::ConcurrentModification { .. } => {
            StatusCode::CONFLICT
        }
        EngineError::InvalidMilestone { .. }
        | EngineError::IncompleteWeightSet { .. }
        | EngineError::WeightSumInvalid { .. }
        | EngineError::WeightOutOfRange { .. }
        | EngineError::InvalidMilestoneValue { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        EngineError::PartialFailure { .. } | EngineError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn engine_error(err: EngineError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        log::error!("Request failed ({}): {}", err.kind(), err);
    }
    (status, Json(ErrorResponse::new(&err.to_string(), err.kind())))
}

fn storage_error(err: anyhow::Error) -> ApiError {
    engine_error(EngineError::Storage(err))
}

/// GET /milestone-definitions
pub async fn list_milestone_definitions<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<ListResponse<MilestoneDefinition>>, ApiError> {
    let definitions = state
        .store
        .list_all_definitions()
        .await
        .map_err(storage_error)?;
    Ok(Json(definitions.into()))
}

/// GET /projects/{project_id}/templates
pub async fn list_template_summaries<S: Store>(
    Path(project_id): Path<Id>,
    State(state): State<AppState<S>>,
) -> Result<Json<ListResponse<TemplateSummary>>, ApiError> {
    let summaries = state
        .templates()
        .template_summaries(&project_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(summaries.into()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloneTemplatesResponse {
    pub created: usize,
}

/// POST /projects/{project_id}/clone-templates
pub async fn clone_project_templates<S: Store>(
    Path(project_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> Result<(StatusCode, Json<CloneTemplatesResponse>), ApiError> {
    let created = state
        .templates()
        .clone_defaults_for_project(&user, &project_id)
        .await
        .map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(CloneTemplatesResponse { created })))
}

/// GET /projects/{project_id}/templates/{component_type}
pub async fn get_effective_template<S: Store>(
    Path((project_id, component_type)): Path<(Id, String)>,
    State(state): State<AppState<S>>,
) -> Result<Json<EffectiveTemplate>, ApiError> {
    let template = state
        .templates()
        .effective_template(&project_id, &component_type)
        .await
        .map_err(engine_error)?;
    Ok(Json(template))
}

/// PUT /projects/{project_id}/templates/{component_type}
pub async fn update_template<S: Store>(
    Path((project_id, component_type)): Path<(Id, String)>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(update): RequestJson<TemplateUpdate>,
) -> Result<Json<TemplateUpdateOutcome>, ApiError> {
    let outcome = state
        .templates()
        .update_template(&user, &project_id, &component_type, update)
        .await
        .map_err(engine_error)?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ChangeLogQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /projects/{project_id}/templates/{component_type}/changes
pub async fn list_template_changes<S: Store>(
    Path((project_id, component_type)): Path<(Id, String)>,
    Query(query): Query<ChangeLogQuery>,
    State(state): State<AppState<S>>,
) -> Result<Json<ListResponse<TemplateChangeRecord>>, ApiError> {
    let changes = state
        .templates()
        .list_changes(&project_id, &component_type, query.limit, query.offset)
        .await
        .map_err(engine_error)?;
    Ok(Json(changes.into()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecalculateResponse {
    pub affected_count: usize,
}

/// POST /projects/{project_id}/templates/{component_type}/recalculate
pub async fn recalculate_components<S: Store>(
    Path((project_id, component_type)): Path<(Id, String)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> Result<Json<RecalculateResponse>, ApiError> {
    let affected_count = state
        .templates()
        .recalculate(&user, &project_id, &component_type)
        .await
        .map_err(engine_error)?;
    Ok(Json(RecalculateResponse { affected_count }))
}

/// GET /components/{component_id}
pub async fn get_component<S: Store>(
    Path(component_id): Path<Id>,
    State(state): State<AppState<S>>,
) -> Result<Json<Component>, ApiError> {
    match state.store.get_component(&component_id).await {
        Ok(Some(component)) => Ok(Json(component)),
        Ok(None) => Err(engine_error(EngineError::ComponentNotFound { component_id })),
        Err(e) => Err(storage_error(e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct MilestoneValueRequest {
    pub value: MilestoneValue,
}

/// PUT /components/{component_id}/milestones/{milestone_name}
pub async fn record_milestone<S: Store>(
    Path((component_id, milestone_name)): Path<(Id, String)>,
    State(state): State<AppState<S>>,
    RequestJson(req): RequestJson<MilestoneValueRequest>,
) -> Result<Json<Component>, ApiError> {
    let component = ProgressTracker::new(&*state.store)
        .record_milestone(&component_id, &milestone_name, req.value)
        .await
        .map_err(engine_error)?;
    Ok(Json(component))
}
