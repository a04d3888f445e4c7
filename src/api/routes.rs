use axum::{
    routing::{get, post, put},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // System defaults
        .route(
            "/milestone-definitions",
            get(handlers::list_milestone_definitions::<S>),
        )
        // Project templates
        .route(
            "/projects/:project_id/templates",
            get(handlers::list_template_summaries::<S>),
        )
        .route(
            "/projects/:project_id/clone-templates",
            post(handlers::clone_project_templates::<S>),
        )
        .route(
            "/projects/:project_id/templates/:component_type",
            get(handlers::get_effective_template::<S>).put(handlers::update_template::<S>),
        )
        .route(
            "/projects/:project_id/templates/:component_type/changes",
            get(handlers::list_template_changes::<S>),
        )
        .route(
            "/projects/:project_id/templates/:component_type/recalculate",
            post(handlers::recalculate_components::<S>),
        )
        // Component progress
        .route("/components/:component_id", get(handlers::get_component::<S>))
        .route(
            "/components/:component_id/milestones/:milestone_name",
            put(handlers::record_milestone::<S>),
        )
}
