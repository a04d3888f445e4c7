pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{EngineError, EngineResult};

pub use logic::{
    compute_percent_complete, resolve_effective_template, BatchRecalculator, ProgressTracker,
    RoleAuthorizer, TemplateAuthorizer, TemplateService,
};

// Export all model types
pub use model::*;

// Export seed module
pub use seed::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use std::sync::Arc;

/// Build the HTTP application around a store using the given configuration
pub fn build_app<S: Store + 'static>(store: Arc<S>, config: &crate::config::AppConfig) -> axum::Router {
    let context = api::handlers::AppContext::new(
        store,
        RoleAuthorizer::new(config.authorization.editor_roles.clone()),
        config.recalculation.budget(),
    );
    api::routes::create_router().with_state(Arc::new(context))
}
