use thiserror::Error;

use crate::model::Id;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no milestone definition exists for component type '{component_type}'")]
    NotFound { component_type: String },

    #[error("project '{project_id}' already has milestone templates")]
    AlreadyExists { project_id: Id },

    #[error("milestone '{milestone}' is not defined for component type '{component_type}'")]
    InvalidMilestone {
        component_type: String,
        milestone: String,
    },

    #[error("weight set for '{component_type}' must name every milestone exactly once (missing: [{}], duplicated: [{}])", missing.join(", "), duplicated.join(", "))]
    IncompleteWeightSet {
        component_type: String,
        missing: Vec<String>,
        duplicated: Vec<String>,
    },

    #[error("milestone weights must total 100, got {sum}")]
    WeightSumInvalid { sum: i64 },

    #[error("weight {weight} for milestone '{milestone}' is outside 0..=100")]
    WeightOutOfRange { milestone: String, weight: i32 },

    #[error("value {value} is not valid for milestone '{milestone}'")]
    InvalidMilestoneValue { milestone: String, value: String },

    #[error("component '{component_id}' not found")]
    ComponentNotFound { component_id: Id },

    #[error("template for '{component_type}' in project '{project_id}' was modified by someone else; reload and retry")]
    ConcurrentModification {
        project_id: Id,
        component_type: String,
    },

    #[error("'{actor}' may not edit milestone templates of project '{project_id}'")]
    PermissionDenied { actor: String, project_id: Id },

    #[error("recalculation aborted at component '{component_id}' after {written} writes: {source}")]
    PartialFailure {
        written: usize,
        component_id: Id,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::AlreadyExists { .. } => "already_exists",
            EngineError::InvalidMilestone { .. } => "invalid_milestone",
            EngineError::IncompleteWeightSet { .. } => "incomplete_weight_set",
            EngineError::WeightSumInvalid { .. } => "weight_sum_invalid",
            EngineError::WeightOutOfRange { .. } => "weight_out_of_range",
            EngineError::InvalidMilestoneValue { .. } => "invalid_milestone_value",
            EngineError::ComponentNotFound { .. } => "component_not_found",
            EngineError::ConcurrentModification { .. } => "concurrent_modification",
            EngineError::PermissionDenied { .. } => "permission_denied",
            EngineError::PartialFailure { .. } => "partial_failure",
            EngineError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sum_message_states_computed_sum() {
        let err = EngineError::WeightSumInvalid { sum: 99 };
        assert_eq!(err.to_string(), "milestone weights must total 100, got 99");
        assert_eq!(err.kind(), "weight_sum_invalid");
    }

    #[test]
    fn test_incomplete_weight_set_lists_names() {
        let err = EngineError::IncompleteWeightSet {
            component_type: "valve".to_string(),
            missing: vec!["Test".to_string()],
            duplicated: vec!["Install".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("missing: [Test]"));
        assert!(message.contains("duplicated: [Install]"));
    }
}
