use serde::{Deserialize, Serialize};

use crate::model::{generate_id, now, Id, Timestamp, WeightEntry};

/// Immutable audit entry written once per successful template edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateChangeRecord {
    pub id: Id,
    pub project_id: Id,
    pub component_type: String,
    /// Acting user; becomes `None` once that user is removed.
    pub changed_by: Option<String>,
    pub old_weights: Vec<WeightEntry>,
    pub new_weights: Vec<WeightEntry>,
    pub applied_to_existing: bool,
    pub affected_component_count: i64,
    pub changed_at: Timestamp,
}

impl TemplateChangeRecord {
    pub fn new(
        project_id: Id,
        component_type: String,
        changed_by: Option<String>,
        old_weights: Vec<WeightEntry>,
        new_weights: Vec<WeightEntry>,
        applied_to_existing: bool,
        affected_component_count: usize,
    ) -> Self {
        Self {
            id: generate_id(),
            project_id,
            component_type,
            changed_by,
            old_weights,
            new_weights,
            applied_to_existing,
            affected_component_count: affected_component_count as i64,
            changed_at: now(),
        }
    }
}

/// Input to `TemplateService::update_template`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    pub weights: Vec<WeightEntry>,
    #[serde(default)]
    pub apply_to_existing: bool,
    /// Last modification the caller observed; `None` when it observed the system default.
    pub expected_last_updated: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateUpdateOutcome {
    pub affected_count: usize,
    pub audit_id: Id,
}
