use serde::{Deserialize, Serialize};

use crate::model::{Id, Timestamp};

/// System-wide default weight of one milestone for a component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneDefinition {
    pub component_type: String,
    pub milestone_name: String,
    pub weight: i32,
    pub order: i32,
    pub is_partial: bool,
}

/// Project-specific copy of a milestone definition, possibly with a customised weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMilestoneTemplate {
    pub project_id: Id,
    pub component_type: String,
    pub milestone_name: String,
    pub weight: i32,
    pub order: i32,
    pub is_partial: bool,
    pub last_updated: Timestamp,
}

impl ProjectMilestoneTemplate {
    pub fn from_definition(
        project_id: &Id,
        definition: &MilestoneDefinition,
        last_updated: Timestamp,
    ) -> Self {
        Self {
            project_id: project_id.clone(),
            component_type: definition.component_type.clone(),
            milestone_name: definition.milestone_name.clone(),
            weight: definition.weight,
            order: definition.order,
            is_partial: definition.is_partial,
            last_updated,
        }
    }
}

/// One `{milestone_name, weight}` pair of a weight set as exchanged with callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub milestone_name: String,
    pub weight: i32,
}

impl WeightEntry {
    pub fn new(milestone_name: impl Into<String>, weight: i32) -> Self {
        Self {
            milestone_name: milestone_name.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMilestone {
    pub milestone_name: String,
    pub weight: i32,
    pub order: i32,
    pub is_partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Project,
    SystemDefault,
}

/// The ordered weight set in effect for a component type in a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveTemplate {
    pub component_type: String,
    pub source: TemplateSource,
    pub milestones: Vec<TemplateMilestone>,
    /// Latest modification of the project rows; `None` while the default is in effect.
    pub last_updated: Option<Timestamp>,
}

impl EffectiveTemplate {
    pub fn from_definitions(component_type: &str, mut definitions: Vec<MilestoneDefinition>) -> Self {
        definitions.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.milestone_name.cmp(&b.milestone_name)));
        Self {
            component_type: component_type.to_string(),
            source: TemplateSource::SystemDefault,
            milestones: definitions
                .into_iter()
                .map(|d| TemplateMilestone {
                    milestone_name: d.milestone_name,
                    weight: d.weight,
                    order: d.order,
                    is_partial: d.is_partial,
                })
                .collect(),
            last_updated: None,
        }
    }

    pub fn from_project_rows(component_type: &str, mut rows: Vec<ProjectMilestoneTemplate>) -> Self {
        rows.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.milestone_name.cmp(&b.milestone_name)));
        let last_updated = rows.iter().map(|r| r.last_updated).max();
        Self {
            component_type: component_type.to_string(),
            source: TemplateSource::Project,
            milestones: rows
                .into_iter()
                .map(|r| TemplateMilestone {
                    milestone_name: r.milestone_name,
                    weight: r.weight,
                    order: r.order,
                    is_partial: r.is_partial,
                })
                .collect(),
            last_updated,
        }
    }

    pub fn get(&self, milestone_name: &str) -> Option<&TemplateMilestone> {
        self.milestones.iter().find(|m| m.milestone_name == milestone_name)
    }

    pub fn total_weight(&self) -> i32 {
        self.milestones.iter().map(|m| m.weight).sum()
    }

    pub fn weights(&self) -> Vec<WeightEntry> {
        self.milestones
            .iter()
            .map(|m| WeightEntry::new(m.milestone_name.clone(), m.weight))
            .collect()
    }
}

/// Per-type overview used by settings screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub component_type: String,
    pub milestone_count: usize,
    pub total_weight: i32,
    pub last_updated: Option<Timestamp>,
    pub source: TemplateSource,
}

impl From<&EffectiveTemplate> for TemplateSummary {
    fn from(template: &EffectiveTemplate) -> Self {
        Self {
            component_type: template.component_type.clone(),
            milestone_count: template.milestones.len(),
            total_weight: template.total_weight(),
            last_updated: template.last_updated,
            source: template.source,
        }
    }
}
