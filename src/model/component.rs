use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::Id;

/// The two component fields the engine reads and writes; the rest belongs to
/// the component subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: Id,
    pub project_id: Id,
    pub component_type: String,
    #[serde(default)]
    pub current_milestones: HashMap<String, f64>,
    #[serde(default)]
    pub percent_complete: f64,
}

impl Component {
    pub fn new(id: impl Into<Id>, project_id: impl Into<Id>, component_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            component_type: component_type.into(),
            current_milestones: HashMap::new(),
            percent_complete: 0.0,
        }
    }

    pub fn with_milestone(mut self, milestone_name: impl Into<String>, value: f64) -> Self {
        self.current_milestones.insert(milestone_name.into(), value);
        self
    }
}

/// A milestone value as submitted by workflow code. Older clients still send
/// booleans for discrete milestones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MilestoneValue {
    Flag(bool),
    Number(f64),
}

impl MilestoneValue {
    /// Normalise to the 0-100 scale. Discrete milestones only accept the
    /// endpoints; a legacy `1` on a discrete milestone means complete.
    pub fn normalize(self, is_partial: bool) -> Option<f64> {
        match self {
            MilestoneValue::Flag(true) => Some(100.0),
            MilestoneValue::Flag(false) => Some(0.0),
            MilestoneValue::Number(value) if !value.is_finite() => None,
            MilestoneValue::Number(value) if is_partial => {
                (0.0..=100.0).contains(&value).then_some(value)
            }
            MilestoneValue::Number(value) => {
                if value == 0.0 {
                    Some(0.0)
                } else if value == 100.0 || value == 1.0 {
                    Some(100.0)
                } else {
                    None
                }
            }
        }
    }
}
