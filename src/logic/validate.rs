use itertools::Itertools;
use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::model::{EffectiveTemplate, MilestoneDefinition, WeightEntry};

pub const REQUIRED_WEIGHT_TOTAL: i64 = 100;

/// Check a full replacement weight set against the template it replaces.
///
/// Rules run in a fixed order and the first failure wins: unknown names,
/// then omissions and duplicates, then per-milestone range, then the total.
pub fn validate_weight_set(current: &EffectiveTemplate, weights: &[WeightEntry]) -> EngineResult<()> {
    if let Some(unknown) = weights.iter().find(|w| current.get(&w.milestone_name).is_none()) {
        return Err(EngineError::InvalidMilestone {
            component_type: current.component_type.clone(),
            milestone: unknown.milestone_name.clone(),
        });
    }

    let named: HashSet<&str> = weights.iter().map(|w| w.milestone_name.as_str()).collect();
    let missing: Vec<String> = current
        .milestones
        .iter()
        .filter(|m| !named.contains(m.milestone_name.as_str()))
        .map(|m| m.milestone_name.clone())
        .collect();
    let duplicated: Vec<String> = weights
        .iter()
        .map(|w| w.milestone_name.clone())
        .duplicates()
        .collect();
    if !missing.is_empty() || !duplicated.is_empty() {
        return Err(EngineError::IncompleteWeightSet {
            component_type: current.component_type.clone(),
            missing,
            duplicated,
        });
    }

    if let Some(entry) = weights.iter().find(|w| !(0..=100).contains(&w.weight)) {
        return Err(EngineError::WeightOutOfRange {
            milestone: entry.milestone_name.clone(),
            weight: entry.weight,
        });
    }

    check_weight_total(weights.iter().map(|w| w.weight))
}

/// Check a system default catalogue: every component type must total 100.
pub fn validate_definitions(definitions: &[MilestoneDefinition]) -> EngineResult<()> {
    for (_, group) in &definitions
        .iter()
        .sorted_by(|a, b| a.component_type.cmp(&b.component_type))
        .chunk_by(|d| d.component_type.as_str())
    {
        let group: Vec<&MilestoneDefinition> = group.collect();

        if let Some(definition) = group.iter().find(|d| !(0..=100).contains(&d.weight)) {
            return Err(EngineError::WeightOutOfRange {
                milestone: definition.milestone_name.clone(),
                weight: definition.weight,
            });
        }

        let duplicated: Vec<String> = group
            .iter()
            .map(|d| d.milestone_name.clone())
            .duplicates()
            .collect();
        if let Some(first) = group.first() {
            if !duplicated.is_empty() {
                return Err(EngineError::IncompleteWeightSet {
                    component_type: first.component_type.clone(),
                    missing: Vec::new(),
                    duplicated,
                });
            }
        }

        check_weight_total(group.iter().map(|d| d.weight))?;
    }
    Ok(())
}

fn check_weight_total(weights: impl Iterator<Item = i32>) -> EngineResult<()> {
    let sum: i64 = weights.map(i64::from).sum();
    if sum != REQUIRED_WEIGHT_TOTAL {
        return Err(EngineError::WeightSumInvalid { sum });
    }
    Ok(())
}
