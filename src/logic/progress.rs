use crate::error::{EngineError, EngineResult};
use crate::logic::earned_value::compute_percent_complete;
use crate::logic::resolve::select_effective_template;
use crate::model::{Component, Id, MilestoneValue};
use crate::store::traits::Store;

/// Keeps a component's `percent_complete` in step with every milestone write.
pub struct ProgressTracker<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> ProgressTracker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Set one milestone and store the recomputed percent complete with it.
    ///
    /// The component is locked from read to write, and the template used is
    /// the one in effect at commit: a template edit of the same pair waits.
    pub async fn record_milestone(
        &self,
        component_id: &Id,
        milestone_name: &str,
        value: MilestoneValue,
    ) -> EngineResult<Component> {
        let edit = self
            .store
            .begin_component_edit(component_id)
            .await?
            .ok_or_else(|| EngineError::ComponentNotFound {
                component_id: component_id.clone(),
            })?;
        let mut component = edit.component().clone();

        let project_rows = edit.project_template_rows().await?;
        let definitions = if project_rows.is_empty() {
            edit.default_definitions().await?
        } else {
            Vec::new()
        };
        let template =
            select_effective_template(&component.component_type, project_rows, definitions)?;

        let milestone = template
            .get(milestone_name)
            .ok_or_else(|| EngineError::InvalidMilestone {
                component_type: component.component_type.clone(),
                milestone: milestone_name.to_string(),
            })?;
        let value = value
            .normalize(milestone.is_partial)
            .ok_or_else(|| EngineError::InvalidMilestoneValue {
                milestone: milestone_name.to_string(),
                value: match value {
                    MilestoneValue::Flag(flag) => flag.to_string(),
                    MilestoneValue::Number(number) => number.to_string(),
                },
            })?;

        component
            .current_milestones
            .insert(milestone_name.to_string(), value);
        component.percent_complete =
            compute_percent_complete(&component.current_milestones, &template.milestones);

        edit.write_milestones(&component.current_milestones, component.percent_complete)
            .await?;
        edit.commit().await?;

        log::debug!(
            "Component {} milestone '{}' = {} -> {}%",
            component.id,
            milestone_name,
            value,
            component.percent_complete
        );
        Ok(component)
    }
}
