use crate::error::{EngineError, EngineResult};
use crate::model::{EffectiveTemplate, Id, MilestoneDefinition, ProjectMilestoneTemplate};
use crate::store::traits::{MilestoneDefinitionStore, ProjectTemplateStore};

/// Weight set in effect for a component type in a project: the project's own
/// rows when any exist, otherwise the system default.
pub async fn resolve_effective_template<S>(
    store: &S,
    project_id: &Id,
    component_type: &str,
) -> EngineResult<EffectiveTemplate>
where
    S: MilestoneDefinitionStore + ProjectTemplateStore + ?Sized,
{
    let project_rows = store.list_project_rows(project_id, component_type).await?;
    if !project_rows.is_empty() {
        return Ok(EffectiveTemplate::from_project_rows(component_type, project_rows));
    }

    let definitions = default_definitions(store, component_type).await?;
    Ok(EffectiveTemplate::from_definitions(component_type, definitions))
}

/// The same fallback over rows already read, e.g. inside a component edit.
pub fn select_effective_template(
    component_type: &str,
    project_rows: Vec<ProjectMilestoneTemplate>,
    definitions: Vec<MilestoneDefinition>,
) -> EngineResult<EffectiveTemplate> {
    if !project_rows.is_empty() {
        return Ok(EffectiveTemplate::from_project_rows(component_type, project_rows));
    }
    if definitions.is_empty() {
        return Err(EngineError::NotFound {
            component_type: component_type.to_string(),
        });
    }
    Ok(EffectiveTemplate::from_definitions(component_type, definitions))
}

/// System definitions of a component type, failing when there are none.
pub async fn default_definitions<S>(
    store: &S,
    component_type: &str,
) -> EngineResult<Vec<MilestoneDefinition>>
where
    S: MilestoneDefinitionStore + ?Sized,
{
    let definitions = store.list_definitions(component_type).await?;
    if definitions.is_empty() {
        return Err(EngineError::NotFound {
            component_type: component_type.to_string(),
        });
    }
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now, ProjectMilestoneTemplate, TemplateSource};
    use crate::store::MemoryStore;

    fn definitions() -> Vec<MilestoneDefinition> {
        vec![
            MilestoneDefinition {
                component_type: "valve".to_string(),
                milestone_name: "Receive".to_string(),
                weight: 20,
                order: 1,
                is_partial: false,
            },
            MilestoneDefinition {
                component_type: "valve".to_string(),
                milestone_name: "Install".to_string(),
                weight: 80,
                order: 2,
                is_partial: false,
            },
        ]
    }

    #[tokio::test]
    async fn test_falls_back_to_system_default() {
        let store = MemoryStore::new();
        store.upsert_definitions(definitions()).await.unwrap();

        let template = resolve_effective_template(&store, &"p1".to_string(), "valve")
            .await
            .unwrap();
        assert_eq!(template.source, TemplateSource::SystemDefault);
        assert_eq!(template.total_weight(), 100);
    }

    #[tokio::test]
    async fn test_prefers_project_rows() {
        let store = MemoryStore::new();
        store.upsert_definitions(definitions()).await.unwrap();
        let project = "p1".to_string();
        let rows = definitions()
            .iter()
            .map(|d| {
                let mut row = ProjectMilestoneTemplate::from_definition(&project, d, now());
                row.weight = 50;
                row
            })
            .collect();
        store.insert_project_template_set(&project, rows).await.unwrap();

        let template = resolve_effective_template(&store, &project, "valve").await.unwrap();
        assert_eq!(template.source, TemplateSource::Project);
        assert!(template.milestones.iter().all(|m| m.weight == 50));

        let other = resolve_effective_template(&store, &"p2".to_string(), "valve")
            .await
            .unwrap();
        assert_eq!(other.source, TemplateSource::SystemDefault);
    }

    #[test]
    fn test_select_prefers_rows_over_definitions() {
        let project = "p1".to_string();
        let rows: Vec<ProjectMilestoneTemplate> = definitions()
            .iter()
            .map(|d| ProjectMilestoneTemplate::from_definition(&project, d, now()))
            .collect();

        let template = select_effective_template("valve", rows, definitions()).unwrap();
        assert_eq!(template.source, TemplateSource::Project);

        let template = select_effective_template("valve", Vec::new(), definitions()).unwrap();
        assert_eq!(template.source, TemplateSource::SystemDefault);

        let err = select_effective_template("valve", Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_component_type_is_not_found() {
        let store = MemoryStore::new();
        let err = resolve_effective_template(&store, &"p1".to_string(), "gizmo")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
