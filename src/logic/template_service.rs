use std::collections::{BTreeMap, HashMap};

use crate::error::{EngineError, EngineResult};
use crate::logic::authorization::TemplateAuthorizer;
use crate::logic::recalculate::BatchRecalculator;
use crate::logic::resolve::resolve_effective_template;
use crate::logic::validate::{validate_definitions, validate_weight_set};
use crate::model::{
    next_modification_time, now, EffectiveTemplate, Id, MilestoneDefinition,
    ProjectMilestoneTemplate, TemplateChangeRecord, TemplateMilestone, TemplateSource,
    TemplateSummary, TemplateUpdate, TemplateUpdateOutcome, Timestamp, UserContext, WeightEntry,
};
use crate::store::traits::Store;

pub const DEFAULT_CHANGE_PAGE: usize = 50;
pub const MAX_CHANGE_PAGE: usize = 500;

/// Entry point for reading and editing project milestone templates.
pub struct TemplateService<'a, S: Store + ?Sized> {
    store: &'a S,
    authorizer: &'a dyn TemplateAuthorizer,
    recalculator: BatchRecalculator,
}

impl<'a, S: Store + ?Sized> TemplateService<'a, S> {
    pub fn new(store: &'a S, authorizer: &'a dyn TemplateAuthorizer) -> Self {
        Self {
            store,
            authorizer,
            recalculator: BatchRecalculator::default(),
        }
    }

    pub fn with_recalculator(mut self, recalculator: BatchRecalculator) -> Self {
        self.recalculator = recalculator;
        self
    }

    fn authorize(&self, actor: &UserContext, project_id: &Id) -> EngineResult<()> {
        if self.authorizer.can_edit_templates(actor, project_id) {
            return Ok(());
        }
        log::warn!(
            "Denied template edit on project {} for {}",
            project_id,
            actor.user_id
        );
        Err(EngineError::PermissionDenied {
            actor: actor.user_id.clone(),
            project_id: project_id.clone(),
        })
    }

    pub async fn effective_template(
        &self,
        project_id: &Id,
        component_type: &str,
    ) -> EngineResult<EffectiveTemplate> {
        resolve_effective_template(self.store, project_id, component_type).await
    }

    /// Copy every system default into project rows. All component types are
    /// copied together, and only for a project with no rows yet.
    pub async fn clone_defaults_for_project(
        &self,
        actor: &UserContext,
        project_id: &Id,
    ) -> EngineResult<usize> {
        self.authorize(actor, project_id)?;

        let definitions = self.store.list_all_definitions().await?;
        if definitions.is_empty() {
            return Err(EngineError::NotFound {
                component_type: "*".to_string(),
            });
        }
        validate_definitions(&definitions)?;

        let created_at = now();
        let rows: Vec<ProjectMilestoneTemplate> = definitions
            .iter()
            .map(|d| ProjectMilestoneTemplate::from_definition(project_id, d, created_at))
            .collect();
        let count = rows.len();

        if !self.store.insert_project_template_set(project_id, rows).await? {
            return Err(EngineError::AlreadyExists {
                project_id: project_id.clone(),
            });
        }

        log::info!(
            "Cloned {} default milestone rows into project {} for {}",
            count,
            project_id,
            actor.user_id
        );
        Ok(count)
    }

    /// Replace the weights of one component type in a project.
    ///
    /// Validation and the stale-timestamp check happen before anything is
    /// written. Template rows, recalculated components and the change record
    /// are committed together.
    pub async fn update_template(
        &self,
        actor: &UserContext,
        project_id: &Id,
        component_type: &str,
        update: TemplateUpdate,
    ) -> EngineResult<TemplateUpdateOutcome> {
        self.authorize(actor, project_id)?;

        let current = resolve_effective_template(self.store, project_id, component_type).await?;
        if let Err(err) = validate_weight_set(&current, &update.weights) {
            log::warn!(
                "Rejected weights for {}/{} from {}: {}",
                project_id,
                component_type,
                actor.user_id,
                err
            );
            return Err(err);
        }

        let uow = self.store.begin_template_edit(project_id, component_type).await?;
        let locked = uow.locked_template_rows().await?;
        let latest = locked.iter().map(|r| r.last_updated).max();

        let stale = match (latest, update.expected_last_updated) {
            (Some(latest), Some(expected)) => latest > expected,
            (Some(_), None) => true,
            // Project rows vanished after they were read
            (None, _) => current.source == TemplateSource::Project,
        };
        if stale {
            log::warn!(
                "Stale template edit on {}/{} from {} (expected {:?}, found {:?})",
                project_id,
                component_type,
                actor.user_id,
                update.expected_last_updated,
                latest
            );
            return Err(EngineError::ConcurrentModification {
                project_id: project_id.clone(),
                component_type: component_type.to_string(),
            });
        }

        let before = if locked.is_empty() {
            current
        } else {
            EffectiveTemplate::from_project_rows(component_type, locked)
        };
        let old_weights = before.weights();
        let rows = replacement_rows(
            project_id,
            component_type,
            &before.milestones,
            &update.weights,
            next_modification_time(latest),
        );
        uow.replace_template_rows(rows.clone()).await?;

        let affected_count = if update.apply_to_existing {
            let replaced = EffectiveTemplate::from_project_rows(component_type, rows);
            self.recalculator.apply(&*uow, &replaced, project_id).await?
        } else {
            0
        };

        let record = TemplateChangeRecord::new(
            project_id.clone(),
            component_type.to_string(),
            Some(actor.user_id.clone()),
            old_weights,
            update.weights,
            update.apply_to_existing,
            affected_count,
        );
        uow.append_change(&record).await?;
        uow.commit().await?;

        log::info!(
            "Template {}/{} updated by {} (applied_to_existing={}, affected={}, audit={})",
            project_id,
            component_type,
            actor.user_id,
            record.applied_to_existing,
            affected_count,
            record.id
        );

        Ok(TemplateUpdateOutcome {
            affected_count,
            audit_id: record.id,
        })
    }

    /// Re-run recalculation for one pair without changing its weights.
    pub async fn recalculate(
        &self,
        actor: &UserContext,
        project_id: &Id,
        component_type: &str,
    ) -> EngineResult<usize> {
        self.authorize(actor, project_id)?;
        self.recalculator
            .recalculate(self.store, project_id, component_type)
            .await
    }

    /// Change history of one pair, newest first.
    pub async fn list_changes(
        &self,
        project_id: &Id,
        component_type: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> EngineResult<Vec<TemplateChangeRecord>> {
        let limit = limit.unwrap_or(DEFAULT_CHANGE_PAGE).min(MAX_CHANGE_PAGE);
        Ok(self
            .store
            .list_changes(project_id, component_type, limit, offset.unwrap_or(0))
            .await?)
    }

    /// One summary per component type known to the system or the project.
    pub async fn template_summaries(&self, project_id: &Id) -> EngineResult<Vec<TemplateSummary>> {
        let mut defaults: BTreeMap<String, Vec<MilestoneDefinition>> = BTreeMap::new();
        for definition in self.store.list_all_definitions().await? {
            defaults
                .entry(definition.component_type.clone())
                .or_default()
                .push(definition);
        }

        let mut overrides: BTreeMap<String, Vec<ProjectMilestoneTemplate>> = BTreeMap::new();
        for row in self.store.list_all_project_rows(project_id).await? {
            overrides.entry(row.component_type.clone()).or_default().push(row);
        }

        let mut templates: BTreeMap<String, EffectiveTemplate> = defaults
            .into_iter()
            .map(|(component_type, definitions)| {
                let template = EffectiveTemplate::from_definitions(&component_type, definitions);
                (component_type, template)
            })
            .collect();
        for (component_type, rows) in overrides {
            let template = EffectiveTemplate::from_project_rows(&component_type, rows);
            templates.insert(component_type, template);
        }

        Ok(templates.values().map(TemplateSummary::from).collect())
    }
}

/// New project rows keeping each milestone's order and kind, with weights from `weights`.
fn replacement_rows(
    project_id: &Id,
    component_type: &str,
    milestones: &[TemplateMilestone],
    weights: &[WeightEntry],
    last_updated: Timestamp,
) -> Vec<ProjectMilestoneTemplate> {
    let by_name: HashMap<&str, i32> = weights
        .iter()
        .map(|w| (w.milestone_name.as_str(), w.weight))
        .collect();

    milestones
        .iter()
        .map(|m| ProjectMilestoneTemplate {
            project_id: project_id.clone(),
            component_type: component_type.to_string(),
            milestone_name: m.milestone_name.clone(),
            weight: by_name.get(m.milestone_name.as_str()).copied().unwrap_or(m.weight),
            order: m.order,
            is_partial: m.is_partial,
            last_updated,
        })
        .collect()
}
