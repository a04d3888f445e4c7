use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::{
    Component, Id, MilestoneDefinition, ProjectMilestoneTemplate, TemplateChangeRecord,
};
use crate::store::traits::{
    ComponentAccess, ComponentEditStore, ComponentStore, ComponentUnitOfWork,
    MilestoneDefinitionStore, ProjectTemplateStore, Store, TemplateChangeLog, TemplateEditStore,
    TemplateUnitOfWork,
};

#[derive(Debug, Default, Clone)]
struct MemState {
    definitions: BTreeMap<String, Vec<MilestoneDefinition>>,
    templates: HashMap<(Id, String), Vec<ProjectMilestoneTemplate>>,
    /// Commit order, oldest first
    changes: Vec<TemplateChangeRecord>,
    components: HashMap<Id, Component>,
}

impl MemState {
    fn components_of(&self, project_id: &Id, component_type: &str) -> Vec<Component> {
        let mut components: Vec<Component> = self
            .components
            .values()
            .filter(|c| &c.project_id == project_id && c.component_type == component_type)
            .cloned()
            .collect();
        components.sort_by(|a, b| a.id.cmp(&b.id));
        components
    }

    fn set_percent_complete(&mut self, component_id: &Id, percent_complete: f64) -> Result<()> {
        let component = self
            .components
            .get_mut(component_id)
            .ok_or_else(|| anyhow!("Component not found: {}", component_id))?;
        component.percent_complete = percent_complete;
        Ok(())
    }
}

/// In-process store with the same atomicity guarantees as `PostgresStore`.
///
/// Template and component edits hold the store lock for their whole duration.
/// A template edit works on a staged copy that replaces the live state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<AsyncMutex<MemState>>,
    failing_writes: Arc<Mutex<HashSet<Id>>>,
    milestone_write_delay: Arc<Mutex<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `percent_complete` write for this component fail.
    pub fn fail_writes_for(&self, component_id: &Id) {
        self.failing_writes.lock().insert(component_id.clone());
    }

    pub fn clear_write_failures(&self) {
        self.failing_writes.lock().clear();
    }

    /// Stall every milestone write inside a component edit, as a slow database would.
    pub fn delay_milestone_writes(&self, delay: Duration) {
        *self.milestone_write_delay.lock() = delay;
    }

    fn check_write(failing_writes: &Mutex<HashSet<Id>>, component_id: &Id) -> Result<()> {
        if failing_writes.lock().contains(component_id) {
            return Err(anyhow!("Write rejected for component {}", component_id));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MilestoneDefinitionStore for MemoryStore {
    async fn list_definitions(&self, component_type: &str) -> Result<Vec<MilestoneDefinition>> {
        let state = self.state.lock().await;
        Ok(state.definitions.get(component_type).cloned().unwrap_or_default())
    }

    async fn list_all_definitions(&self) -> Result<Vec<MilestoneDefinition>> {
        let state = self.state.lock().await;
        Ok(state.definitions.values().flatten().cloned().collect())
    }

    async fn upsert_definitions(&self, definitions: Vec<MilestoneDefinition>) -> Result<()> {
        let mut grouped: BTreeMap<String, Vec<MilestoneDefinition>> = BTreeMap::new();
        for definition in definitions {
            grouped
                .entry(definition.component_type.clone())
                .or_default()
                .push(definition);
        }

        let mut state = self.state.lock().await;
        state.definitions.extend(grouped);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProjectTemplateStore for MemoryStore {
    async fn list_project_rows(
        &self,
        project_id: &Id,
        component_type: &str,
    ) -> Result<Vec<ProjectMilestoneTemplate>> {
        let state = self.state.lock().await;
        Ok(state
            .templates
            .get(&(project_id.clone(), component_type.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_all_project_rows(&self, project_id: &Id) -> Result<Vec<ProjectMilestoneTemplate>> {
        let state = self.state.lock().await;
        Ok(state
            .templates
            .iter()
            .filter(|((project, _), _)| project == project_id)
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect())
    }

    async fn insert_project_template_set(
        &self,
        project_id: &Id,
        rows: Vec<ProjectMilestoneTemplate>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.templates.keys().any(|(project, _)| project == project_id) {
            return Ok(false);
        }

        for row in rows {
            state
                .templates
                .entry((row.project_id.clone(), row.component_type.clone()))
                .or_default()
                .push(row);
        }
        Ok(true)
    }
}

#[async_trait::async_trait]
impl TemplateChangeLog for MemoryStore {
    async fn list_changes(
        &self,
        project_id: &Id,
        component_type: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TemplateChangeRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .changes
            .iter()
            .rev()
            .filter(|c| &c.project_id == project_id && c.component_type == component_type)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_change(&self, id: &Id) -> Result<Option<TemplateChangeRecord>> {
        let state = self.state.lock().await;
        Ok(state.changes.iter().find(|c| &c.id == id).cloned())
    }
}

#[async_trait::async_trait]
impl ComponentAccess for MemoryStore {
    async fn list_components(&self, project_id: &Id, component_type: &str) -> Result<Vec<Component>> {
        let state = self.state.lock().await;
        Ok(state.components_of(project_id, component_type))
    }

    async fn write_percent_complete(&self, component_id: &Id, percent_complete: f64) -> Result<()> {
        Self::check_write(&self.failing_writes, component_id)?;
        let mut state = self.state.lock().await;
        state.set_percent_complete(component_id, percent_complete)
    }
}

#[async_trait::async_trait]
impl ComponentStore for MemoryStore {
    async fn get_component(&self, component_id: &Id) -> Result<Option<Component>> {
        let state = self.state.lock().await;
        Ok(state.components.get(component_id).cloned())
    }

    async fn upsert_component(&self, component: Component) -> Result<()> {
        let mut state = self.state.lock().await;
        state.components.insert(component.id.clone(), component);
        Ok(())
    }
}

struct MemoryUnitOfWork {
    project_id: Id,
    component_type: String,
    guard: OwnedMutexGuard<MemState>,
    staged: Mutex<MemState>,
    failing_writes: Arc<Mutex<HashSet<Id>>>,
}

#[async_trait::async_trait]
impl ComponentAccess for MemoryUnitOfWork {
    async fn list_components(&self, project_id: &Id, component_type: &str) -> Result<Vec<Component>> {
        Ok(self.staged.lock().components_of(project_id, component_type))
    }

    async fn write_percent_complete(&self, component_id: &Id, percent_complete: f64) -> Result<()> {
        MemoryStore::check_write(&self.failing_writes, component_id)?;
        self.staged.lock().set_percent_complete(component_id, percent_complete)
    }
}

#[async_trait::async_trait]
impl TemplateUnitOfWork for MemoryUnitOfWork {
    async fn locked_template_rows(&self) -> Result<Vec<ProjectMilestoneTemplate>> {
        let staged = self.staged.lock();
        Ok(staged
            .templates
            .get(&(self.project_id.clone(), self.component_type.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_template_rows(&self, rows: Vec<ProjectMilestoneTemplate>) -> Result<()> {
        if let Some(row) = rows
            .iter()
            .find(|r| r.project_id != self.project_id || r.component_type != self.component_type)
        {
            return Err(anyhow!(
                "Row {}/{} does not belong to template {}/{}",
                row.project_id,
                row.component_type,
                self.project_id,
                self.component_type
            ));
        }

        self.staged
            .lock()
            .templates
            .insert((self.project_id.clone(), self.component_type.clone()), rows);
        Ok(())
    }

    async fn append_change(&self, record: &TemplateChangeRecord) -> Result<()> {
        self.staged.lock().changes.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork { mut guard, staged, .. } = *self;
        *guard = staged.into_inner();
        Ok(())
    }
}

#[async_trait::async_trait]
impl TemplateEditStore for MemoryStore {
    async fn begin_template_edit(
        &self,
        project_id: &Id,
        component_type: &str,
    ) -> Result<Box<dyn TemplateUnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = Mutex::new(guard.clone());
        Ok(Box::new(MemoryUnitOfWork {
            project_id: project_id.clone(),
            component_type: component_type.to_string(),
            guard,
            staged,
            failing_writes: Arc::clone(&self.failing_writes),
        }))
    }
}

struct MemoryComponentEdit {
    guard: OwnedMutexGuard<MemState>,
    component: Component,
    pending: Mutex<Option<(HashMap<String, f64>, f64)>>,
    failing_writes: Arc<Mutex<HashSet<Id>>>,
    write_delay: Duration,
}

#[async_trait::async_trait]
impl ComponentUnitOfWork for MemoryComponentEdit {
    fn component(&self) -> &Component {
        &self.component
    }

    async fn project_template_rows(&self) -> Result<Vec<ProjectMilestoneTemplate>> {
        let key = (
            self.component.project_id.clone(),
            self.component.component_type.clone(),
        );
        Ok(self.guard.templates.get(&key).cloned().unwrap_or_default())
    }

    async fn default_definitions(&self) -> Result<Vec<MilestoneDefinition>> {
        Ok(self
            .guard
            .definitions
            .get(&self.component.component_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn write_milestones(
        &self,
        current_milestones: &HashMap<String, f64>,
        percent_complete: f64,
    ) -> Result<()> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        MemoryStore::check_write(&self.failing_writes, &self.component.id)?;
        *self.pending.lock() = Some((current_milestones.clone(), percent_complete));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryComponentEdit {
            mut guard,
            component,
            pending,
            ..
        } = *self;
        if let Some((current_milestones, percent_complete)) = pending.into_inner() {
            let stored = guard
                .components
                .get_mut(&component.id)
                .ok_or_else(|| anyhow!("Component not found: {}", component.id))?;
            stored.current_milestones = current_milestones;
            stored.percent_complete = percent_complete;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ComponentEditStore for MemoryStore {
    async fn begin_component_edit(
        &self,
        component_id: &Id,
    ) -> Result<Option<Box<dyn ComponentUnitOfWork>>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let Some(component) = guard.components.get(component_id).cloned() else {
            return Ok(None);
        };
        let write_delay = *self.milestone_write_delay.lock();
        Ok(Some(Box::new(MemoryComponentEdit {
            guard,
            component,
            pending: Mutex::new(None),
            failing_writes: Arc::clone(&self.failing_writes),
            write_delay,
        })))
    }
}

impl Store for MemoryStore {}
