use crate::model::{
    Component, Id, MilestoneDefinition, ProjectMilestoneTemplate, TemplateChangeRecord,
};
use anyhow::Result;
use std::collections::HashMap;

/// System default milestone catalogue
#[async_trait::async_trait]
pub trait MilestoneDefinitionStore: Send + Sync {
    async fn list_definitions(&self, component_type: &str) -> Result<Vec<MilestoneDefinition>>;
    async fn list_all_definitions(&self) -> Result<Vec<MilestoneDefinition>>;
    /// Replace the definitions of every component type present in `definitions`
    async fn upsert_definitions(&self, definitions: Vec<MilestoneDefinition>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ProjectTemplateStore: Send + Sync {
    async fn list_project_rows(
        &self,
        project_id: &Id,
        component_type: &str,
    ) -> Result<Vec<ProjectMilestoneTemplate>>;
    async fn list_all_project_rows(&self, project_id: &Id) -> Result<Vec<ProjectMilestoneTemplate>>;
    /// Insert a project's complete template set in one step. Returns `false`
    /// without writing anything if the project already has template rows.
    async fn insert_project_template_set(
        &self,
        project_id: &Id,
        rows: Vec<ProjectMilestoneTemplate>,
    ) -> Result<bool>;
}

/// Read side of the append-only template change log
#[async_trait::async_trait]
pub trait TemplateChangeLog: Send + Sync {
    /// Newest first
    async fn list_changes(
        &self,
        project_id: &Id,
        component_type: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TemplateChangeRecord>>;
    async fn get_change(&self, id: &Id) -> Result<Option<TemplateChangeRecord>>;
}

/// The slice of the component subsystem recalculation needs
#[async_trait::async_trait]
pub trait ComponentAccess: Send + Sync {
    async fn list_components(&self, project_id: &Id, component_type: &str) -> Result<Vec<Component>>;
    async fn write_percent_complete(&self, component_id: &Id, percent_complete: f64) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ComponentStore: ComponentAccess {
    async fn get_component(&self, component_id: &Id) -> Result<Option<Component>>;
    async fn upsert_component(&self, component: Component) -> Result<()>;
}

/// An open transaction over one component's milestone map.
///
/// The component stays locked until `commit` or drop, and its (project,
/// component type) template cannot be edited in the meantime. Dropping it
/// without committing discards the write.
#[async_trait::async_trait]
pub trait ComponentUnitOfWork: Send + Sync {
    /// The component as read under the lock
    fn component(&self) -> &Component;
    /// Project rows for the component's pair
    async fn project_template_rows(&self) -> Result<Vec<ProjectMilestoneTemplate>>;
    /// System definitions for the component's type
    async fn default_definitions(&self) -> Result<Vec<MilestoneDefinition>>;
    /// Store the milestone map together with its recomputed percentage
    async fn write_milestones(
        &self,
        current_milestones: &HashMap<String, f64>,
        percent_complete: f64,
    ) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ComponentEditStore: Send + Sync {
    /// `None` when no component has this id
    async fn begin_component_edit(
        &self,
        component_id: &Id,
    ) -> Result<Option<Box<dyn ComponentUnitOfWork>>>;
}

/// An open transaction over one (project, component type) template set.
///
/// Nothing written through it is visible to other readers until `commit`;
/// dropping it without committing discards every write.
#[async_trait::async_trait]
pub trait TemplateUnitOfWork: ComponentAccess {
    /// Current project rows, locked against concurrent edits of the same pair
    async fn locked_template_rows(&self) -> Result<Vec<ProjectMilestoneTemplate>>;
    async fn replace_template_rows(&self, rows: Vec<ProjectMilestoneTemplate>) -> Result<()>;
    async fn append_change(&self, record: &TemplateChangeRecord) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait TemplateEditStore: Send + Sync {
    async fn begin_template_edit(
        &self,
        project_id: &Id,
        component_type: &str,
    ) -> Result<Box<dyn TemplateUnitOfWork>>;
}

pub trait Store:
    MilestoneDefinitionStore
    + ProjectTemplateStore
    + TemplateChangeLog
    + ComponentStore
    + ComponentEditStore
    + TemplateEditStore
    + Send
    + Sync
{
}
