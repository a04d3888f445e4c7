use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, types::Json, PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::model::{
    Component, Id, MilestoneDefinition, ProjectMilestoneTemplate, TemplateChangeRecord, WeightEntry,
};
use crate::store::traits::{
    ComponentAccess, ComponentEditStore, ComponentStore, ComponentUnitOfWork,
    MilestoneDefinitionStore, ProjectTemplateStore, Store, TemplateChangeLog, TemplateEditStore,
    TemplateUnitOfWork,
};

const TEMPLATE_COLUMNS: &str =
    "project_id, component_type, milestone_name, weight, sort_order, is_partial, last_updated";
const CHANGE_COLUMNS: &str = "id, project_id, component_type, changed_by, old_weights, new_weights, applied_to_existing, affected_component_count, changed_at";
const COMPONENT_COLUMNS: &str =
    "id, project_id, component_type, current_milestones, percent_complete";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn definition_from_row(row: &PgRow) -> MilestoneDefinition {
    MilestoneDefinition {
        component_type: row.get("component_type"),
        milestone_name: row.get("milestone_name"),
        weight: row.get("weight"),
        order: row.get("sort_order"),
        is_partial: row.get("is_partial"),
    }
}

fn template_from_row(row: &PgRow) -> ProjectMilestoneTemplate {
    ProjectMilestoneTemplate {
        project_id: row.get("project_id"),
        component_type: row.get("component_type"),
        milestone_name: row.get("milestone_name"),
        weight: row.get("weight"),
        order: row.get("sort_order"),
        is_partial: row.get("is_partial"),
        last_updated: row.get("last_updated"),
    }
}

fn change_from_row(row: &PgRow) -> Result<TemplateChangeRecord> {
    let old_weights: Json<Vec<WeightEntry>> = row
        .try_get("old_weights")
        .context("Failed to decode old weights")?;
    let new_weights: Json<Vec<WeightEntry>> = row
        .try_get("new_weights")
        .context("Failed to decode new weights")?;

    Ok(TemplateChangeRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        component_type: row.get("component_type"),
        changed_by: row.get("changed_by"),
        old_weights: old_weights.0,
        new_weights: new_weights.0,
        applied_to_existing: row.get("applied_to_existing"),
        affected_component_count: row.get("affected_component_count"),
        changed_at: row.get("changed_at"),
    })
}

fn component_from_row(row: &PgRow) -> Result<Component> {
    let milestones: Json<HashMap<String, f64>> = row
        .try_get("current_milestones")
        .context("Failed to decode component milestones")?;

    Ok(Component {
        id: row.get("id"),
        project_id: row.get("project_id"),
        component_type: row.get("component_type"),
        current_milestones: milestones.0,
        percent_complete: row.get("percent_complete"),
    })
}

fn template_lock_key(project_id: &Id, component_type: &str) -> String {
    format!("{}:{}", project_id, component_type)
}

/// Transaction-scoped advisory locks, always taken project first, then pair.
enum TemplateLock<'a> {
    /// Every component type of the project, exclusively
    Project,
    /// One pair exclusively, the project shared
    EditPair(&'a str),
    /// One pair and the project, both shared
    ReadPair(&'a str),
}

async fn lock_template(
    conn: &mut sqlx::PgConnection,
    project_id: &Id,
    scope: TemplateLock<'_>,
) -> Result<()> {
    let (project_fn, pair) = match scope {
        TemplateLock::Project => ("pg_advisory_xact_lock", None),
        TemplateLock::EditPair(component_type) => {
            ("pg_advisory_xact_lock_shared", Some((component_type, "pg_advisory_xact_lock")))
        }
        TemplateLock::ReadPair(component_type) => (
            "pg_advisory_xact_lock_shared",
            Some((component_type, "pg_advisory_xact_lock_shared")),
        ),
    };

    sqlx::query(&format!("SELECT {}(hashtext($1))", project_fn))
        .bind(project_id)
        .execute(&mut *conn)
        .await
        .context("Failed to lock project templates")?;

    if let Some((component_type, pair_fn)) = pair {
        sqlx::query(&format!("SELECT {}(hashtext($1))", pair_fn))
            .bind(template_lock_key(project_id, component_type))
            .execute(&mut *conn)
            .await
            .context("Failed to lock component type template")?;
    }
    Ok(())
}

async fn ensure_project(conn: &mut sqlx::PgConnection, project_id: &Id) -> Result<()> {
    sqlx::query("INSERT INTO projects (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(project_id)
        .execute(conn)
        .await
        .context("Failed to register project")?;
    Ok(())
}

async fn insert_template_rows(
    conn: &mut sqlx::PgConnection,
    rows: &[ProjectMilestoneTemplate],
) -> Result<()> {
    for row in rows {
        sqlx::query(&format!(
            "INSERT INTO project_milestone_templates ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            TEMPLATE_COLUMNS
        ))
        .bind(&row.project_id)
        .bind(&row.component_type)
        .bind(&row.milestone_name)
        .bind(row.weight)
        .bind(row.order)
        .bind(row.is_partial)
        .bind(row.last_updated)
        .execute(&mut *conn)
        .await
        .context("Failed to insert template row")?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl MilestoneDefinitionStore for PostgresStore {
    async fn list_definitions(&self, component_type: &str) -> Result<Vec<MilestoneDefinition>> {
        let rows = sqlx::query(
            "SELECT component_type, milestone_name, weight, sort_order, is_partial
             FROM milestone_definitions WHERE component_type = $1 ORDER BY sort_order, milestone_name",
        )
        .bind(component_type)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch milestone definitions")?;

        Ok(rows.iter().map(definition_from_row).collect())
    }

    async fn list_all_definitions(&self) -> Result<Vec<MilestoneDefinition>> {
        let rows = sqlx::query(
            "SELECT component_type, milestone_name, weight, sort_order, is_partial
             FROM milestone_definitions ORDER BY component_type, sort_order, milestone_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list milestone definitions")?;

        Ok(rows.iter().map(definition_from_row).collect())
    }

    async fn upsert_definitions(&self, definitions: Vec<MilestoneDefinition>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('milestone_definitions'))")
            .execute(&mut *tx)
            .await
            .context("Failed to lock milestone definitions")?;

        let mut component_types: Vec<&str> = definitions.iter().map(|d| d.component_type.as_str()).collect();
        component_types.sort_unstable();
        component_types.dedup();
        for component_type in component_types {
            sqlx::query("DELETE FROM milestone_definitions WHERE component_type = $1")
                .bind(component_type)
                .execute(&mut *tx)
                .await
                .context("Failed to clear milestone definitions")?;
        }

        for definition in &definitions {
            sqlx::query(
                "INSERT INTO milestone_definitions (component_type, milestone_name, weight, sort_order, is_partial)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&definition.component_type)
            .bind(&definition.milestone_name)
            .bind(definition.weight)
            .bind(definition.order)
            .bind(definition.is_partial)
            .execute(&mut *tx)
            .await
            .context("Failed to insert milestone definition")?;
        }

        tx.commit().await.context("Failed to commit milestone definitions")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProjectTemplateStore for PostgresStore {
    async fn list_project_rows(
        &self,
        project_id: &Id,
        component_type: &str,
    ) -> Result<Vec<ProjectMilestoneTemplate>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_milestone_templates
             WHERE project_id = $1 AND component_type = $2 ORDER BY sort_order, milestone_name",
            TEMPLATE_COLUMNS
        ))
        .bind(project_id)
        .bind(component_type)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch project template")?;

        Ok(rows.iter().map(template_from_row).collect())
    }

    async fn list_all_project_rows(&self, project_id: &Id) -> Result<Vec<ProjectMilestoneTemplate>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_milestone_templates
             WHERE project_id = $1 ORDER BY component_type, sort_order, milestone_name",
            TEMPLATE_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list project templates")?;

        Ok(rows.iter().map(template_from_row).collect())
    }

    async fn insert_project_template_set(
        &self,
        project_id: &Id,
        rows: Vec<ProjectMilestoneTemplate>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        lock_template(&mut tx, project_id, TemplateLock::Project).await?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_milestone_templates WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count project template rows")?;

        if existing > 0 {
            return Ok(false);
        }

        ensure_project(&mut tx, project_id).await?;
        insert_template_rows(&mut tx, &rows).await?;

        tx.commit().await.context("Failed to commit project templates")?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl TemplateChangeLog for PostgresStore {
    async fn list_changes(
        &self,
        project_id: &Id,
        component_type: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TemplateChangeRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM template_change_records
             WHERE project_id = $1 AND component_type = $2
             ORDER BY changed_at DESC, id DESC LIMIT $3 OFFSET $4",
            CHANGE_COLUMNS
        ))
        .bind(project_id)
        .bind(component_type)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list template changes")?;

        rows.iter().map(change_from_row).collect()
    }

    async fn get_change(&self, id: &Id) -> Result<Option<TemplateChangeRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM template_change_records WHERE id = $1",
            CHANGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch template change")?;

        row.as_ref().map(change_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl ComponentAccess for PostgresStore {
    async fn list_components(&self, project_id: &Id, component_type: &str) -> Result<Vec<Component>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM components WHERE project_id = $1 AND component_type = $2 ORDER BY id",
            COMPONENT_COLUMNS
        ))
        .bind(project_id)
        .bind(component_type)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list components")?;

        rows.iter().map(component_from_row).collect()
    }

    async fn write_percent_complete(&self, component_id: &Id, percent_complete: f64) -> Result<()> {
        let result = sqlx::query("UPDATE components SET percent_complete = $2 WHERE id = $1")
            .bind(component_id)
            .bind(percent_complete)
            .execute(&self.pool)
            .await
            .context("Failed to update percent complete")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Component not found: {}", component_id);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ComponentStore for PostgresStore {
    async fn get_component(&self, component_id: &Id) -> Result<Option<Component>> {
        let row = sqlx::query(&format!("SELECT {} FROM components WHERE id = $1", COMPONENT_COLUMNS))
            .bind(component_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch component")?;

        row.as_ref().map(component_from_row).transpose()
    }

    async fn upsert_component(&self, component: Component) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        ensure_project(&mut tx, &component.project_id).await?;

        sqlx::query(&format!(
            "INSERT INTO components ({}) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                project_id = EXCLUDED.project_id,
                component_type = EXCLUDED.component_type,
                current_milestones = EXCLUDED.current_milestones,
                percent_complete = EXCLUDED.percent_complete",
            COMPONENT_COLUMNS
        ))
        .bind(&component.id)
        .bind(&component.project_id)
        .bind(&component.component_type)
        .bind(Json(&component.current_milestones))
        .bind(component.percent_complete)
        .execute(&mut *tx)
        .await
        .context("Failed to upsert component")?;

        tx.commit().await.context("Failed to commit component")?;
        Ok(())
    }
}

/// Template edit running inside one Postgres transaction.
///
/// An advisory lock keyed on the (project, component type) pair serialises
/// edits of the same pair, including the first one when no rows exist yet,
/// and the shared project lock keeps the edit apart from a concurrent clone.
pub struct PostgresUnitOfWork {
    project_id: Id,
    component_type: String,
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait::async_trait]
impl ComponentAccess for PostgresUnitOfWork {
    async fn list_components(&self, project_id: &Id, component_type: &str) -> Result<Vec<Component>> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM components WHERE project_id = $1 AND component_type = $2 ORDER BY id FOR UPDATE",
            COMPONENT_COLUMNS
        ))
        .bind(project_id)
        .bind(component_type)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to lock components for recalculation")?;

        rows.iter().map(component_from_row).collect()
    }

    async fn write_percent_complete(&self, component_id: &Id, percent_complete: f64) -> Result<()> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query("UPDATE components SET percent_complete = $2 WHERE id = $1")
            .bind(component_id)
            .bind(percent_complete)
            .execute(&mut **tx)
            .await
            .context("Failed to update percent complete")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Component not found: {}", component_id);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TemplateUnitOfWork for PostgresUnitOfWork {
    async fn locked_template_rows(&self) -> Result<Vec<ProjectMilestoneTemplate>> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_milestone_templates
             WHERE project_id = $1 AND component_type = $2
             ORDER BY sort_order, milestone_name FOR UPDATE",
            TEMPLATE_COLUMNS
        ))
        .bind(&self.project_id)
        .bind(&self.component_type)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to lock project template")?;

        Ok(rows.iter().map(template_from_row).collect())
    }

    async fn replace_template_rows(&self, rows: Vec<ProjectMilestoneTemplate>) -> Result<()> {
        let mut tx = self.tx.lock().await;

        sqlx::query(
            "DELETE FROM project_milestone_templates WHERE project_id = $1 AND component_type = $2",
        )
        .bind(&self.project_id)
        .bind(&self.component_type)
        .execute(&mut **tx)
        .await
        .context("Failed to clear project template")?;

        ensure_project(&mut tx, &self.project_id).await?;
        insert_template_rows(&mut tx, &rows).await
    }

    async fn append_change(&self, record: &TemplateChangeRecord) -> Result<()> {
        let mut tx = self.tx.lock().await;
        sqlx::query(&format!(
            "INSERT INTO template_change_records ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            CHANGE_COLUMNS
        ))
        .bind(&record.id)
        .bind(&record.project_id)
        .bind(&record.component_type)
        .bind(&record.changed_by)
        .bind(Json(&record.old_weights))
        .bind(Json(&record.new_weights))
        .bind(record.applied_to_existing)
        .bind(record.affected_component_count)
        .bind(record.changed_at)
        .execute(&mut **tx)
        .await
        .context("Failed to append template change record")?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .into_inner()
            .commit()
            .await
            .context("Failed to commit template edit")
    }
}

#[async_trait::async_trait]
impl TemplateEditStore for PostgresStore {
    async fn begin_template_edit(
        &self,
        project_id: &Id,
        component_type: &str,
    ) -> Result<Box<dyn TemplateUnitOfWork>> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        lock_template(&mut tx, project_id, TemplateLock::EditPair(component_type)).await?;

        Ok(Box::new(PostgresUnitOfWork {
            project_id: project_id.clone(),
            component_type: component_type.to_string(),
            tx: Mutex::new(tx),
        }))
    }
}

/// Milestone write running inside one Postgres transaction, with the
/// component row locked and the template pair locked in shared mode.
pub struct PostgresComponentEdit {
    component: Component,
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait::async_trait]
impl ComponentUnitOfWork for PostgresComponentEdit {
    fn component(&self) -> &Component {
        &self.component
    }

    async fn project_template_rows(&self) -> Result<Vec<ProjectMilestoneTemplate>> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_milestone_templates
             WHERE project_id = $1 AND component_type = $2 ORDER BY sort_order, milestone_name",
            TEMPLATE_COLUMNS
        ))
        .bind(&self.component.project_id)
        .bind(&self.component.component_type)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to fetch project template")?;

        Ok(rows.iter().map(template_from_row).collect())
    }

    async fn default_definitions(&self) -> Result<Vec<MilestoneDefinition>> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(
            "SELECT component_type, milestone_name, weight, sort_order, is_partial
             FROM milestone_definitions WHERE component_type = $1 ORDER BY sort_order, milestone_name",
        )
        .bind(&self.component.component_type)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to fetch milestone definitions")?;

        Ok(rows.iter().map(definition_from_row).collect())
    }

    async fn write_milestones(
        &self,
        current_milestones: &HashMap<String, f64>,
        percent_complete: f64,
    ) -> Result<()> {
        let mut tx = self.tx.lock().await;
        sqlx::query(
            "UPDATE components SET current_milestones = $2, percent_complete = $3 WHERE id = $1",
        )
        .bind(&self.component.id)
        .bind(Json(current_milestones))
        .bind(percent_complete)
        .execute(&mut **tx)
        .await
        .context("Failed to update component milestones")?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .into_inner()
            .commit()
            .await
            .context("Failed to commit milestone write")
    }
}

#[async_trait::async_trait]
impl ComponentEditStore for PostgresStore {
    async fn begin_component_edit(
        &self,
        component_id: &Id,
    ) -> Result<Option<Box<dyn ComponentUnitOfWork>>> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        // The pair is needed before the advisory locks; it is re-read under them.
        let pair: Option<(Id, String)> =
            sqlx::query_as("SELECT project_id, component_type FROM components WHERE id = $1")
                .bind(component_id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to fetch component")?;
        let Some((project_id, component_type)) = pair else {
            return Ok(None);
        };
        lock_template(&mut tx, &project_id, TemplateLock::ReadPair(&component_type)).await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM components WHERE id = $1 FOR UPDATE",
            COMPONENT_COLUMNS
        ))
        .bind(component_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock component")?;
        let Some(component) = row.as_ref().map(component_from_row).transpose()? else {
            return Ok(None);
        };
        if component.project_id != project_id || component.component_type != component_type {
            anyhow::bail!("Component {} moved while it was being locked", component_id);
        }

        Ok(Some(Box::new(PostgresComponentEdit {
            component,
            tx: Mutex::new(tx),
        })))
    }
}

impl Store for PostgresStore {}
