use std::time::{Duration, Instant};

use crate::error::{EngineError, EngineResult};
use crate::logic::earned_value::compute_percent_complete;
use crate::logic::resolve::resolve_effective_template;
use crate::model::{EffectiveTemplate, Id};
use crate::store::traits::{ComponentAccess, Store};

/// Default time a batch may take before it is reported as slow.
pub const DEFAULT_BUDGET: Duration = Duration::from_millis(3000);

/// Re-derives `percent_complete` for every component of a (project, component type) pair.
pub struct BatchRecalculator {
    budget: Duration,
}

impl Default for BatchRecalculator {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

impl BatchRecalculator {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Resolve the template in effect and recalculate against it.
    pub async fn recalculate<S: Store + ?Sized>(
        &self,
        store: &S,
        project_id: &Id,
        component_type: &str,
    ) -> EngineResult<usize> {
        let template = resolve_effective_template(store, project_id, component_type).await?;
        self.apply(store, &template, project_id).await
    }

    /// Recalculate every component against `template`, writing only values that
    /// changed. Returns the number of components written.
    ///
    /// The first failed write aborts the batch with `PartialFailure`.
    pub async fn apply<C: ComponentAccess + ?Sized>(
        &self,
        components: &C,
        template: &EffectiveTemplate,
        project_id: &Id,
    ) -> EngineResult<usize> {
        let started = Instant::now();
        let batch = components
            .list_components(project_id, &template.component_type)
            .await?;
        let total = batch.len();

        let mut written = 0;
        for component in batch {
            let percent_complete =
                compute_percent_complete(&component.current_milestones, &template.milestones);
            if !percent_changed(component.percent_complete, percent_complete) {
                continue;
            }

            if let Err(source) = components
                .write_percent_complete(&component.id, percent_complete)
                .await
            {
                log::error!(
                    "Recalculation of {}/{} aborted at component {} after {} writes: {:#}",
                    project_id,
                    template.component_type,
                    component.id,
                    written,
                    source
                );
                return Err(EngineError::PartialFailure {
                    written,
                    component_id: component.id,
                    source,
                });
            }
            written += 1;
        }

        let elapsed = started.elapsed();
        if elapsed > self.budget {
            log::warn!(
                "Recalculation of {}/{} took {:?} for {} components (budget {:?})",
                project_id,
                template.component_type,
                elapsed,
                total,
                self.budget
            );
        } else {
            log::info!(
                "Recalculated {}/{}: {} of {} components updated in {:?}",
                project_id,
                template.component_type,
                written,
                total,
                elapsed
            );
        }

        Ok(written)
    }
}

fn percent_changed(stored: f64, computed: f64) -> bool {
    (stored - computed).abs() > 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, MilestoneDefinition};
    use crate::store::traits::{ComponentStore, MilestoneDefinitionStore};
    use crate::store::MemoryStore;

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_definitions(vec![
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
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_writes_only_changed_components() {
        let store = seeded_store().await;
        let mut current = Component::new("c1", "p1", "valve").with_milestone("Receive", 100.0);
        current.percent_complete = 20.0;
        let stale = Component::new("c2", "p1", "valve").with_milestone("Install", 100.0);
        let other_type = Component::new("c3", "p1", "pipe").with_milestone("Install", 100.0);
        for component in [current, stale, other_type] {
            store.upsert_component(component).await.unwrap();
        }

        let written = BatchRecalculator::default()
            .recalculate(&store, &"p1".to_string(), "valve")
            .await
            .unwrap();

        assert_eq!(written, 1);
        let c2 = store.get_component(&"c2".to_string()).await.unwrap().unwrap();
        assert_eq!(c2.percent_complete, 80.0);
        let c3 = store.get_component(&"c3".to_string()).await.unwrap().unwrap();
        assert_eq!(c3.percent_complete, 0.0);
    }

    #[tokio::test]
    async fn test_write_failure_reports_partial_count() {
        let store = seeded_store().await;
        for id in ["c1", "c2", "c3"] {
            store
                .upsert_component(Component::new(id, "p1", "valve").with_milestone("Receive", 100.0))
                .await
                .unwrap();
        }
        store.fail_writes_for(&"c2".to_string());

        let err = BatchRecalculator::default()
            .recalculate(&store, &"p1".to_string(), "valve")
            .await
            .unwrap_err();

        match err {
            EngineError::PartialFailure { written, component_id, .. } => {
                assert_eq!(written, 1);
                assert_eq!(component_id, "c2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let c3 = store.get_component(&"c3".to_string()).await.unwrap().unwrap();
        assert_eq!(c3.percent_complete, 0.0);
    }
}
