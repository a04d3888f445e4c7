use crate::logic::validate_definitions;
use crate::model::MilestoneDefinition;
use crate::store::traits::MilestoneDefinitionStore;
use anyhow::Result;

/// (name, weight, is_partial) in milestone order
type MilestoneSpec = (&'static str, i32, bool);

const FIELD_WELD: &[MilestoneSpec] = &[
    ("Fit-up", 10, false),
    ("Weld Made", 60, false),
    ("Punch", 10, false),
    ("Test", 15, false),
    ("Restore", 5, false),
];

/// Shared by valves, fittings, flanges, supports, instruments and gaskets
const DISCRETE_INSTALL: &[MilestoneSpec] = &[
    ("Receive", 10, false),
    ("Install", 60, false),
    ("Punch", 10, false),
    ("Test", 15, false),
    ("Restore", 5, false),
];

const SPOOL: &[MilestoneSpec] = &[
    ("Receive", 5, false),
    ("Erect", 40, false),
    ("Connect", 40, false),
    ("Punch", 5, false),
    ("Test", 5, false),
    ("Restore", 5, false),
];

const PIPE: &[MilestoneSpec] = &[
    ("Receive", 5, false),
    ("Install", 70, true),
    ("Punch", 10, false),
    ("Test", 10, false),
    ("Restore", 5, false),
];

const THREADED_PIPE: &[MilestoneSpec] = &[
    ("Fabricate", 16, true),
    ("Install", 16, true),
    ("Erect", 16, true),
    ("Connect", 16, true),
    ("Support", 16, true),
    ("Punch", 5, false),
    ("Test", 10, false),
    ("Restore", 5, false),
];

const CATALOGUE: &[(&str, &[MilestoneSpec])] = &[
    ("field_weld", FIELD_WELD),
    ("valve", DISCRETE_INSTALL),
    ("fitting", DISCRETE_INSTALL),
    ("flange", DISCRETE_INSTALL),
    ("support", DISCRETE_INSTALL),
    ("instrument", DISCRETE_INSTALL),
    ("gasket", DISCRETE_INSTALL),
    ("spool", SPOOL),
    ("pipe", PIPE),
    ("threaded_pipe", THREADED_PIPE),
];

/// The built-in default milestone catalogue
pub fn default_milestone_definitions() -> Vec<MilestoneDefinition> {
    CATALOGUE
        .iter()
        .flat_map(|(component_type, milestones)| {
            milestones
                .iter()
                .enumerate()
                .map(move |(index, (name, weight, is_partial))| MilestoneDefinition {
                    component_type: component_type.to_string(),
                    milestone_name: name.to_string(),
                    weight: *weight,
                    order: index as i32 + 1,
                    is_partial: *is_partial,
                })
        })
        .collect()
}

/// Validate and store the default catalogue
pub async fn load_seed_data<S: MilestoneDefinitionStore + ?Sized>(store: &S) -> Result<usize> {
    let definitions = default_milestone_definitions();
    validate_definitions(&definitions)?;
    let count = definitions.len();
    store.upsert_definitions(definitions).await?;
    log::info!("Seeded {} default milestone definitions", count);
    Ok(count)
}
