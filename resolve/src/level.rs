use std::sync::Arc;

use strata_model::{Component, LeveledBundle, StartLevelConfig};

/// Turn an ordered component list into run bundles, numbering them when `config` is set.
pub fn assign_levels(
    order: &[Arc<Component>],
    config: Option<&StartLevelConfig>,
) -> Vec<LeveledBundle> {
    order
        .iter()
        .enumerate()
        .map(|(idx, component)| {
            let bundle = LeveledBundle::new(component.id());
            match config {
                Some(config) => bundle.with_level(config.level_at(idx)),
                None => bundle,
            }
        })
        .collect()
}
