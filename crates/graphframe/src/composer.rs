use crate::mask::{DataframeMask, MaskSize};
use crate::types::ComponentType;
use tracing::error;

/// Counters are single bytes, so at most this many selections can be intersected.
pub const MAX_SELECTION_MASKS: usize = 255;

/// Optional per-type caps on the composed result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskLimits {
    pub point: Option<usize>,
    pub edge: Option<usize>,
}

impl MaskLimits {
    pub fn get(&self, component: ComponentType) -> Option<usize> {
        match component {
            ComponentType::Point => self.point,
            ComponentType::Edge => self.edge,
        }
    }
}

/// Indices present in every selection mask and in no exclusion mask.
///
/// An empty `selections` slice acts as a single universal selection. Results
/// honoring a limit are the lowest global indices, in ascending order.
pub fn compose_masks(
    universe: MaskSize,
    selections: &[&DataframeMask],
    exclusions: &[&DataframeMask],
    limits: MaskLimits,
) -> DataframeMask {
    let selections = if selections.len() > MAX_SELECTION_MASKS {
        error!(
            requested = selections.len(),
            kept = MAX_SELECTION_MASKS,
            "too many selection masks, dropping the excess"
        );
        &selections[..MAX_SELECTION_MASKS]
    } else {
        selections
    };

    let point = compose_component(ComponentType::Point, universe, selections, exclusions, limits);
    let edge = compose_component(ComponentType::Edge, universe, selections, exclusions, limits);
    DataframeMask::new(universe, point, edge)
}

fn compose_component(
    component: ComponentType,
    universe: MaskSize,
    selections: &[&DataframeMask],
    exclusions: &[&DataframeMask],
    limits: MaskLimits,
) -> Option<Vec<u32>> {
    let total = universe.get(component);
    let limit = limits.get(component);
    let all_selections_full = selections.iter().all(|m| m.is_full(component));
    let no_exclusions = exclusions.iter().all(|m| m.indexes(component) == Some(&[][..]));

    if all_selections_full && no_exclusions && limit.map_or(true, |l| l >= total) {
        return None;
    }

    let (mut counters, required) = if selections.is_empty() {
        (vec![1u8; total], 1u8)
    } else {
        let mut counters = vec![0u8; total];
        for mask in selections {
            for idx in mask.iter(component) {
                if let Some(c) = counters.get_mut(idx as usize) {
                    *c += 1;
                }
            }
        }
        (counters, selections.len() as u8)
    };

    for mask in exclusions {
        for idx in mask.iter(component) {
            if let Some(c) = counters.get_mut(idx as usize) {
                *c = 0;
            }
        }
    }

    let cap = limit.unwrap_or(usize::MAX);
    let mut result = Vec::new();
    for (idx, &count) in counters.iter().enumerate() {
        if result.len() >= cap {
            break;
        }
        if count == required {
            result.push(idx as u32);
        }
    }
    Some(result)
}
