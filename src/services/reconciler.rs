//! Field-level reconciliation of a submitted profile snapshot against stored state.
//!
//! | Field | Rule |
//! |---|---|
//! | display name | incoming non-empty, else previous, else `Citizen` |
//! | level / experience | `max(previous, incoming)` ratchet |
//! | resources | normalized snapshot replaces (or merges into, per policy) previous |
//! | progress | incoming replaces wholesale, else previous |
//! | stats | shallow merge, incoming keys win |
//!
//! Timestamps are owned by the storage layer.

use serde_json::{Map, Value};

use crate::{
    config::ResourcesPolicy,
    constants::{
        DEFAULT_DISPLAY_NAME, DEFAULT_EXPERIENCE, DEFAULT_LEVEL, DEFAULT_RESOURCE_AMOUNT,
        RESOURCE_NAMES,
    },
    models::{PartialProfile, PlayerState, Resources},
};

/// State of a profile that has never been synced.
pub fn default_state() -> PlayerState {
    PlayerState {
        display_name: DEFAULT_DISPLAY_NAME.to_string(),
        level: DEFAULT_LEVEL,
        experience: DEFAULT_EXPERIENCE,
        resources: default_resources(),
        progress: Map::new(),
        stats: Map::new(),
    }
}

pub fn default_resources() -> Resources {
    RESOURCE_NAMES
        .iter()
        .map(|name| (name.to_string(), DEFAULT_RESOURCE_AMOUNT))
        .collect()
}

/// Keeps only known resources, fills the missing ones, and coerces
/// anything that is not a finite non-negative number to zero.
pub fn normalize_resources(raw: &Map<String, Value>) -> Resources {
    RESOURCE_NAMES
        .iter()
        .map(|name| {
            let amount = raw
                .get(*name)
                .map(coerce_amount)
                .unwrap_or(DEFAULT_RESOURCE_AMOUNT);
            (name.to_string(), amount)
        })
        .collect()
}

fn coerce_amount(value: &Value) -> f64 {
    match value.as_f64() {
        Some(amount) if amount.is_finite() && amount > 0.0 => amount,
        _ => 0.0,
    }
}

/// Computes the next stored state. `previous` is `None` when no row existed.
pub fn reconcile(
    previous: Option<&PlayerState>,
    incoming: &PartialProfile,
    policy: ResourcesPolicy,
) -> PlayerState {
    let base = previous.cloned().unwrap_or_else(default_state);

    let display_name = incoming
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or(base.display_name);

    let level = base
        .level
        .max(incoming.level.unwrap_or(DEFAULT_LEVEL))
        .max(DEFAULT_LEVEL);
    let experience = base
        .experience
        .max(incoming.experience.unwrap_or(DEFAULT_EXPERIENCE))
        .max(DEFAULT_EXPERIENCE);

    let resources = match (&incoming.resources, policy) {
        (None, _) => base.resources,
        (Some(raw), ResourcesPolicy::Replace) => normalize_resources(raw),
        (Some(raw), ResourcesPolicy::Merge) => merge_resources(base.resources, raw),
    };

    let progress = incoming.progress.clone().unwrap_or(base.progress);

    let mut stats = base.stats;
    if let Some(update) = &incoming.stats {
        for (key, value) in update {
            stats.insert(key.clone(), value.clone());
        }
    }

    PlayerState {
        display_name,
        level,
        experience,
        resources,
        progress,
        stats,
    }
}

fn merge_resources(mut current: Resources, raw: &Map<String, Value>) -> Resources {
    for name in RESOURCE_NAMES {
        if let Some(value) = raw.get(name) {
            current.insert(name.to_string(), coerce_amount(value));
        }
    }
    current
}
