//! Loose suggestions for empty outcomes
//!
//! When every candidate is filtered away the caller still wants a "did you
//! mean" answer. Suggestions are drawn from the type-filtered pool,
//! restricted to the requested location by normalized containment (no
//! cross-location suggestions), and ranked by the same weighted combination
//! of raw similarities with no threshold gating.

use std::cmp::Ordering;

use crate::alias::{self, AliasDomain, AliasTables};
use crate::config::Weights;
use crate::filter::name_similarity;
use crate::model::{Entity, Query, Suggestion};
use crate::score::{component, type_component};

/// Upper bound on suggestions per outcome.
pub const MAX_SUGGESTIONS: usize = 3;

/// Rank loose suggestions from `pool` (the stage 1.1 survivors).
pub fn loose_suggestions(
    pool: &[&Entity],
    query: &Query,
    aliases: &AliasTables,
    weights: &Weights,
) -> Vec<Suggestion> {
    let floor_q = query.floor_token().map(alias::normalize);
    let room_q = query.room_token().map(alias::normalize);

    let mut scored: Vec<(&Entity, f64)> = Vec::new();
    for &entity in pool {
        let floor_value = entity.floor_value();
        let e_floor = floor_value
            .as_deref()
            .map(alias::normalize)
            .unwrap_or_default();
        let e_room = entity
            .room_value()
            .map(alias::normalize)
            .unwrap_or_default();

        // A requested floor excludes entities without floor information.
        if let Some(fq) = &floor_q {
            if e_floor.is_empty() || !contains_either(&e_floor, fq) {
                continue;
            }
        }
        // A requested room must match when the entity has one; entities
        // without room information stay eligible (the floor gate above
        // already anchored the location).
        if let Some(rq) = &room_q {
            if !e_room.is_empty() && !contains_either(&e_room, rq) {
                continue;
            }
        }

        let floor_s = query
            .floor_token()
            .map_or(0.0, |q| component(AliasDomain::Floor, q, floor_value.as_deref(), aliases));
        let room_s = query
            .room_token()
            .map_or(0.0, |q| component(AliasDomain::Room, q, entity.room_value(), aliases));
        let name_s = query
            .name_token()
            .map_or(0.0, |q| name_similarity(entity, &alias::normalize(q)));
        let type_s = query
            .type_token()
            .map_or(0.0, |q| type_component(q, entity.device_type.as_deref(), aliases));

        let score = weights.floor * floor_s
            + weights.room * room_s
            + weights.name * name_s
            + weights.device_type * type_s;
        scored.push((entity, score));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(entity, score)| Suggestion {
            entity_id: entity.id.clone(),
            device_name: entity.display_name().unwrap_or_default().to_string(),
            room: entity.room_value().unwrap_or_default().to_string(),
            floor: entity
                .floor_value()
                .map(|v| v.into_owned())
                .unwrap_or_default(),
            reason_score: (score * 1000.0).round() / 1000.0,
        })
        .collect()
}

fn contains_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}
