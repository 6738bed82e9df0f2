//! Weighted composite scoring
//!
//! Each surviving candidate gets four per-field component scores in [0, 1]:
//! canonical-exact matches score 1.0, everything else falls back to raw
//! Jaro-Winkler similarity, and a dimension the query does not constrain
//! scores 1.0 (a non-constraint must not penalize the entity). The
//! composite is an affine combination of the components, so it stays in
//! [0, 1] as long as the weights sum to 1.

use crate::alias::{self, AliasDomain, AliasTables};
use crate::config::Weights;
use crate::filter::Candidate;
use crate::model::{non_blank, FieldScores, MatchResult, Query};
use crate::similarity::jaro_winkler;

/// Score one candidate against the query.
pub fn score_candidate(
    candidate: &Candidate<'_>,
    query: &Query,
    aliases: &AliasTables,
    weights: &Weights,
) -> MatchResult {
    let entity = candidate.entity;

    let floor = match query.floor_token() {
        None => 1.0,
        Some(q) => component(
            AliasDomain::Floor,
            q,
            entity.floor_value().as_deref(),
            aliases,
        ),
    };

    let room = match query.room_token() {
        None => 1.0,
        Some(q) => component(AliasDomain::Room, q, entity.room_value(), aliases),
    };

    let device_type = match query.type_token() {
        None => 1.0,
        Some(q) => type_component(q, entity.device_type.as_deref(), aliases),
    };

    // Computed at stage 2; 1.0 when the name stage was skipped.
    let name = candidate.name_score;

    let fields = FieldScores {
        floor,
        room,
        device_type,
        name,
    };
    let score = weights.room * room
        + weights.name * name
        + weights.floor * floor
        + weights.device_type * device_type;

    MatchResult {
        entity_id: entity.id.clone(),
        score,
        fields,
    }
}

/// Floor/room component: canonical or normalized equality scores 1.0, else
/// the raw similarity. A missing entity value against a constrained query
/// dimension scores 0.
pub(crate) fn component(
    domain: AliasDomain,
    query_raw: &str,
    entity_raw: Option<&str>,
    aliases: &AliasTables,
) -> f64 {
    let Some(entity_raw) = entity_raw else {
        return 0.0;
    };

    if let (Some(cq), Some(ce)) = (
        aliases.canonicalize(domain, query_raw),
        aliases.canonicalize(domain, entity_raw),
    ) {
        if cq == ce {
            return 1.0;
        }
    }

    let norm_q = alias::normalize(query_raw);
    let norm_e = alias::normalize(entity_raw);
    if !norm_q.is_empty() && norm_q == norm_e {
        return 1.0;
    }

    jaro_winkler(&norm_q, &norm_e)
}

/// Device-type component: canonical or case-insensitive raw equality scores
/// 1.0, else the raw similarity.
pub(crate) fn type_component(
    query_raw: &str,
    entity_raw: Option<&str>,
    aliases: &AliasTables,
) -> f64 {
    let Some(entity_raw) = non_blank(entity_raw) else {
        return 0.0;
    };

    if let (Some(cq), Some(ce)) = (
        aliases.canonicalize(AliasDomain::DeviceType, query_raw),
        aliases.canonicalize(AliasDomain::DeviceType, entity_raw),
    ) {
        if cq == ce {
            return 1.0;
        }
    }
    if entity_raw.to_lowercase() == query_raw.to_lowercase() {
        return 1.0;
    }

    jaro_winkler(&alias::normalize(query_raw), &alias::normalize(entity_raw))
}
