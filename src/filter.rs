//! Progressive candidate filtering
//!
//! Three stages narrow the catalog before scoring:
//! - stage 1.1: device-type filter (binary inclusion)
//! - stage 1.2: floor/room filter (canonical or fuzzy match, AND)
//! - stage 2: device-name matcher (Jaro-Winkler, skipped for generic names)
//!
//! The pool advances Unfiltered -> TypeFiltered -> SpaceFiltered ->
//! NameFiltered. The type and space stages are strict and may empty the
//! pool; the name stage advances only when its narrower set is non-empty,
//! otherwise the spatially-correct pool survives unfiltered.

use crate::alias::{self, AliasDomain, AliasTables};
use crate::config::Thresholds;
use crate::model::{non_blank, Entity, Query};
use crate::similarity::jaro_winkler;

/// How far a candidate pool has progressed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Unfiltered,
    TypeFiltered,
    SpaceFiltered,
    NameFiltered,
}

/// A surviving entity plus the name similarity computed at stage 2.
///
/// `name_score` stays 1.0 when the name stage is skipped (absent or generic
/// query name): a non-constraint must not penalize the entity.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub entity: &'a Entity,
    pub name_score: f64,
}

/// The candidate pool flowing through the filter stages.
#[derive(Debug)]
pub struct Pool<'a> {
    pub stage: FilterStage,
    pub candidates: Vec<Candidate<'a>>,
}

impl<'a> Pool<'a> {
    pub fn unfiltered(catalog: &'a [Entity]) -> Self {
        Self {
            stage: FilterStage::Unfiltered,
            candidates: catalog
                .iter()
                .map(|entity| Candidate {
                    entity,
                    name_score: 1.0,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.candidates
            .iter()
            .map(|c| c.entity.id.clone())
            .collect()
    }
}

/// Stage 1.1: keep entities whose device type matches the query type, by
/// canonical key or by raw case-insensitive equality. Binary inclusion
/// only; an absent query type passes everything through.
pub fn filter_by_type<'a>(mut pool: Pool<'a>, query: &Query, aliases: &AliasTables) -> Pool<'a> {
    let Some(raw_q) = query.type_token() else {
        pool.stage = FilterStage::TypeFiltered;
        return pool;
    };

    let canon_q = aliases.canonicalize(AliasDomain::DeviceType, raw_q);
    let candidates = pool
        .candidates
        .into_iter()
        .filter(|c| type_matches(c.entity, raw_q, canon_q, aliases))
        .collect();

    Pool {
        stage: FilterStage::TypeFiltered,
        candidates,
    }
}

fn type_matches(
    entity: &Entity,
    raw_q: &str,
    canon_q: Option<&str>,
    aliases: &AliasTables,
) -> bool {
    let Some(raw_e) = non_blank(entity.device_type.as_deref()) else {
        return false;
    };

    if let (Some(cq), Some(ce)) = (canon_q, aliases.canonicalize(AliasDomain::DeviceType, raw_e)) {
        if cq == ce {
            return true;
        }
    }

    raw_e.to_lowercase() == raw_q.to_lowercase()
}

/// Stage 1.2: keep entities matching the query floor AND room. Each
/// dimension matches on canonical-key equality, normalized equality, or
/// fuzzy similarity at or above its threshold. A dimension the query does
/// not supply imposes no constraint; a constrained dimension the entity
/// cannot answer excludes it.
pub fn filter_by_space<'a>(
    mut pool: Pool<'a>,
    query: &Query,
    aliases: &AliasTables,
    thresholds: &Thresholds,
) -> Pool<'a> {
    let floor_q = query.floor_token();
    let room_q = query.room_token();

    if floor_q.is_none() && room_q.is_none() {
        pool.stage = FilterStage::SpaceFiltered;
        return pool;
    }

    let candidates = pool
        .candidates
        .into_iter()
        .filter(|c| {
            let floor_ok = floor_q.is_none_or(|q| {
                c.entity.floor_value().is_some_and(|v| {
                    dimension_matches(AliasDomain::Floor, q, v.as_ref(), aliases, thresholds.floor)
                })
            });
            let room_ok = room_q.is_none_or(|q| {
                c.entity.room_value().is_some_and(|v| {
                    dimension_matches(AliasDomain::Room, q, v, aliases, thresholds.room)
                })
            });
            floor_ok && room_ok
        })
        .collect();

    Pool {
        stage: FilterStage::SpaceFiltered,
        candidates,
    }
}

fn dimension_matches(
    domain: AliasDomain,
    query_raw: &str,
    entity_raw: &str,
    aliases: &AliasTables,
    threshold: f64,
) -> bool {
    if let (Some(cq), Some(ce)) = (
        aliases.canonicalize(domain, query_raw),
        aliases.canonicalize(domain, entity_raw),
    ) {
        if cq == ce {
            return true;
        }
    }

    let norm_q = alias::normalize(query_raw);
    let norm_e = alias::normalize(entity_raw);
    if !norm_q.is_empty() && norm_q == norm_e {
        return true;
    }

    jaro_winkler(&norm_q, &norm_e) >= threshold
}

/// Stage 2: re-rank by approximate name similarity.
///
/// Skipped entirely (pass-through, name component 1.0) when the query has
/// no device name or the name is generic for the active device type. When
/// no entity clears the threshold the pool falls back unfiltered: an
/// unmatched name must not eliminate a spatially-correct pool.
pub fn match_by_name<'a>(
    mut pool: Pool<'a>,
    query: &Query,
    aliases: &AliasTables,
    threshold: f64,
) -> Pool<'a> {
    let Some(raw_q) = query.name_token() else {
        pool.stage = FilterStage::NameFiltered;
        return pool;
    };

    let active_type = query
        .type_token()
        .and_then(|t| aliases.canonicalize(AliasDomain::DeviceType, t));
    if aliases.is_generic(active_type, raw_q) {
        pool.stage = FilterStage::NameFiltered;
        return pool;
    }

    let norm_q = alias::normalize(raw_q);
    for candidate in &mut pool.candidates {
        candidate.name_score = name_similarity(candidate.entity, &norm_q);
    }

    let survivors: Vec<Candidate<'a>> = pool
        .candidates
        .iter()
        .filter(|c| c.name_score >= threshold)
        .cloned()
        .collect();

    if survivors.is_empty() {
        return pool;
    }

    Pool {
        stage: FilterStage::NameFiltered,
        candidates: survivors,
    }
}

/// Maximum similarity between the normalized query name and the entity's
/// name fields, `device_name_en` > `device_name` > `friendly_name`,
/// short-circuiting on a perfect hit.
pub(crate) fn name_similarity(entity: &Entity, norm_query: &str) -> f64 {
    let fields = [
        entity.device_name_en.as_deref(),
        entity.device_name.as_deref(),
        entity.friendly_name(),
    ];

    let mut best: f64 = 0.0;
    for field in fields {
        let Some(raw) = non_blank(field) else {
            continue;
        };
        let sim = jaro_winkler(norm_query, &alias::normalize(raw));
        if sim >= 1.0 {
            return 1.0;
        }
        if sim > best {
            best = sim;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;

    fn entity(id: &str, device_type: &str, room_en: &str, name_en: &str) -> Entity {
        Entity {
            id: id.to_string(),
            device_type: non_blank(Some(device_type)).map(str::to_string),
            room_name_en: non_blank(Some(room_en)).map(str::to_string),
            device_name_en: non_blank(Some(name_en)).map(str::to_string),
            ..Entity::default()
        }
    }

    fn catalog() -> Vec<Entity> {
        vec![
            entity("light.lr_ceiling", "light", "living_room", "ceiling_light"),
            entity("light.lr_floor", "light", "living_room", "floor_lamp"),
            entity("light.br_ceiling", "light", "bedroom", "ceiling_light"),
            entity("switch.lr_outlet", "switch", "living_room", "wall_outlet"),
            entity("fan.br_ceiling", "fan", "bedroom", "ceiling_fan"),
        ]
    }

    fn query(floor: &str, room: &str, device_type: &str, name: &str) -> Query {
        Query {
            floor: non_blank(Some(floor)).map(str::to_string),
            room: non_blank(Some(room)).map(str::to_string),
            device_type: non_blank(Some(device_type)).map(str::to_string),
            device_name: non_blank(Some(name)).map(str::to_string),
        }
    }

    #[test]
    fn test_type_filter_absent_passes_through() {
        let catalog = catalog();
        let pool = filter_by_type(
            Pool::unfiltered(&catalog),
            &Query::default(),
            &AliasTables::default(),
        );
        assert_eq!(pool.stage, FilterStage::TypeFiltered);
        assert_eq!(pool.len(), 5);
    }

    #[test]
    fn test_type_filter_canonical() {
        let catalog = catalog();
        let aliases = AliasTables::default();

        let pool = filter_by_type(
            Pool::unfiltered(&catalog),
            &query("", "", "light", ""),
            &aliases,
        );
        assert_eq!(pool.len(), 3);

        // Alias variant behaves identically to the English token.
        let pool_cn = filter_by_type(
            Pool::unfiltered(&catalog),
            &query("", "", "灯", ""),
            &aliases,
        );
        assert_eq!(pool_cn.ids(), pool.ids());
    }

    #[test]
    fn test_type_filter_raw_equality_fallback() {
        let catalog = vec![entity("vacuum.hall", "vacuum", "hallway", "robovac")];
        let pool = filter_by_type(
            Pool::unfiltered(&catalog),
            &query("", "", "Vacuum", ""),
            &AliasTables::default(),
        );
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_type_filter_excludes_untyped_entities() {
        let catalog = vec![entity("sensor.unknown", "", "study", "mystery")];
        let pool = filter_by_type(
            Pool::unfiltered(&catalog),
            &query("", "", "light", ""),
            &AliasTables::default(),
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn test_space_filter_room_canonical() {
        let catalog = catalog();
        let cfg = MatcherConfig::default();
        let pool = filter_by_space(
            Pool::unfiltered(&catalog),
            &query("", "客厅", "", ""),
            &AliasTables::default(),
            &cfg.thresholds,
        );
        assert_eq!(
            pool.ids(),
            vec!["light.lr_ceiling", "light.lr_floor", "switch.lr_outlet"]
        );
    }

    #[test]
    fn test_space_filter_floor_from_level() {
        let mut e = entity("light.up", "light", "bedroom", "bedside_lamp");
        e.level = Some(2);
        let catalog = vec![e];
        let cfg = MatcherConfig::default();

        let pool = filter_by_space(
            Pool::unfiltered(&catalog),
            &query("二楼", "", "", ""),
            &AliasTables::default(),
            &cfg.thresholds,
        );
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_space_filter_and_combination() {
        let mut upstairs = entity("light.up", "light", "bedroom", "lamp_a");
        upstairs.floor_name_en = Some("second_floor".to_string());
        let mut downstairs = entity("light.down", "light", "bedroom", "lamp_b");
        downstairs.floor_name_en = Some("first_floor".to_string());
        let catalog = vec![upstairs, downstairs];
        let cfg = MatcherConfig::default();

        let pool = filter_by_space(
            Pool::unfiltered(&catalog),
            &query("2", "bedroom", "", ""),
            &AliasTables::default(),
            &cfg.thresholds,
        );
        assert_eq!(pool.ids(), vec!["light.up"]);
    }

    #[test]
    fn test_space_filter_constrained_dimension_requires_entity_value() {
        let catalog = vec![entity("light.nowhere", "light", "", "orphan_lamp")];
        let cfg = MatcherConfig::default();
        let pool = filter_by_space(
            Pool::unfiltered(&catalog),
            &query("", "living_room", "", ""),
            &AliasTables::default(),
            &cfg.thresholds,
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn test_space_filter_fuzzy_accepts_near_spelling() {
        let catalog = vec![entity("light.lr", "light", "livng_room", "lamp")];
        let cfg = MatcherConfig::default();
        let pool = filter_by_space(
            Pool::unfiltered(&catalog),
            &query("", "living_room", "", ""),
            &AliasTables::default(),
            &cfg.thresholds,
        );
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_name_match_filters_and_records_scores() {
        let catalog = catalog();
        let pool = match_by_name(
            Pool::unfiltered(&catalog),
            &query("", "", "", "ceiling light"),
            &AliasTables::default(),
            0.45,
        );
        assert_eq!(pool.stage, FilterStage::NameFiltered);
        assert!(pool.candidates.iter().all(|c| c.name_score >= 0.45));
        assert!(pool
            .ids()
            .contains(&"light.lr_ceiling".to_string()));
    }

    #[test]
    fn test_name_match_absent_passes_through() {
        let catalog = catalog();
        let pool = match_by_name(
            Pool::unfiltered(&catalog),
            &Query::default(),
            &AliasTables::default(),
            0.45,
        );
        assert_eq!(pool.len(), 5);
        assert!(pool.candidates.iter().all(|c| c.name_score == 1.0));
    }

    #[test]
    fn test_name_match_generic_skipped() {
        let catalog = catalog();
        let aliases = AliasTables::default();

        let generic = match_by_name(
            Pool::unfiltered(&catalog),
            &query("", "", "light", "灯"),
            &aliases,
            0.45,
        );
        let absent = match_by_name(
            Pool::unfiltered(&catalog),
            &query("", "", "light", ""),
            &aliases,
            0.45,
        );
        assert_eq!(generic.ids(), absent.ids());
        assert!(generic.candidates.iter().all(|c| c.name_score == 1.0));
    }

    #[test]
    fn test_name_match_generic_only_for_active_type() {
        let catalog = catalog();
        // "灯" is generic for lights but a real constraint for fans.
        let pool = match_by_name(
            Pool::unfiltered(&catalog),
            &query("", "", "fan", "灯"),
            &AliasTables::default(),
            0.45,
        );
        // Nothing resembles "灯" so the stage falls back unfiltered and the
        // pool does not advance.
        assert_eq!(pool.stage, FilterStage::Unfiltered);
        assert_eq!(pool.len(), 5);
    }

    #[test]
    fn test_name_match_fallback_keeps_pool() {
        let catalog = catalog();
        let pool = match_by_name(
            Pool::unfiltered(&catalog),
            &query("", "", "", "qqqq"),
            &AliasTables::default(),
            0.45,
        );
        assert_eq!(pool.len(), 5);
        // Computed sub-threshold similarities are preserved for the scorer.
        assert!(pool.candidates.iter().all(|c| c.name_score < 0.45));
    }

    #[test]
    fn test_name_match_threshold_monotonicity() {
        let catalog = catalog();
        let aliases = AliasTables::default();
        let q = query("", "", "", "ceiling light");

        let loose = match_by_name(Pool::unfiltered(&catalog), &q, &aliases, 0.45);
        let strict = match_by_name(Pool::unfiltered(&catalog), &q, &aliases, 0.80);
        assert!(strict.len() <= loose.len());
    }

    #[test]
    fn test_name_similarity_prefers_english_field() {
        let mut e = entity("light.x", "light", "study", "desk_lamp");
        e.device_name = Some("书桌灯".to_string());
        assert_eq!(name_similarity(&e, &alias::normalize("desk_lamp")), 1.0);
    }

    #[test]
    fn test_name_similarity_uses_nested_friendly_name() {
        let mut e = Entity {
            id: "light.y".to_string(),
            ..Entity::default()
        };
        e.attributes
            .insert("friendly_name".to_string(), "Desk Lamp".into());
        assert_eq!(name_similarity(&e, &alias::normalize("desk lamp")), 1.0);
    }
}
