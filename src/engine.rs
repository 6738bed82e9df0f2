//! Match pipeline orchestration
//!
//! Wires the filter stages, scorer and ranker into a single
//! [`Matcher::resolve`] call and records per-stage instrumentation
//! (entity counts in/out, elapsed time, surviving ids) that operators use
//! to diagnose mismatches.

use std::sync::Arc;
use std::time::Instant;

use crate::alias::AliasTables;
use crate::config::MatcherConfig;
use crate::filter::{self, Pool};
use crate::model::{
    validate_catalog, Entity, MatchError, MatchResult, MatchTrace, Query, RankedOutcome, Stage,
    StageReport,
};
use crate::{rank, score, suggest};

/// The entity-resolution engine.
///
/// Holds an immutable alias-table snapshot and tuning configuration; every
/// [`resolve`](Matcher::resolve) call is a pure function of its inputs, so
/// one `Matcher` can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct Matcher {
    aliases: Arc<AliasTables>,
    config: MatcherConfig,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(Arc::new(AliasTables::default()), MatcherConfig::default())
    }
}

impl Matcher {
    pub fn new(aliases: Arc<AliasTables>, config: MatcherConfig) -> Self {
        Self { aliases, config }
    }

    pub fn aliases(&self) -> &AliasTables {
        &self.aliases
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Resolve a query against a catalog snapshot.
    ///
    /// Returns an empty outcome (never an error) when everything is
    /// filtered away; errors only on a structurally invalid catalog.
    pub fn resolve(&self, query: &Query, catalog: &[Entity]) -> Result<RankedOutcome, MatchError> {
        validate_catalog(catalog)?;

        let mut trace = MatchTrace::default();

        // Stage 1.1: device type
        let pool = Pool::unfiltered(catalog);
        let entities_in = pool.len();
        let started = Instant::now();
        let pool = filter::filter_by_type(pool, query, &self.aliases);
        push_report(&mut trace, Stage::TypeFilter, entities_in, &pool, started, true);

        // Kept aside for loose suggestions on an empty outcome.
        let type_pool: Vec<&Entity> = pool.candidates.iter().map(|c| c.entity).collect();

        // Stage 1.2: floor and room
        let entities_in = pool.len();
        let started = Instant::now();
        let pool = filter::filter_by_space(pool, query, &self.aliases, &self.config.thresholds);
        push_report(&mut trace, Stage::SpaceFilter, entities_in, &pool, started, true);

        // Stage 2: device name
        let entities_in = pool.len();
        let started = Instant::now();
        let pool = filter::match_by_name(pool, query, &self.aliases, self.config.thresholds.name);
        push_report(&mut trace, Stage::NameMatch, entities_in, &pool, started, true);

        // Stage 3: composite scoring
        let entities_in = pool.len();
        let started = Instant::now();
        let scored: Vec<MatchResult> = pool
            .candidates
            .iter()
            .map(|c| score::score_candidate(c, query, &self.aliases, &self.config.weights))
            .collect();
        trace.stages.push(StageReport {
            stage: Stage::Score,
            entities_in,
            entities_out: scored.len(),
            elapsed: started.elapsed(),
            survivors: None,
        });

        // Ranking and near-tie detection
        let entities_in = scored.len();
        let started = Instant::now();
        let (results, ambiguous) =
            rank::rank(scored, self.config.top_k, self.config.disambiguation_gap);
        trace.stages.push(StageReport {
            stage: Stage::Rank,
            entities_in,
            entities_out: results.len(),
            elapsed: started.elapsed(),
            survivors: None,
        });

        let suggestions = if results.is_empty() {
            suggest::loose_suggestions(&type_pool, query, &self.aliases, &self.config.weights)
        } else {
            Vec::new()
        };

        log::debug!(
            "resolved query against {} entities: {} results, ambiguous={}, {} suggestions",
            catalog.len(),
            results.len(),
            ambiguous,
            suggestions.len()
        );

        Ok(RankedOutcome {
            results,
            ambiguous,
            suggestions,
            trace,
        })
    }
}

fn push_report(
    trace: &mut MatchTrace,
    stage: Stage,
    entities_in: usize,
    pool: &Pool<'_>,
    started: Instant,
    with_survivors: bool,
) {
    let elapsed = started.elapsed();
    log::debug!(
        "{stage:?}: {entities_in} -> {} entities in {elapsed:?}",
        pool.len()
    );
    let survivors = if with_survivors {
        let ids = pool.ids();
        log::trace!("{stage:?} survivors: {ids:?}");
        Some(ids)
    } else {
        None
    };
    trace.stages.push(StageReport {
        stage,
        entities_in,
        entities_out: pool.len(),
        elapsed,
        survivors,
    });
}
