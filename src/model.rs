//! Data model for match requests and outcomes
//!
//! Catalogs and queries arrive from external collaborators (an inventory
//! provider and an intent parser, both speaking JSON), so every type here
//! derives the serde traits. All name/type fields are optional strings and a
//! blank value is treated the same as an absent one.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal conditions detected before matching begins.
///
/// A zero-result match is not an error; it yields an empty
/// [`RankedOutcome`]. These variants cover catalogs that are structurally
/// unusable for matching.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("entity at index {index} has an empty id")]
    EmptyEntityId { index: usize },
    #[error("duplicate entity id `{id}` in catalog snapshot")]
    DuplicateEntityId { id: String },
}

/// One addressable device in the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Entity {
    /// Unique, stable identifier within one catalog snapshot.
    #[serde(alias = "entity_id")]
    pub id: String,
    pub device_type: Option<String>,
    pub device_name: Option<String>,
    pub device_name_en: Option<String>,
    pub friendly_name: Option<String>,
    pub floor_name: Option<String>,
    pub floor_name_en: Option<String>,
    pub floor_type: Option<String>,
    pub level: Option<i64>,
    pub room_name: Option<String>,
    pub room_name_en: Option<String>,
    pub room_type: Option<String>,
    /// Raw provider attributes; some providers nest `friendly_name` here
    /// instead of populating the top-level field.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Entity {
    /// Display-name fallback, preferring the top-level field over the raw
    /// provider attributes.
    pub fn friendly_name(&self) -> Option<&str> {
        non_blank(self.friendly_name.as_deref()).or_else(|| {
            self.attributes
                .get("friendly_name")
                .and_then(|v| v.as_str())
                .and_then(|s| non_blank(Some(s)))
        })
    }

    /// First non-blank floor field: `floor_name_en` > `floor_type` >
    /// `floor_name` > `level`.
    pub fn floor_value(&self) -> Option<Cow<'_, str>> {
        if let Some(v) = non_blank(self.floor_name_en.as_deref()) {
            return Some(Cow::Borrowed(v));
        }
        if let Some(v) = non_blank(self.floor_type.as_deref()) {
            return Some(Cow::Borrowed(v));
        }
        if let Some(v) = non_blank(self.floor_name.as_deref()) {
            return Some(Cow::Borrowed(v));
        }
        self.level.map(|level| Cow::Owned(level.to_string()))
    }

    /// First non-blank room field: `room_name_en` > `room_type` > `room_name`.
    pub fn room_value(&self) -> Option<&str> {
        non_blank(self.room_name_en.as_deref())
            .or_else(|| non_blank(self.room_type.as_deref()))
            .or_else(|| non_blank(self.room_name.as_deref()))
    }

    /// Best human-readable name for display in suggestions.
    pub fn display_name(&self) -> Option<&str> {
        non_blank(self.device_name_en.as_deref())
            .or_else(|| non_blank(self.device_name.as_deref()))
            .or_else(|| self.friendly_name())
    }
}

/// A match request. Absent or blank fields impose no constraint on that
/// dimension; a query with every field absent matches the whole catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub floor: Option<String>,
    pub room: Option<String>,
    pub device_type: Option<String>,
    pub device_name: Option<String>,
}

impl Query {
    pub fn floor_token(&self) -> Option<&str> {
        non_blank(self.floor.as_deref())
    }

    pub fn room_token(&self) -> Option<&str> {
        non_blank(self.room.as_deref())
    }

    pub fn type_token(&self) -> Option<&str> {
        non_blank(self.device_type.as_deref())
    }

    pub fn name_token(&self) -> Option<&str> {
        non_blank(self.device_name.as_deref())
    }
}

/// Per-field component scores that produced a composite score, kept for
/// explainability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FieldScores {
    pub floor: f64,
    pub room: f64,
    pub device_type: f64,
    pub name: f64,
}

/// One surviving entity with its composite score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub entity_id: String,
    pub score: f64,
    pub fields: FieldScores,
}

/// A loose candidate offered when the ranked result list is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub entity_id: String,
    pub device_name: String,
    pub room: String,
    pub floor: String,
    pub reason_score: f64,
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TypeFilter,
    SpaceFilter,
    NameMatch,
    Score,
    Rank,
}

/// Instrumentation for one pipeline stage.
///
/// `survivors` carries the surviving entity ids for the filter stages
/// (operators diagnose mismatches from these lists); it is `None` for the
/// score and rank stages, whose output is the result list itself.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub entities_in: usize,
    pub entities_out: usize,
    pub elapsed: Duration,
    pub survivors: Option<Vec<String>>,
}

/// Stage-by-stage instrumentation for one match call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchTrace {
    pub stages: Vec<StageReport>,
}

/// Ordered match results (score descending, stable tie-break by catalog
/// order) plus the near-tie disambiguation flag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankedOutcome {
    pub results: Vec<MatchResult>,
    /// True when the top two scores are closer than the disambiguation gap;
    /// the caller should ask a clarifying question instead of auto-acting.
    pub ambiguous: bool,
    /// Populated only when `results` is empty.
    pub suggestions: Vec<Suggestion>,
    pub trace: MatchTrace,
}

/// Reject structurally invalid catalogs before any filtering runs.
pub fn validate_catalog(catalog: &[Entity]) -> Result<(), MatchError> {
    let mut seen = HashSet::with_capacity(catalog.len());
    for (index, entity) in catalog.iter().enumerate() {
        let id = entity.id.trim();
        if id.is_empty() {
            return Err(MatchError::EmptyEntityId { index });
        }
        if !seen.insert(id) {
            return Err(MatchError::DuplicateEntityId { id: id.to_string() });
        }
    }
    Ok(())
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
