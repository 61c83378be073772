use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A student row from the local ledger snapshot.
///
/// `birth_date` is kept raw; year extraction happens in `signal` so a
/// malformed value degrades to "unknown" instead of failing the load.
#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: i64,
    pub display_name: String,
    pub birth_date: Option<String>,
    pub group_ref: Option<String>,
    /// Dependent-row counts per tracked table, e.g. `enrollments -> 3`.
    pub dependents: BTreeMap<String, u32>,
}

/// A student row from the external registry export.
#[derive(Debug, Clone)]
pub struct RegistryRecord {
    pub id: String,
    pub display_name: String,
    pub birth_date: Option<String>,
    pub group_id: String,
}

/// A local class with its recorded grade label, if any.
#[derive(Debug, Clone)]
pub struct LocalGroup {
    pub id: String,
    pub grade_label: Option<String>,
}

/// Pre-loaded snapshots for one run.
pub struct ReconInput {
    pub locals: Vec<StudentRecord>,
    pub externals: Vec<RegistryRecord>,
    pub groups: Vec<LocalGroup>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// One piece of evidence contributing to a candidate score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSignal {
    NameExact,
    /// The shorter key's tokens all appear, in order, in the longer key.
    NameTokenSubset { shared: usize, total: usize },
    BirthYearExact { year: i32 },
    /// Years differ but within tolerance; score untouched.
    BirthYearNear { delta: i32 },
    /// Years differ beyond tolerance; score capped below the confirmed tier.
    BirthYearConflict { delta: i32 },
}

/// A scored local/external pairing. Ephemeral: candidates exist only
/// between matching and tier classification.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub local_id: i64,
    pub external_id: String,
    pub score: f64,
    pub signals: Vec<MatchSignal>,
}

/// The winning candidate for one local record.
#[derive(Debug, Clone)]
pub struct MatchPair {
    pub local_id: i64,
    pub external_id: String,
    pub score: f64,
    pub signals: Vec<MatchSignal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Confirmed,
    Review,
    Unmatched,
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Review => write!(f, "review"),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// Best-per-local pairings split by threshold, plus both leftovers.
#[derive(Debug)]
pub struct TieredMatches {
    pub confirmed: Vec<MatchPair>,
    pub review: Vec<MatchPair>,
    pub unmatched_locals: Vec<i64>,
    pub unmatched_externals: Vec<String>,
}

// ---------------------------------------------------------------------------
// Grade inference
// ---------------------------------------------------------------------------

/// A grade label, or the explicit refusal to guess one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeLabel {
    Known(String),
    /// No rule matched. Carries the winning signal value when there was
    /// one, so the report shows what failed to map.
    Unclassified(Option<i32>),
}

impl GradeLabel {
    pub fn known(&self) -> Option<&str> {
        match self {
            Self::Known(label) => Some(label),
            Self::Unclassified(_) => None,
        }
    }
}

impl std::fmt::Display for GradeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(label) => write!(f, "{label}"),
            Self::Unclassified(None) => write!(f, "UNCLASSIFIED"),
            Self::Unclassified(Some(signal)) => write!(f, "UNCLASSIFIED (signal={signal})"),
        }
    }
}

impl Serialize for GradeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Inferred grade for one registry group.
#[derive(Debug, Clone, Serialize)]
pub struct GradeInference {
    pub group_id: String,
    /// Age-signal histogram over members with a parseable birth year.
    pub histogram: BTreeMap<i32, usize>,
    pub label: GradeLabel,
    pub tie_broken: bool,
}

// ---------------------------------------------------------------------------
// Divergences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    GradeMismatch,
    MissingLocal,
    MissingExternal,
    NameOnlyReview,
}

impl std::fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GradeMismatch => write!(f, "grade_mismatch"),
            Self::MissingLocal => write!(f, "missing_local"),
            Self::MissingExternal => write!(f, "missing_external"),
            Self::NameOnlyReview => write!(f, "name_only_review"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Divergence {
    pub kind: DivergenceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub details: String,
}

// ---------------------------------------------------------------------------
// Dedup planning
// ---------------------------------------------------------------------------

/// A duplicate-group member, with enough context to audit canonical choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: i64,
    pub display_name: String,
    pub dependents_total: u32,
}

/// One planned foreign-key move: rows in `table` pointing at `from_id`
/// get repointed at `to_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub table: String,
    pub from_id: i64,
    pub to_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupGroup {
    pub identity_key: String,
    pub members: Vec<GroupMember>,
    pub canonical_id: i64,
    /// Every migration precedes every deletion when the plan is applied.
    pub migrations: Vec<Migration>,
    pub deletions: Vec<i64>,
}

/// A duplicate group excluded from the plan, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedGroup {
    pub identity_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupPlan {
    pub groups: Vec<DedupGroup>,
    pub skipped: Vec<SkippedGroup>,
    /// Records whose identity key came out empty; never grouped.
    pub unkeyed: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Summary + Report
// ---------------------------------------------------------------------------

/// One local record's final disposition in the mapping table.
#[derive(Debug, Clone, Serialize)]
pub struct MappingRow {
    pub local_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub score: f64,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub locals: usize,
    pub externals: usize,
    pub confirmed: usize,
    pub review: usize,
    pub unmatched_locals: usize,
    pub unmatched_externals: usize,
    pub divergences: usize,
    pub divergence_counts: BTreeMap<String, usize>,
    pub dedup_groups: usize,
    pub skipped_groups: usize,
    pub planned_deletions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub threshold: f64,
    pub reference_year: i32,
    pub engine_version: String,
    pub run_at: String,
}

/// The immutable artifact of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub meta: RunMeta,
    pub summary: ReconSummary,
    pub mapping: Vec<MappingRow>,
    pub divergences: Vec<Divergence>,
    pub grades: Vec<GradeInference>,
    pub dedup: DedupPlan,
}
