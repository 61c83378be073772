//! Candidate generation: score every plausible local/external pairing.
//!
//! Scores live in [0, 1]. Name evidence sets the base; birth-year evidence
//! can pull a score up (exact year) or cap it below the confirmed tier
//! (conflicting year). Unknown years contribute nothing either way.

use crate::model::{MatchCandidate, MatchSignal, RegistryRecord, StudentRecord};
use crate::normalize::normalize;
use crate::signal;

/// Fraction of the remaining distance to 1.0 closed by an exact year match.
const YEAR_MATCH_PULL: f64 = 0.5;

/// How far below the confirmed threshold a year-conflicted score lands.
const YEAR_CONFLICT_MARGIN: f64 = 0.01;

/// Scoring policy for one run.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// The confirmed-tier threshold. Year conflicts are capped just below
    /// it so they can never auto-confirm, whatever the name evidence.
    pub confirm_threshold: f64,
    /// Absolute birth-year difference tolerated without penalty.
    pub year_tolerance: i32,
}

/// Score all pairs. Pairs with no name evidence (or a score of zero)
/// produce no candidate at all.
pub fn match_records(
    locals: &[StudentRecord],
    externals: &[RegistryRecord],
    policy: &MatchPolicy,
) -> Vec<MatchCandidate> {
    let local_keys: Vec<String> = locals.iter().map(|l| normalize(&l.display_name)).collect();
    let external_keys: Vec<String> =
        externals.iter().map(|e| normalize(&e.display_name)).collect();

    let mut candidates = Vec::new();
    for (li, local) in locals.iter().enumerate() {
        let local_key = &local_keys[li];
        if local_key.is_empty() {
            continue;
        }
        let local_year = local.birth_date.as_deref().and_then(signal::birth_year);
        for (ei, external) in externals.iter().enumerate() {
            let external_key = &external_keys[ei];
            if external_key.is_empty() {
                continue;
            }
            let external_year = external.birth_date.as_deref().and_then(signal::birth_year);
            if let Some(candidate) = score_pair(
                local.id,
                &external.id,
                local_key,
                external_key,
                local_year,
                external_year,
                policy,
            ) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

fn score_pair(
    local_id: i64,
    external_id: &str,
    local_key: &str,
    external_key: &str,
    local_year: Option<i32>,
    external_year: Option<i32>,
    policy: &MatchPolicy,
) -> Option<MatchCandidate> {
    let mut signals = Vec::new();
    let mut score = match name_score(local_key, external_key) {
        NameScore::Exact => {
            signals.push(MatchSignal::NameExact);
            1.0
        }
        NameScore::TokenSubset { shared, total } => {
            signals.push(MatchSignal::NameTokenSubset { shared, total });
            shared as f64 / total as f64
        }
        NameScore::None => return None,
    };

    if let (Some(local), Some(external)) = (local_year, external_year) {
        let delta = (local - external).abs();
        if delta == 0 {
            score += (1.0 - score) * YEAR_MATCH_PULL;
            signals.push(MatchSignal::BirthYearExact { year: local });
        } else if delta <= policy.year_tolerance {
            signals.push(MatchSignal::BirthYearNear { delta });
        } else {
            // Same name, different person. Whatever the name evidence
            // says, this pair must not clear the confirmed tier.
            let cap = (policy.confirm_threshold - YEAR_CONFLICT_MARGIN).max(0.0);
            score = score.min(cap);
            signals.push(MatchSignal::BirthYearConflict { delta });
        }
    }

    if score <= 0.0 {
        return None;
    }
    Some(MatchCandidate {
        local_id,
        external_id: external_id.to_string(),
        score,
        signals,
    })
}

enum NameScore {
    Exact,
    TokenSubset { shared: usize, total: usize },
    None,
}

/// Exact key equality, or ordered token containment of the shorter key in
/// the longer ("ana silva" inside "ana maria silva"). Anything else is no
/// evidence at all.
fn name_score(a: &str, b: &str) -> NameScore {
    if a == b {
        return NameScore::Exact;
    }
    let a_tokens: Vec<&str> = a.split(' ').collect();
    let b_tokens: Vec<&str> = b.split(' ').collect();
    let (short, long) = if a_tokens.len() <= b_tokens.len() {
        (&a_tokens, &b_tokens)
    } else {
        (&b_tokens, &a_tokens)
    };
    if is_token_subsequence(short, long) {
        NameScore::TokenSubset { shared: short.len(), total: long.len() }
    } else {
        NameScore::None
    }
}

/// True when all of `needle`'s tokens appear in `haystack`, in order.
fn is_token_subsequence(needle: &[&str], haystack: &[&str]) -> bool {
    let mut remaining = haystack.iter();
    needle.iter().all(|n| remaining.any(|h| h == n))
}
