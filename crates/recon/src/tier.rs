//! Tier classification: pick the best candidate per local record and
//! split winners by the confirmed threshold.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    MatchCandidate, MatchPair, RegistryRecord, StudentRecord, TieredMatches,
};

/// Reduce candidates to one winner per local, then tier the winners.
///
/// Winner selection is total: higher score first, then the smaller
/// external id, so the outcome does not depend on candidate order. A local
/// with no candidates at all lands in `unmatched_locals`; an external no
/// candidate ever referenced lands in `unmatched_externals`.
pub fn classify(
    locals: &[StudentRecord],
    externals: &[RegistryRecord],
    candidates: &[MatchCandidate],
    threshold: f64,
) -> TieredMatches {
    let mut best: BTreeMap<i64, &MatchCandidate> = BTreeMap::new();
    for candidate in candidates {
        match best.get(&candidate.local_id) {
            Some(current) if !beats(candidate, current) => {}
            _ => {
                best.insert(candidate.local_id, candidate);
            }
        }
    }

    let mut confirmed = Vec::new();
    let mut review = Vec::new();
    for winner in best.values() {
        let pair = MatchPair {
            local_id: winner.local_id,
            external_id: winner.external_id.clone(),
            score: winner.score,
            signals: winner.signals.clone(),
        };
        if winner.score >= threshold {
            confirmed.push(pair);
        } else {
            review.push(pair);
        }
    }

    let mut unmatched_locals: Vec<i64> = locals
        .iter()
        .filter(|l| !best.contains_key(&l.id))
        .map(|l| l.id)
        .collect();
    unmatched_locals.sort_unstable();

    let referenced: BTreeSet<&str> =
        candidates.iter().map(|c| c.external_id.as_str()).collect();
    let mut unmatched_externals: Vec<String> = externals
        .iter()
        .filter(|e| !referenced.contains(e.id.as_str()))
        .map(|e| e.id.clone())
        .collect();
    unmatched_externals.sort_unstable();

    TieredMatches {
        confirmed,
        review,
        unmatched_locals,
        unmatched_externals,
    }
}

fn beats(challenger: &MatchCandidate, incumbent: &MatchCandidate) -> bool {
    match challenger.score.total_cmp(&incumbent.score) {
        Ordering::Greater => true,
        Ordering::Equal => challenger.external_id < incumbent.external_id,
        Ordering::Less => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn local(id: i64, name: &str) -> StudentRecord {
        StudentRecord {
            id,
            display_name: name.to_string(),
            birth_date: None,
            group_ref: None,
            dependents: BTreeMap::new(),
        }
    }

    fn ext(id: &str, name: &str) -> RegistryRecord {
        RegistryRecord {
            id: id.to_string(),
            display_name: name.to_string(),
            birth_date: None,
            group_id: "G".to_string(),
        }
    }

    fn cand(local_id: i64, external_id: &str, score: f64) -> MatchCandidate {
        MatchCandidate {
            local_id,
            external_id: external_id.to_string(),
            score,
            signals: Vec::new(),
        }
    }

    #[test]
    fn splits_by_threshold() {
        let locals = vec![local(1, "a"), local(2, "b")];
        let externals = vec![ext("E1", "a"), ext("E2", "b")];
        let candidates = vec![cand(1, "E1", 0.95), cand(2, "E2", 0.60)];
        let tiers = classify(&locals, &externals, &candidates, 0.85);
        assert_eq!(tiers.confirmed.len(), 1);
        assert_eq!(tiers.confirmed[0].external_id, "E1");
        assert_eq!(tiers.review.len(), 1);
        assert_eq!(tiers.review[0].external_id, "E2");
        assert!(tiers.unmatched_locals.is_empty());
        assert!(tiers.unmatched_externals.is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let locals = vec![local(1, "a")];
        let externals = vec![ext("E1", "a")];
        let candidates = vec![cand(1, "E1", 0.85)];
        let tiers = classify(&locals, &externals, &candidates, 0.85);
        assert_eq!(tiers.confirmed.len(), 1);
        assert!(tiers.review.is_empty());
    }

    #[test]
    fn best_candidate_wins() {
        let locals = vec![local(1, "a")];
        let externals = vec![ext("E1", "a"), ext("E2", "a")];
        let candidates = vec![cand(1, "E1", 0.70), cand(1, "E2", 0.95)];
        let tiers = classify(&locals, &externals, &candidates, 0.85);
        assert_eq!(tiers.confirmed.len(), 1);
        assert_eq!(tiers.confirmed[0].external_id, "E2");
        // The loser is still "referenced", so E1 is not unmatched.
        assert!(tiers.unmatched_externals.is_empty());
    }

    #[test]
    fn score_tie_breaks_on_external_id() {
        let locals = vec![local(1, "a")];
        let externals = vec![ext("E1", "a"), ext("E2", "a")];
        let forward = vec![cand(1, "E2", 0.9), cand(1, "E1", 0.9)];
        let backward = vec![cand(1, "E1", 0.9), cand(1, "E2", 0.9)];
        let a = classify(&locals, &externals, &forward, 0.85);
        let b = classify(&locals, &externals, &backward, 0.85);
        assert_eq!(a.confirmed[0].external_id, "E1");
        assert_eq!(b.confirmed[0].external_id, "E1");
    }

    #[test]
    fn leftovers_on_both_sides() {
        let locals = vec![local(1, "a"), local(9, "zz")];
        let externals = vec![ext("E1", "a"), ext("E9", "qq")];
        let candidates = vec![cand(1, "E1", 0.9)];
        let tiers = classify(&locals, &externals, &candidates, 0.85);
        assert_eq!(tiers.unmatched_locals, vec![9]);
        assert_eq!(tiers.unmatched_externals, vec!["E9".to_string()]);
    }

    #[test]
    fn no_candidates_at_all() {
        let locals = vec![local(3, "a"), local(1, "b")];
        let externals = vec![ext("E2", "x"), ext("E1", "y")];
        let tiers = classify(&locals, &externals, &[], 0.85);
        assert!(tiers.confirmed.is_empty());
        assert!(tiers.review.is_empty());
        assert_eq!(tiers.unmatched_locals, vec![1, 3]);
        assert_eq!(
            tiers.unmatched_externals,
            vec!["E1".to_string(), "E2".to_string()]
        );
    }

    #[test]
    fn candidate_order_never_changes_the_outcome() {
        let locals = vec![local(1, "a"), local(2, "b")];
        let externals = vec![ext("E1", "a"), ext("E2", "b"), ext("E3", "c")];
        let mut candidates = vec![
            cand(1, "E1", 0.9),
            cand(1, "E2", 0.9),
            cand(2, "E2", 0.5),
            cand(2, "E3", 0.7),
        ];
        let baseline = classify(&locals, &externals, &candidates, 0.85);
        candidates.reverse();
        let reversed = classify(&locals, &externals, &candidates, 0.85);
        assert_eq!(
            baseline.confirmed[0].external_id,
            reversed.confirmed[0].external_id
        );
        assert_eq!(baseline.review[0].external_id, reversed.review[0].external_id);
        assert_eq!(baseline.unmatched_locals, reversed.unmatched_locals);
        assert_eq!(baseline.unmatched_externals, reversed.unmatched_externals);
    }
}
