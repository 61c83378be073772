//! Divergence detection over classified matches. Every finding is a
//! human-adjudicable row; nothing here mutates anything.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    Divergence, DivergenceKind, GradeInference, RegistryRecord, StudentRecord, TieredMatches,
};

/// Detect divergences between the local ledger and the registry.
///
/// `registry_grades` is the per-group inference output; `local_grades`
/// maps a local group ref to its recorded grade label. `expect_external`
/// decides which locals are supposed to exist in the registry at all.
pub fn detect(
    tiers: &TieredMatches,
    locals: &[StudentRecord],
    externals: &[RegistryRecord],
    registry_grades: &BTreeMap<String, GradeInference>,
    local_grades: &BTreeMap<String, String>,
    expect_external: impl Fn(&StudentRecord) -> bool,
) -> Vec<Divergence> {
    let local_by_id: BTreeMap<i64, &StudentRecord> =
        locals.iter().map(|l| (l.id, l)).collect();
    let external_by_id: BTreeMap<&str, &RegistryRecord> =
        externals.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut divergences = Vec::new();

    // Grade mismatches: only CONFIRMED pairs where both sides carry a
    // known label. An unclassified side is silence, not disagreement.
    for pair in &tiers.confirmed {
        let (Some(local), Some(external)) = (
            local_by_id.get(&pair.local_id),
            external_by_id.get(pair.external_id.as_str()),
        ) else {
            continue;
        };
        let registry_label = registry_grades
            .get(&external.group_id)
            .and_then(|g| g.label.known());
        let local_label = local
            .group_ref
            .as_deref()
            .and_then(|g| local_grades.get(g))
            .map(String::as_str);
        if let (Some(registry), Some(local_grade)) = (registry_label, local_label) {
            if registry != local_grade {
                divergences.push(Divergence {
                    kind: DivergenceKind::GradeMismatch,
                    local_id: Some(pair.local_id),
                    external_id: Some(pair.external_id.clone()),
                    score: Some(pair.score),
                    details: format!(
                        "local grade '{local_grade}' != registry grade '{registry}'"
                    ),
                });
            }
        }
    }

    // Registry records with no confirmed counterpart.
    let confirmed_externals: BTreeSet<&str> =
        tiers.confirmed.iter().map(|p| p.external_id.as_str()).collect();
    let review_externals: BTreeSet<&str> =
        tiers.review.iter().map(|p| p.external_id.as_str()).collect();
    for external in externals {
        if confirmed_externals.contains(external.id.as_str()) {
            continue;
        }
        let details = if review_externals.contains(external.id.as_str()) {
            format!(
                "'{}' has a review-tier candidate pending adjudication",
                external.display_name
            )
        } else {
            format!("'{}' has no local candidate", external.display_name)
        };
        divergences.push(Divergence {
            kind: DivergenceKind::MissingLocal,
            local_id: None,
            external_id: Some(external.id.clone()),
            score: None,
            details,
        });
    }

    // Locals expected in the registry but never confirmed there.
    let confirmed_locals: BTreeSet<i64> =
        tiers.confirmed.iter().map(|p| p.local_id).collect();
    for local in locals {
        if confirmed_locals.contains(&local.id) || !expect_external(local) {
            continue;
        }
        divergences.push(Divergence {
            kind: DivergenceKind::MissingExternal,
            local_id: Some(local.id),
            external_id: None,
            score: None,
            details: format!(
                "'{}' expected in the registry but not confirmed there",
                local.display_name
            ),
        });
    }

    // Every review pair surfaces once, so the report alone is a worklist.
    for pair in &tiers.review {
        divergences.push(Divergence {
            kind: DivergenceKind::NameOnlyReview,
            local_id: Some(pair.local_id),
            external_id: Some(pair.external_id.clone()),
            score: Some(pair.score),
            details: format!(
                "score {:.2} below the confirmed threshold; manual adjudication required",
                pair.score
            ),
        });
    }

    divergences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GradeLabel, MatchPair};

    fn local(id: i64, name: &str, group_ref: Option<&str>) -> StudentRecord {
        StudentRecord {
            id,
            display_name: name.to_string(),
            birth_date: None,
            group_ref: group_ref.map(String::from),
            dependents: BTreeMap::new(),
        }
    }

    fn ext(id: &str, name: &str, group_id: &str) -> RegistryRecord {
        RegistryRecord {
            id: id.to_string(),
            display_name: name.to_string(),
            birth_date: None,
            group_id: group_id.to_string(),
        }
    }

    fn pair(local_id: i64, external_id: &str, score: f64) -> MatchPair {
        MatchPair {
            local_id,
            external_id: external_id.to_string(),
            score,
            signals: Vec::new(),
        }
    }

    fn inference(group_id: &str, label: GradeLabel) -> (String, GradeInference) {
        (
            group_id.to_string(),
            GradeInference {
                group_id: group_id.to_string(),
                histogram: BTreeMap::new(),
                label,
                tie_broken: false,
            },
        )
    }

    fn tiers(confirmed: Vec<MatchPair>, review: Vec<MatchPair>) -> TieredMatches {
        TieredMatches {
            confirmed,
            review,
            unmatched_locals: Vec::new(),
            unmatched_externals: Vec::new(),
        }
    }

    fn of_kind(divergences: &[Divergence], kind: DivergenceKind) -> Vec<&Divergence> {
        divergences.iter().filter(|d| d.kind == kind).collect()
    }

    #[test]
    fn grade_mismatch_on_confirmed_pair() {
        let locals = vec![local(1, "Ana Silva", Some("4A"))];
        let externals = vec![ext("E1", "Ana Silva", "G4")];
        let registry_grades: BTreeMap<_, _> =
            [inference("G4", GradeLabel::Known("4th".into()))].into();
        let local_grades: BTreeMap<_, _> = [("4A".to_string(), "3rd".to_string())].into();
        let out = detect(
            &tiers(vec![pair(1, "E1", 0.95)], vec![]),
            &locals,
            &externals,
            &registry_grades,
            &local_grades,
            |_| true,
        );
        let found = of_kind(&out, DivergenceKind::GradeMismatch);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].local_id, Some(1));
        assert_eq!(found[0].external_id.as_deref(), Some("E1"));
        assert_eq!(found[0].score, Some(0.95));
        assert!(found[0].details.contains("'3rd'"));
        assert!(found[0].details.contains("'4th'"));
    }

    #[test]
    fn agreeing_grades_are_silent() {
        let locals = vec![local(1, "Ana Silva", Some("4A"))];
        let externals = vec![ext("E1", "Ana Silva", "G4")];
        let registry_grades: BTreeMap<_, _> =
            [inference("G4", GradeLabel::Known("4th".into()))].into();
        let local_grades: BTreeMap<_, _> = [("4A".to_string(), "4th".to_string())].into();
        let out = detect(
            &tiers(vec![pair(1, "E1", 0.95)], vec![]),
            &locals,
            &externals,
            &registry_grades,
            &local_grades,
            |_| true,
        );
        assert!(of_kind(&out, DivergenceKind::GradeMismatch).is_empty());
    }

    #[test]
    fn unclassified_side_never_mismatches() {
        let locals = vec![local(1, "Ana Silva", Some("4A"))];
        let externals = vec![ext("E1", "Ana Silva", "G4")];
        let registry_grades: BTreeMap<_, _> =
            [inference("G4", GradeLabel::Unclassified(Some(14)))].into();
        let local_grades: BTreeMap<_, _> = [("4A".to_string(), "4th".to_string())].into();
        let out = detect(
            &tiers(vec![pair(1, "E1", 0.95)], vec![]),
            &locals,
            &externals,
            &registry_grades,
            &local_grades,
            |_| true,
        );
        assert!(of_kind(&out, DivergenceKind::GradeMismatch).is_empty());
    }

    #[test]
    fn review_pair_never_produces_grade_mismatch() {
        let locals = vec![local(1, "Ana Silva", Some("4A"))];
        let externals = vec![ext("E1", "Ana Silvera", "G4")];
        let registry_grades: BTreeMap<_, _> =
            [inference("G4", GradeLabel::Known("4th".into()))].into();
        let local_grades: BTreeMap<_, _> = [("4A".to_string(), "3rd".to_string())].into();
        let out = detect(
            &tiers(vec![], vec![pair(1, "E1", 0.5)]),
            &locals,
            &externals,
            &registry_grades,
            &local_grades,
            |_| false,
        );
        assert!(of_kind(&out, DivergenceKind::GradeMismatch).is_empty());
        assert_eq!(of_kind(&out, DivergenceKind::NameOnlyReview).len(), 1);
    }

    #[test]
    fn missing_local_distinguishes_pending_review() {
        let locals = vec![local(1, "Ana Silva", None)];
        let externals = vec![
            ext("E1", "Ana Silvera", "G4"),
            ext("E2", "Bruno Costa", "G4"),
        ];
        let out = detect(
            &tiers(vec![], vec![pair(1, "E1", 0.5)]),
            &locals,
            &externals,
            &BTreeMap::new(),
            &BTreeMap::new(),
            |_| false,
        );
        let missing = of_kind(&out, DivergenceKind::MissingLocal);
        assert_eq!(missing.len(), 2);
        assert!(missing[0].details.contains("pending adjudication"));
        assert!(missing[1].details.contains("no local candidate"));
    }

    #[test]
    fn confirmed_external_is_not_missing() {
        let locals = vec![local(1, "Ana Silva", None)];
        let externals = vec![ext("E1", "Ana Silva", "G4")];
        let out = detect(
            &tiers(vec![pair(1, "E1", 1.0)], vec![]),
            &locals,
            &externals,
            &BTreeMap::new(),
            &BTreeMap::new(),
            |_| false,
        );
        assert!(of_kind(&out, DivergenceKind::MissingLocal).is_empty());
    }

    #[test]
    fn missing_external_respects_expectation() {
        let locals = vec![
            local(1, "Ana Silva", Some("4A")),
            local(2, "Bruno Costa", None),
        ];
        let out = detect(
            &tiers(vec![], vec![]),
            &locals,
            &[],
            &BTreeMap::new(),
            &BTreeMap::new(),
            |record| record.group_ref.is_some(),
        );
        let missing = of_kind(&out, DivergenceKind::MissingExternal);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].local_id, Some(1));
    }

    #[test]
    fn review_winner_still_counts_as_missing_external() {
        // A review-tier candidate is not confirmation; the local is still
        // unaccounted for until someone adjudicates.
        let locals = vec![local(1, "Ana Silva", Some("4A"))];
        let externals = vec![ext("E1", "Ana Silvera", "G4")];
        let out = detect(
            &tiers(vec![], vec![pair(1, "E1", 0.5)]),
            &locals,
            &externals,
            &BTreeMap::new(),
            &BTreeMap::new(),
            |_| true,
        );
        assert_eq!(of_kind(&out, DivergenceKind::MissingExternal).len(), 1);
    }
}
