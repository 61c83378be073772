//! Report assembly: fold every stage's output into one immutable artifact.

use std::collections::BTreeMap;

use crate::config::ReconConfig;
use crate::model::{
    DedupPlan, Divergence, GradeInference, MappingRow, MatchTier, ReconInput, ReconReport,
    ReconSummary, RunMeta, TieredMatches,
};

pub fn build_report(
    config: &ReconConfig,
    input: &ReconInput,
    tiers: &TieredMatches,
    divergences: Vec<Divergence>,
    grades: Vec<GradeInference>,
    dedup: DedupPlan,
) -> ReconReport {
    let mapping = build_mapping(tiers);
    let summary = compute_summary(input, tiers, &divergences, &dedup);
    ReconReport {
        meta: RunMeta {
            config_name: config.name.clone(),
            threshold: config.threshold,
            reference_year: config.reference_year,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        mapping,
        divergences,
        grades,
        dedup,
    }
}

/// One row per local record, sorted by local id.
pub fn build_mapping(tiers: &TieredMatches) -> Vec<MappingRow> {
    let mut mapping = Vec::new();
    for pair in &tiers.confirmed {
        mapping.push(MappingRow {
            local_id: pair.local_id,
            external_id: Some(pair.external_id.clone()),
            score: pair.score,
            tier: MatchTier::Confirmed,
        });
    }
    for pair in &tiers.review {
        mapping.push(MappingRow {
            local_id: pair.local_id,
            external_id: Some(pair.external_id.clone()),
            score: pair.score,
            tier: MatchTier::Review,
        });
    }
    for &local_id in &tiers.unmatched_locals {
        mapping.push(MappingRow {
            local_id,
            external_id: None,
            score: 0.0,
            tier: MatchTier::Unmatched,
        });
    }
    mapping.sort_by_key(|row| row.local_id);
    mapping
}

pub fn compute_summary(
    input: &ReconInput,
    tiers: &TieredMatches,
    divergences: &[Divergence],
    dedup: &DedupPlan,
) -> ReconSummary {
    let mut divergence_counts: BTreeMap<String, usize> = BTreeMap::new();
    for divergence in divergences {
        *divergence_counts.entry(divergence.kind.to_string()).or_insert(0) += 1;
    }

    ReconSummary {
        locals: input.locals.len(),
        externals: input.externals.len(),
        confirmed: tiers.confirmed.len(),
        review: tiers.review.len(),
        unmatched_locals: tiers.unmatched_locals.len(),
        unmatched_externals: tiers.unmatched_externals.len(),
        divergences: divergences.len(),
        divergence_counts,
        dedup_groups: dedup.groups.len(),
        skipped_groups: dedup.skipped.len(),
        planned_deletions: dedup.groups.iter().map(|g| g.deletions.len()).sum(),
    }
}
