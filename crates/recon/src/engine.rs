//! Run orchestration: stateless composition of the pipeline stages over
//! one in-memory snapshot. Same config + same snapshots = same report,
//! modulo the `run_at` timestamp.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{ExpectExternal, ReconConfig};
use crate::dedup::plan_dedup;
use crate::divergence::detect;
use crate::error::ReconError;
use crate::grade::infer_grade;
use crate::matcher::{match_records, MatchPolicy};
use crate::model::{GradeInference, ReconInput, ReconReport, RegistryRecord, StudentRecord};
use crate::normalize::identity_key;
use crate::report::build_report;
use crate::signal;
use crate::tier::classify;

/// Run the full pipeline per config. Returns the report; touches nothing.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconReport, ReconError> {
    config.validate()?;

    // Registry-side grade inference, one per grouping id.
    let rules = config.grade_rule_table();
    let mut by_group: BTreeMap<&str, Vec<&RegistryRecord>> = BTreeMap::new();
    for external in &input.externals {
        by_group.entry(external.group_id.as_str()).or_default().push(external);
    }
    let grades: Vec<GradeInference> = by_group
        .iter()
        .map(|(group_id, members)| {
            let signals: Vec<Option<i32>> = members
                .iter()
                .map(|m| signal::age_signal(m.birth_date.as_deref(), config.reference_year))
                .collect();
            infer_grade(group_id, &signals, &rules, config.grade_inference.tie_break)
        })
        .collect();
    let grade_index: BTreeMap<String, GradeInference> =
        grades.iter().map(|g| (g.group_id.clone(), g.clone())).collect();

    let policy = MatchPolicy {
        confirm_threshold: config.threshold,
        year_tolerance: config.year_tolerance,
    };
    let candidates = match_records(&input.locals, &input.externals, &policy);
    let tiers = classify(&input.locals, &input.externals, &candidates, config.threshold);

    let local_grades: BTreeMap<String, String> = input
        .groups
        .iter()
        .filter_map(|g| g.grade_label.clone().map(|label| (g.id.clone(), label)))
        .collect();
    let divergences = detect(
        &tiers,
        &input.locals,
        &input.externals,
        &grade_index,
        &local_grades,
        expectation(config.expect_external),
    );

    let tracked: BTreeSet<String> = config.dedup.tracked.keys().cloned().collect();
    let key_policy = config.dedup.identity_key;
    let dedup =
        plan_dedup(&input.locals, |record| identity_key(record, key_policy), &tracked);

    Ok(build_report(config, input, &tiers, divergences, grades, dedup))
}

fn expectation(policy: ExpectExternal) -> impl Fn(&StudentRecord) -> bool {
    move |record| match policy {
        ExpectExternal::All => true,
        ExpectExternal::Enrolled => record.group_ref.is_some(),
        ExpectExternal::None => false,
    }
}
