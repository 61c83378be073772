//! `rollbook run` / `rollbook validate` — config-driven reconciliation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rollbook_recon::model::{DivergenceKind, MatchTier, ReconReport};
use rollbook_recon::{snapshot, ReconConfig};

use crate::exit_codes::{EXIT_DIVERGENCES, EXIT_REVIEW_PENDING, EXIT_SUCCESS};
use crate::CliError;

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    mapping_csv: Option<PathBuf>,
) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| CliError::runtime(format!("cannot read config: {e}")))?;
    let config = ReconConfig::from_toml(&config_str).map_err(CliError::recon)?;

    // Snapshot paths resolve relative to the config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let input = snapshot::load_input(&config, base_dir).map_err(CliError::recon)?;

    let report = rollbook_recon::run(&config, &input).map_err(CliError::recon)?;

    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;

    // --output wins over [output] in the config; the config's path is
    // relative to the config file like everything else.
    let output_target = output_file
        .or_else(|| config.output.json.as_ref().map(|name| base_dir.join(name)));
    if let Some(ref path) = output_target {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::runtime(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref path) = mapping_csv {
        write_mapping_csv(path, &report)?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &report.summary;
    eprintln!(
        "recon '{}': {} local(s) vs {} external(s) — {} confirmed, {} review, {}+{} unmatched",
        report.meta.config_name,
        s.locals,
        s.externals,
        s.confirmed,
        s.review,
        s.unmatched_locals,
        s.unmatched_externals,
    );
    if s.divergences > 0 {
        let counts = s
            .divergence_counts
            .iter()
            .map(|(kind, n)| format!("{kind}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        eprintln!("divergences: {} ({counts})", s.divergences);
    }
    if s.dedup_groups > 0 || s.skipped_groups > 0 {
        eprintln!(
            "dedup: {} group(s) planned, {} skipped, {} deletion(s)",
            s.dedup_groups, s.skipped_groups, s.planned_deletions,
        );
    }

    match run_exit_code(&report) {
        EXIT_SUCCESS => Ok(()),
        EXIT_REVIEW_PENDING => Err(CliError {
            code: EXIT_REVIEW_PENDING,
            message: format!("{} review-tier pair(s) pending adjudication", s.review),
            hint: None,
        }),
        code => Err(CliError { code, message: "divergences found".into(), hint: None }),
    }
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| CliError::runtime(format!("cannot read config: {e}")))?;
    let config = ReconConfig::from_toml(&config_str).map_err(CliError::recon)?;
    eprintln!(
        "valid: recon '{}' — threshold {}, {} grade rule(s), {} tracked table(s)",
        config.name,
        config.threshold,
        config.grade_rules.len(),
        config.dedup.tracked.len(),
    );
    Ok(())
}

/// Review findings are advisory; everything else is actionable. A run
/// exits 3 only when some divergence cannot be explained by a pending
/// review pair.
fn run_exit_code(report: &ReconReport) -> u8 {
    if report.summary.divergences == 0 {
        return EXIT_SUCCESS;
    }

    let review_locals: BTreeSet<i64> = report
        .mapping
        .iter()
        .filter(|row| row.tier == MatchTier::Review)
        .map(|row| row.local_id)
        .collect();
    let review_externals: BTreeSet<&str> = report
        .mapping
        .iter()
        .filter(|row| row.tier == MatchTier::Review)
        .filter_map(|row| row.external_id.as_deref())
        .collect();

    let actionable = report.divergences.iter().any(|d| match d.kind {
        DivergenceKind::GradeMismatch => true,
        DivergenceKind::NameOnlyReview => false,
        DivergenceKind::MissingLocal => d
            .external_id
            .as_deref()
            .map_or(true, |id| !review_externals.contains(id)),
        DivergenceKind::MissingExternal => {
            d.local_id.map_or(true, |id| !review_locals.contains(&id))
        }
    });

    if actionable {
        EXIT_DIVERGENCES
    } else {
        EXIT_REVIEW_PENDING
    }
}

fn write_mapping_csv(path: &Path, report: &ReconReport) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| CliError::runtime(format!("cannot write {}: {e}", path.display())))?;
    writer
        .write_record(["local_id", "external_id", "score", "tier"])
        .map_err(|e| CliError::runtime(e.to_string()))?;
    for row in &report.mapping {
        writer
            .write_record([
                row.local_id.to_string(),
                row.external_id.clone().unwrap_or_default(),
                format!("{:.4}", row.score),
                row.tier.to_string(),
            ])
            .map_err(|e| CliError::runtime(e.to_string()))?;
    }
    writer.flush().map_err(|e| CliError::runtime(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
