//! `rollbook apply` — execute a report's dedup plan against the live
//! SQLite store. Backups go first, each group runs in its own
//! transaction, and one group's failure never blocks the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use rollbook_recon::config::StoreConfig;
use rollbook_recon::model::{DedupGroup, DedupPlan};
use rollbook_recon::ReconConfig;

use crate::exit_codes::EXIT_APPLY_INCOMPLETE;
use crate::CliError;

/// The slice of a report `apply` consumes; everything else in the file
/// is ignored.
#[derive(serde::Deserialize)]
struct ReportPlan {
    dedup: DedupPlan,
}

pub fn cmd_apply(
    config_path: PathBuf,
    report_path: PathBuf,
    dry_run: bool,
) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| CliError::runtime(format!("cannot read config: {e}")))?;
    let config = ReconConfig::from_toml(&config_str).map_err(CliError::recon)?;

    let Some(store) = config.store.as_ref() else {
        return Err(CliError::invalid_config("config has no [store] section")
            .with_hint("apply needs database, student_table and student_id_column"));
    };

    let report_str = std::fs::read_to_string(&report_path)
        .map_err(|e| CliError::runtime(format!("cannot read report: {e}")))?;
    let plan: ReportPlan = serde_json::from_str(&report_str).map_err(|e| {
        CliError::runtime(format!("cannot parse report: {e}"))
            .with_hint("pass the JSON written by `rollbook run --output`")
    })?;
    let plan = plan.dedup;

    check_identifiers(store, &config.dedup.tracked)?;
    check_plan(&plan, &config.dedup.tracked)?;

    if dry_run {
        for group in &plan.groups {
            eprintln!(
                "dry-run: group '{}' — {} migration(s), {} deletion(s), canonical {}",
                group.identity_key,
                group.migrations.len(),
                group.deletions.len(),
                group.canonical_id,
            );
        }
        let migrations: usize = plan.groups.iter().map(|g| g.migrations.len()).sum();
        let deletions: usize = plan.groups.iter().map(|g| g.deletions.len()).sum();
        eprintln!(
            "dry-run: {} group(s), {} migration(s), {} deletion(s); store untouched",
            plan.groups.len(),
            migrations,
            deletions,
        );
        if !plan.skipped.is_empty() {
            eprintln!("{} group(s) already skipped by the planner", plan.skipped.len());
        }
        return Ok(());
    }

    let db_path = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&store.database);
    let conn = Connection::open(&db_path)
        .map_err(|e| CliError::runtime(format!("cannot open {}: {e}", db_path.display())))?;

    let mut applied = 0usize;
    let mut migrated = 0usize;
    let mut deleted = 0usize;
    let mut failures: Vec<(String, String)> = Vec::new();

    for group in &plan.groups {
        match apply_group(&conn, store, &config.dedup.tracked, group) {
            Ok(outcome) => {
                applied += 1;
                migrated += outcome.migrated;
                deleted += outcome.deleted;
                eprintln!(
                    "  group '{}': {} row(s) migrated, {} record(s) deleted",
                    group.identity_key, outcome.migrated, outcome.deleted,
                );
            }
            Err(reason) => {
                eprintln!(
                    "  group '{}': failed — {} (rolled back)",
                    group.identity_key, reason,
                );
                failures.push((group.identity_key.clone(), reason));
            }
        }
    }

    eprintln!(
        "applied {} of {} group(s): {} row(s) migrated, {} record(s) deleted",
        applied,
        plan.groups.len(),
        migrated,
        deleted,
    );

    if !failures.is_empty() {
        return Err(CliError {
            code: EXIT_APPLY_INCOMPLETE,
            message: format!("{} group(s) not applied", failures.len()),
            hint: None,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pre-flight checks
// ---------------------------------------------------------------------------

/// Table and column names are interpolated into SQL; only plain
/// identifiers pass.
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifiers(
    store: &StoreConfig,
    tracked: &BTreeMap<String, String>,
) -> Result<(), CliError> {
    let mut names: Vec<&str> = vec![&store.student_table, &store.student_id_column];
    for (table, column) in tracked {
        names.push(table);
        names.push(column);
    }
    for name in names {
        if !is_sql_identifier(name) {
            return Err(CliError::invalid_config(format!(
                "'{name}' is not a plain SQL identifier"
            )));
        }
    }
    Ok(())
}

/// Reject plans that disagree with the config or with themselves before
/// any SQL runs.
fn check_plan(plan: &DedupPlan, tracked: &BTreeMap<String, String>) -> Result<(), CliError> {
    for group in &plan.groups {
        for migration in &group.migrations {
            if !tracked.contains_key(&migration.table) {
                return Err(CliError::usage(format!(
                    "report migrates table '{}' which the config does not track",
                    migration.table
                ))
                .with_hint("was this report produced with a different config?"));
            }
            if migration.to_id != group.canonical_id
                || !group.deletions.contains(&migration.from_id)
            {
                return Err(CliError::general(format!(
                    "report plan is inconsistent in group '{}'",
                    group.identity_key
                )));
            }
        }
        if group.deletions.contains(&group.canonical_id) {
            return Err(CliError::general(format!(
                "report plan deletes its own canonical record in group '{}'",
                group.identity_key
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-group execution
// ---------------------------------------------------------------------------

struct GroupOutcome {
    migrated: usize,
    deleted: usize,
}

fn apply_group(
    conn: &Connection,
    store: &StoreConfig,
    tracked: &BTreeMap<String, String>,
    group: &DedupGroup,
) -> Result<GroupOutcome, String> {
    conn.execute("BEGIN TRANSACTION", []).map_err(|e| e.to_string())?;
    match apply_group_inner(conn, store, tracked, group) {
        Ok(outcome) => {
            conn.execute("COMMIT", []).map_err(|e| e.to_string())?;
            Ok(outcome)
        }
        Err(reason) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(reason)
        }
    }
}

fn apply_group_inner(
    conn: &Connection,
    store: &StoreConfig,
    tracked: &BTreeMap<String, String>,
    group: &DedupGroup,
) -> Result<GroupOutcome, String> {
    // Copy every row this group will touch into <table>_recon_backup
    // before mutating anything. Backups accumulate across runs.
    for migration in &group.migrations {
        let fk = &tracked[&migration.table];
        ensure_backup_table(conn, &migration.table)?;
        conn.execute(
            &format!(
                "INSERT INTO \"{0}_recon_backup\" SELECT * FROM \"{0}\" WHERE \"{1}\" = ?1",
                migration.table, fk
            ),
            params![migration.from_id],
        )
        .map_err(|e| e.to_string())?;
    }
    ensure_backup_table(conn, &store.student_table)?;
    for id in &group.deletions {
        conn.execute(
            &format!(
                "INSERT INTO \"{0}_recon_backup\" SELECT * FROM \"{0}\" WHERE \"{1}\" = ?1",
                store.student_table, store.student_id_column
            ),
            params![id],
        )
        .map_err(|e| e.to_string())?;
    }

    // Migrations strictly before deletions.
    let mut migrated = 0;
    for migration in &group.migrations {
        let fk = &tracked[&migration.table];
        migrated += conn
            .execute(
                &format!(
                    "UPDATE \"{0}\" SET \"{1}\" = ?1 WHERE \"{1}\" = ?2",
                    migration.table, fk
                ),
                params![migration.to_id, migration.from_id],
            )
            .map_err(|e| e.to_string())?;
    }

    let mut deleted = 0;
    for id in &group.deletions {
        deleted += conn
            .execute(
                &format!(
                    "DELETE FROM \"{0}\" WHERE \"{1}\" = ?1",
                    store.student_table, store.student_id_column
                ),
                params![id],
            )
            .map_err(|e| e.to_string())?;
    }

    Ok(GroupOutcome { migrated, deleted })
}

fn ensure_backup_table(conn: &Connection, table: &str) -> Result<(), String> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS \"{0}_recon_backup\" AS SELECT * FROM \"{0}\" WHERE 0",
            table
        ),
        [],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
