//! Duplicate-collapse planning. Pure: groups local records by an identity
//! key and emits a migration/deletion plan, never touching a database.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    DedupGroup, DedupPlan, GroupMember, Migration, SkippedGroup, StudentRecord,
};

/// Group locals by `key_fn` and plan the collapse of every group with two
/// or more members.
///
/// Records with an empty key land in `unkeyed` and are never grouped. A
/// group whose members hold dependent rows in a table outside
/// `tracked_tables` is excluded whole: without a migration target such a
/// deletion would orphan data.
pub fn plan_dedup<F>(
    locals: &[StudentRecord],
    key_fn: F,
    tracked_tables: &BTreeSet<String>,
) -> DedupPlan
where
    F: Fn(&StudentRecord) -> String,
{
    let mut by_key: BTreeMap<String, Vec<&StudentRecord>> = BTreeMap::new();
    let mut unkeyed = Vec::new();
    for record in locals {
        let key = key_fn(record);
        if key.is_empty() {
            unkeyed.push(record.id);
        } else {
            by_key.entry(key).or_default().push(record);
        }
    }
    unkeyed.sort_unstable();

    let mut groups = Vec::new();
    let mut skipped = Vec::new();
    for (key, members) in by_key {
        if members.len() < 2 {
            continue;
        }
        match plan_group(&key, members, tracked_tables) {
            Ok(group) => groups.push(group),
            Err(reason) => skipped.push(SkippedGroup { identity_key: key, reason }),
        }
    }

    DedupPlan { groups, skipped, unkeyed }
}

fn dependents_total(record: &StudentRecord) -> u32 {
    record.dependents.values().sum()
}

fn plan_group(
    key: &str,
    mut members: Vec<&StudentRecord>,
    tracked_tables: &BTreeSet<String>,
) -> Result<DedupGroup, String> {
    members.sort_by_key(|m| m.id);

    // Canonical: most dependent data, ties to the smallest (oldest) id.
    let mut canonical = members[0];
    for member in &members[1..] {
        let better = match dependents_total(member).cmp(&dependents_total(canonical)) {
            Ordering::Greater => true,
            Ordering::Equal => member.id < canonical.id,
            Ordering::Less => false,
        };
        if better {
            canonical = member;
        }
    }

    // Integrity check before any entries are emitted: dependent rows in an
    // untracked table have no migration target, so the whole group is off
    // the table.
    for member in &members {
        if member.id == canonical.id {
            continue;
        }
        for (table, &count) in &member.dependents {
            if count > 0 && !tracked_tables.contains(table) {
                return Err(format!(
                    "member {} has {count} dependent row(s) in untracked table '{table}'",
                    member.id
                ));
            }
        }
    }

    let mut migrations = Vec::new();
    let mut deletions = Vec::new();
    for member in &members {
        if member.id == canonical.id {
            continue;
        }
        for (table, &count) in &member.dependents {
            if count > 0 {
                migrations.push(Migration {
                    table: table.clone(),
                    from_id: member.id,
                    to_id: canonical.id,
                });
            }
        }
        deletions.push(member.id);
    }

    Ok(DedupGroup {
        identity_key: key.to_string(),
        members: members
            .iter()
            .map(|m| GroupMember {
                id: m.id,
                display_name: m.display_name.clone(),
                dependents_total: dependents_total(m),
            })
            .collect(),
        canonical_id: canonical.id,
        migrations,
        deletions,
    })
}
