//! Snapshot loading. CSV for the local ledger (and optional class list),
//! CSV or JSON for the registry export.
//!
//! Shape problems (missing columns, unreadable ids) abort the load; value
//! problems (a garbled birth date, an empty cell) degrade to `None` and
//! are handled downstream.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::{
    GroupSnapshotConfig, LocalSnapshotConfig, ReconConfig, RegistryColumns,
};
use crate::error::ReconError;
use crate::model::{LocalGroup, ReconInput, RegistryRecord, StudentRecord};

/// Read every snapshot the config names, resolving paths against
/// `base_dir` (conventionally the config file's directory).
pub fn load_input(config: &ReconConfig, base_dir: &Path) -> Result<ReconInput, ReconError> {
    let read = |file: &str| -> Result<String, ReconError> {
        let path = base_dir.join(file);
        std::fs::read_to_string(&path)
            .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))
    };

    let locals = load_local_csv(&read(&config.snapshots.local.file)?, &config.snapshots.local)?;

    let registry = &config.snapshots.registry;
    let raw = read(&registry.file)?;
    let externals = if registry.is_json() {
        load_registry_json(&raw)?
    } else {
        let columns = registry.columns.as_ref().ok_or_else(|| {
            ReconError::ConfigValidation(
                "snapshots.registry.columns is required for CSV registry files".into(),
            )
        })?;
        load_registry_csv(&raw, columns)?
    };

    let groups = match &config.snapshots.groups {
        Some(group_config) => load_groups_csv(&read(&group_config.file)?, group_config)?,
        None => Vec::new(),
    };

    Ok(ReconInput { locals, externals, groups })
}

/// Load the local ledger snapshot, including dependent-row counts.
pub fn load_local_csv(
    csv_data: &str,
    config: &LocalSnapshotConfig,
) -> Result<Vec<StudentRecord>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::SnapshotParse {
            snapshot: "local".into(),
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |name: &str| -> Result<usize, ReconError> {
        headers.iter().position(|h| h == name).ok_or_else(|| ReconError::MissingColumn {
            snapshot: "local".into(),
            column: name.into(),
        })
    };

    let col = &config.columns;
    let id_idx = idx(&col.id)?;
    let name_idx = idx(&col.name)?;
    let birth_idx = match &col.birth_date {
        Some(column) => Some(idx(column)?),
        None => None,
    };
    let group_idx = match &col.group_ref {
        Some(column) => Some(idx(column)?),
        None => None,
    };
    let dependent_idxs: Vec<(String, String, usize)> = config
        .dependents
        .iter()
        .map(|(table, column)| Ok((table.clone(), column.clone(), idx(column)?)))
        .collect::<Result<_, ReconError>>()?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::SnapshotParse {
            snapshot: "local".into(),
            message: e.to_string(),
        })?;

        let display_name = record.get(name_idx).unwrap_or("").trim().to_string();

        let id_raw = record.get(id_idx).unwrap_or("").trim();
        let id: i64 = id_raw.parse().map_err(|_| ReconError::IdParse {
            snapshot: "local".into(),
            record: display_name.clone(),
            value: id_raw.into(),
        })?;

        let mut dependents = BTreeMap::new();
        for (table, column, i) in &dependent_idxs {
            let raw = record.get(*i).unwrap_or("").trim();
            if raw.is_empty() {
                dependents.insert(table.clone(), 0);
                continue;
            }
            let count: u32 = raw.parse().map_err(|_| ReconError::CountParse {
                snapshot: "local".into(),
                record: display_name.clone(),
                column: column.clone(),
                value: raw.into(),
            })?;
            dependents.insert(table.clone(), count);
        }

        records.push(StudentRecord {
            id,
            display_name,
            birth_date: field(&record, birth_idx),
            group_ref: field(&record, group_idx),
            dependents,
        });
    }

    Ok(records)
}

/// Load a registry export in CSV form through its column mapping.
pub fn load_registry_csv(
    csv_data: &str,
    columns: &RegistryColumns,
) -> Result<Vec<RegistryRecord>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::SnapshotParse {
            snapshot: "registry".into(),
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |name: &str| -> Result<usize, ReconError> {
        headers.iter().position(|h| h == name).ok_or_else(|| ReconError::MissingColumn {
            snapshot: "registry".into(),
            column: name.into(),
        })
    };

    let id_idx = idx(&columns.id)?;
    let name_idx = idx(&columns.name)?;
    let birth_idx = match &columns.birth_date {
        Some(column) => Some(idx(column)?),
        None => None,
    };
    let group_idx = idx(&columns.group_id)?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::SnapshotParse {
            snapshot: "registry".into(),
            message: e.to_string(),
        })?;

        let display_name = record.get(name_idx).unwrap_or("").trim().to_string();
        let id = record.get(id_idx).unwrap_or("").trim().to_string();
        if id.is_empty() {
            return Err(ReconError::IdParse {
                snapshot: "registry".into(),
                record: display_name,
                value: String::new(),
            });
        }

        records.push(RegistryRecord {
            id,
            display_name,
            birth_date: field(&record, birth_idx),
            group_id: record.get(group_idx).unwrap_or("").trim().to_string(),
        });
    }

    Ok(records)
}

/// The registry's native JSON export: an array of objects with canonical
/// keys (`id`, `name`, `birth_date`, `group_id`).
pub fn load_registry_json(json_data: &str) -> Result<Vec<RegistryRecord>, ReconError> {
    #[derive(Deserialize)]
    struct RegistryRow {
        id: String,
        name: String,
        #[serde(default)]
        birth_date: Option<String>,
        group_id: String,
    }

    let rows: Vec<RegistryRow> =
        serde_json::from_str(json_data).map_err(|e| ReconError::SnapshotParse {
            snapshot: "registry".into(),
            message: e.to_string(),
        })?;

    Ok(rows
        .into_iter()
        .map(|row| RegistryRecord {
            id: row.id,
            display_name: row.name,
            birth_date: row.birth_date.filter(|s| !s.trim().is_empty()),
            group_id: row.group_id,
        })
        .collect())
}

/// Load the optional class list mapping group refs to recorded labels.
pub fn load_groups_csv(
    csv_data: &str,
    config: &GroupSnapshotConfig,
) -> Result<Vec<LocalGroup>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::SnapshotParse {
            snapshot: "groups".into(),
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |name: &str| -> Result<usize, ReconError> {
        headers.iter().position(|h| h == name).ok_or_else(|| ReconError::MissingColumn {
            snapshot: "groups".into(),
            column: name.into(),
        })
    };

    let id_idx = idx(&config.columns.id)?;
    let label_idx = idx(&config.columns.grade_label)?;

    let mut groups = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::SnapshotParse {
            snapshot: "groups".into(),
            message: e.to_string(),
        })?;
        groups.push(LocalGroup {
            id: record.get(id_idx).unwrap_or("").trim().to_string(),
            grade_label: field(&record, Some(label_idx)),
        });
    }

    Ok(groups)
}

fn field(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
