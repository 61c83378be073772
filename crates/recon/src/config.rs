use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    /// Confirmed-tier threshold, strictly between 0 and 1.
    pub threshold: f64,
    /// Year ages are measured against (usually the school year).
    pub reference_year: i32,
    #[serde(default = "default_year_tolerance")]
    pub year_tolerance: i32,
    #[serde(default)]
    pub expect_external: ExpectExternal,
    /// Age signal -> grade label. TOML keys are strings; `grade_rule_table`
    /// yields the parsed form after validation.
    #[serde(default)]
    pub grade_rules: BTreeMap<String, String>,
    #[serde(default)]
    pub grade_inference: GradeInferenceConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    pub snapshots: SnapshotsConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_year_tolerance() -> i32 {
    1
}

// ---------------------------------------------------------------------------
// Expectation + inference knobs
// ---------------------------------------------------------------------------

/// Which locals are supposed to appear in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectExternal {
    /// Every local record.
    All,
    /// Only locals assigned to a group.
    Enrolled,
    /// Nobody; missing-external checks are off.
    None,
}

impl Default for ExpectExternal {
    fn default() -> Self {
        Self::Enrolled
    }
}

impl std::fmt::Display for ExpectExternal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Enrolled => write!(f, "enrolled"),
            Self::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    Highest,
    Lowest,
}

impl Default for TieBreak {
    fn default() -> Self {
        Self::Highest
    }
}

impl std::fmt::Display for TieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Highest => write!(f, "highest"),
            Self::Lowest => write!(f, "lowest"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeInferenceConfig {
    #[serde(default)]
    pub tie_break: TieBreak,
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKeyPolicy {
    Name,
    NameBirthYear,
}

impl Default for IdentityKeyPolicy {
    fn default() -> Self {
        Self::NameBirthYear
    }
}

impl std::fmt::Display for IdentityKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::NameBirthYear => write!(f, "name_birth_year"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DedupConfig {
    #[serde(default)]
    pub identity_key: IdentityKeyPolicy,
    /// Dependent table -> its student foreign-key column. The planner uses
    /// the table names; the apply step uses the columns.
    #[serde(default)]
    pub tracked: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SnapshotsConfig {
    pub local: LocalSnapshotConfig,
    pub registry: RegistrySnapshotConfig,
    #[serde(default)]
    pub groups: Option<GroupSnapshotConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalSnapshotConfig {
    pub file: String,
    pub columns: LocalColumns,
    /// Dependent table -> CSV column carrying that table's row count.
    #[serde(default)]
    pub dependents: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalColumns {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub group_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySnapshotConfig {
    /// `.json` files use the registry's canonical export keys; anything
    /// else is CSV and requires a column mapping.
    pub file: String,
    #[serde(default)]
    pub columns: Option<RegistryColumns>,
}

impl RegistrySnapshotConfig {
    pub fn is_json(&self) -> bool {
        self.file.ends_with(".json")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryColumns {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    pub group_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupSnapshotConfig {
    pub file: String,
    pub columns: GroupColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupColumns {
    pub id: String,
    pub grade_label: String,
}

// ---------------------------------------------------------------------------
// Store + Output
// ---------------------------------------------------------------------------

/// The live SQLite database the apply step mutates. Optional: runs that
/// only produce a report never open it.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub database: String,
    #[serde(default = "default_student_table")]
    pub student_table: String,
    #[serde(default = "default_student_id_column")]
    pub student_id_column: String,
}

fn default_student_table() -> String {
    "students".to_string()
}

fn default_student_id_column() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        // Exclusive on both ends: 0 would confirm anything, 1 nothing.
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "threshold must be strictly between 0 and 1, got {}",
                self.threshold
            )));
        }

        if !(1900..=2100).contains(&self.reference_year) {
            return Err(ReconError::ConfigValidation(format!(
                "reference_year must be within 1900..=2100, got {}",
                self.reference_year
            )));
        }

        if self.year_tolerance < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "year_tolerance must not be negative, got {}",
                self.year_tolerance
            )));
        }

        for (age, label) in &self.grade_rules {
            if age.trim().parse::<i32>().is_err() {
                return Err(ReconError::ConfigValidation(format!(
                    "grade_rules key '{age}' is not an integer age signal"
                )));
            }
            if label.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "grade_rules label for age {age} must not be empty"
                )));
            }
        }

        if !self.snapshots.registry.is_json() && self.snapshots.registry.columns.is_none() {
            return Err(ReconError::ConfigValidation(
                "snapshots.registry.columns is required for CSV registry files".into(),
            ));
        }

        for (table, column) in &self.dedup.tracked {
            if table.trim().is_empty() || column.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "dedup.tracked entries must map a table name to a column name".into(),
                ));
            }
        }

        if let Some(store) = &self.store {
            if store.database.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "store.database must not be empty".into(),
                ));
            }
            if store.student_table.trim().is_empty()
                || store.student_id_column.trim().is_empty()
            {
                return Err(ReconError::ConfigValidation(
                    "store.student_table and store.student_id_column must not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Grade rules with their age keys parsed. Only valid after `validate`.
    pub fn grade_rule_table(&self) -> BTreeMap<i32, String> {
        self.grade_rules
            .iter()
            .filter_map(|(age, label)| {
                age.trim().parse::<i32>().ok().map(|a| (a, label.clone()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "Spring Sync"
threshold = 0.85
reference_year = 2024

[grade_rules]
6 = "1st"
7 = "2nd"
8 = "3rd"
9 = "4th"

[dedup.tracked]
enrollments = "student_id"
documents = "student_id"

[snapshots.local]
file = "students.csv"

[snapshots.local.columns]
id = "id"
name = "full_name"
birth_date = "dob"
group_ref = "class"

[snapshots.local.dependents]
enrollments = "enrollment_count"
documents = "document_count"

[snapshots.registry]
file = "registry.json"
"#;

    #[test]
    fn parse_valid_config() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "Spring Sync");
        assert_eq!(config.threshold, 0.85);
        assert_eq!(config.reference_year, 2024);
        // Defaults
        assert_eq!(config.year_tolerance, 1);
        assert_eq!(config.expect_external, ExpectExternal::Enrolled);
        assert_eq!(config.grade_inference.tie_break, TieBreak::Highest);
        assert_eq!(config.dedup.identity_key, IdentityKeyPolicy::NameBirthYear);
        assert!(config.store.is_none());
        assert!(config.output.json.is_none());
        assert_eq!(config.dedup.tracked.len(), 2);
        assert_eq!(
            config.snapshots.local.dependents.get("enrollments").unwrap(),
            "enrollment_count"
        );
    }

    #[test]
    fn grade_rule_table_parses_keys() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        let rules = config.grade_rule_table();
        assert_eq!(rules.get(&6).map(String::as_str), Some("1st"));
        assert_eq!(rules.get(&9).map(String::as_str), Some("4th"));
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn parse_explicit_knobs() {
        let input = format!(
            r#"year_tolerance = 2
expect_external = "all"
{VALID}

[grade_inference]
tie_break = "lowest"

[dedup]
identity_key = "name"

[store]
database = "rollbook.sqlite"

[output]
json = "report.json"
"#
        );
        let config = ReconConfig::from_toml(&input).unwrap();
        assert_eq!(config.year_tolerance, 2);
        assert_eq!(config.expect_external, ExpectExternal::All);
        assert_eq!(config.grade_inference.tie_break, TieBreak::Lowest);
        assert_eq!(config.dedup.identity_key, IdentityKeyPolicy::Name);
        let store = config.store.unwrap();
        assert_eq!(store.database, "rollbook.sqlite");
        assert_eq!(store.student_table, "students");
        assert_eq!(store.student_id_column, "id");
        assert_eq!(config.output.json.as_deref(), Some("report.json"));
    }

    #[test]
    fn reject_threshold_bounds() {
        for bad in ["0.0", "1.0", "1.5", "-0.2"] {
            let input = VALID.replace("threshold = 0.85", &format!("threshold = {bad}"));
            let err = ReconConfig::from_toml(&input).unwrap_err();
            assert!(
                err.to_string().contains("strictly between"),
                "threshold {bad} accepted"
            );
        }
    }

    #[test]
    fn reject_non_integer_grade_rule_key() {
        let input = VALID.replace("6 = \"1st\"", "six = \"1st\"");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("'six'"));
    }

    #[test]
    fn reject_csv_registry_without_columns() {
        let input = VALID.replace("registry.json", "registry.csv");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("registry.columns"));
    }

    #[test]
    fn csv_registry_with_columns_is_fine() {
        let input = format!(
            r#"{}

[snapshots.registry.columns]
id = "external_id"
name = "student_name"
birth_date = "birth"
group_id = "class_code"
"#,
            VALID.replace("registry.json", "registry.csv")
        );
        let config = ReconConfig::from_toml(&input).unwrap();
        assert!(!config.snapshots.registry.is_json());
        assert_eq!(
            config.snapshots.registry.columns.unwrap().group_id,
            "class_code"
        );
    }

    #[test]
    fn reject_negative_year_tolerance() {
        let input = format!("year_tolerance = -1\n{VALID}");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("year_tolerance"));
    }

    #[test]
    fn reject_unknown_expectation() {
        let input = format!("expect_external = \"some\"\n{VALID}");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_out_of_range_reference_year() {
        let input = VALID.replace("reference_year = 2024", "reference_year = 24");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("reference_year"));
    }
}
