use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, missing snapshot, etc.).
    ConfigValidation(String),
    /// Missing required column in a snapshot file.
    MissingColumn { snapshot: String, column: String },
    /// Record id parse error.
    IdParse { snapshot: String, record: String, value: String },
    /// Dependent-count parse error.
    CountParse { snapshot: String, record: String, column: String, value: String },
    /// Malformed snapshot file (CSV shape, JSON syntax).
    SnapshotParse { snapshot: String, message: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { snapshot, column } => {
                write!(f, "snapshot '{snapshot}': missing column '{column}'")
            }
            Self::IdParse { snapshot, record, value } => {
                write!(f, "snapshot '{snapshot}', record '{record}': cannot parse id '{value}'")
            }
            Self::CountParse { snapshot, record, column, value } => {
                write!(
                    f,
                    "snapshot '{snapshot}', record '{record}': cannot parse count '{value}' in column '{column}'"
                )
            }
            Self::SnapshotParse { snapshot, message } => {
                write!(f, "snapshot '{snapshot}': {message}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
