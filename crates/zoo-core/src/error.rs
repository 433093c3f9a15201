use std::fmt;

use crate::model::taxon::{MoveSubject, TaxonLevel};

/// Machine-readable error codes for callers rendering actionable messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    InvalidDate,
    SpecimenNotFound,
    MovementNotFound,
    TaxonNotFound,
    InvalidMove,
    BrokenAncestorChain,
    AggregateDrift,
    ConcurrentModification,
    StoreFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidDate => "E1003",
            Self::SpecimenNotFound => "E2001",
            Self::MovementNotFound => "E2002",
            Self::TaxonNotFound => "E2003",
            Self::InvalidMove => "E2004",
            Self::BrokenAncestorChain => "E3001",
            Self::AggregateDrift => "E3002",
            Self::ConcurrentModification => "E5001",
            Self::StoreFailure => "E5002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Store not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidDate => "Invalid movement date",
            Self::SpecimenNotFound => "Specimen not found",
            Self::MovementNotFound => "Movement not found",
            Self::TaxonNotFound => "Taxon not found",
            Self::InvalidMove => "Hierarchy move rejected",
            Self::BrokenAncestorChain => "Broken taxonomic ancestor chain",
            Self::AggregateDrift => "Aggregate counters disagree with the ledger",
            Self::ConcurrentModification => "Concurrent modification",
            Self::StoreFailure => "Store failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `zoo init` to create the store."),
            Self::ConfigParseError => Some("Fix syntax in zoo.toml and retry."),
            Self::InvalidDate => Some("Dates use the yyyy/MM/dd format, e.g. 2021/03/07."),
            Self::SpecimenNotFound | Self::MovementNotFound | Self::TaxonNotFound => None,
            Self::InvalidMove => Some("Select siblings sharing one parent and a different target."),
            Self::BrokenAncestorChain => {
                Some("Repair the missing taxon row, then run `zoo rebuild`.")
            }
            Self::AggregateDrift => {
                Some("Run `zoo rebuild` to recompute counters from the ledger.")
            }
            Self::ConcurrentModification => Some("Retry the operation in a new transaction."),
            Self::StoreFailure => Some("Check the database file and disk space."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single reason a hierarchy move was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveViolation {
    /// No items were selected.
    EmptySelection,
    /// Some selected ids do not exist.
    NotFound { subject: MoveSubject, ids: Vec<i64> },
    /// The selected items do not share one parent. Lists every
    /// `(id, parent_id)` pair of the selection.
    MixedParents { parents: Vec<(i64, Option<i64>)> },
    /// The target parent does not exist.
    TargetNotFound { level: TaxonLevel, id: i64 },
    /// The target is the items' current parent.
    SameParent { id: i64 },
    /// The target sits at the wrong level for the moved items.
    WrongTargetLevel {
        moved: MoveSubject,
        expected: Option<TaxonLevel>,
        actual: TaxonLevel,
    },
}

impl fmt::Display for MoveViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySelection => f.write_str("no items selected"),
            Self::NotFound { subject, ids } => write!(f, "{subject} not found: {ids:?}"),
            Self::MixedParents { parents } => {
                write!(f, "selected items do not share a parent: {parents:?}")
            }
            Self::TargetNotFound { level, id } => write!(f, "target {level} {id} not found"),
            Self::SameParent { id } => write!(f, "items already belong to {id}"),
            Self::WrongTargetLevel {
                moved,
                expected: Some(expected),
                actual,
            } => write!(f, "a {moved} moves between {expected} rows, not {actual}"),
            Self::WrongTargetLevel {
                moved,
                expected: None,
                actual,
            } => write!(f, "a {moved} has no parent level (target was {actual})"),
        }
    }
}

/// Errors surfaced by engine operations.
///
/// Every variant aborts the enclosing transaction; nothing is retried here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store not initialized (schema version {found}, expected {expected})")]
    NotInitialized { found: u32, expected: u32 },

    #[error("invalid config: {0}")]
    ConfigParse(String),

    #[error("invalid date '{0}': expected yyyy/MM/dd")]
    InvalidDate(String),

    #[error("specimen {0} not found")]
    SpecimenNotFound(i64),

    #[error("movement {0} not found")]
    MovementNotFound(i64),

    #[error("{level} {id} not found")]
    TaxonNotFound { level: TaxonLevel, id: i64 },

    #[error("hierarchy move rejected: {}", join_violations(.0))]
    InvalidMove(Vec<MoveViolation>),

    #[error("broken ancestor chain: {level} {id} is missing (reached from {from})")]
    BrokenAncestorChain {
        level: TaxonLevel,
        id: i64,
        from: String,
    },

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("store error: {0}")]
    Store(#[source] rusqlite::Error),
}

impl EngineError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::ConfigParse(_) => ErrorCode::ConfigParseError,
            Self::InvalidDate(_) => ErrorCode::InvalidDate,
            Self::SpecimenNotFound(_) => ErrorCode::SpecimenNotFound,
            Self::MovementNotFound(_) => ErrorCode::MovementNotFound,
            Self::TaxonNotFound { .. } => ErrorCode::TaxonNotFound,
            Self::InvalidMove(_) => ErrorCode::InvalidMove,
            Self::BrokenAncestorChain { .. } => ErrorCode::BrokenAncestorChain,
            Self::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            Self::Store(_) => ErrorCode::StoreFailure,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref inner, _)
                if matches!(
                    inner.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::ConcurrentModification(err.to_string())
            }
            other => Self::Store(other),
        }
    }
}

fn join_violations(violations: &[MoveViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
