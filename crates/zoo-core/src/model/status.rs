use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Derived presence classification of a taxon.
///
/// Never set independently: every write recomputes it with
/// [`calculate_zoo_status_from_quantities`]. `New` only survives until the
/// row first receives a rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZooStatus {
    New,
    Present,
    Deponated,
    NoEvidence,
}

impl ZooStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Present => "present",
            Self::Deponated => "deponated",
            Self::NoEvidence => "no_evidence",
        }
    }
}

/// Map a taxon's present and deponated-out counts to its status.
#[must_use]
pub const fn calculate_zoo_status_from_quantities(
    quantity_in_zoo: i64,
    quantity_deponated_to: i64,
) -> ZooStatus {
    if quantity_in_zoo > 0 {
        ZooStatus::Present
    } else if quantity_deponated_to > 0 {
        ZooStatus::Deponated
    } else {
        ZooStatus::NoEvidence
    }
}

impl fmt::Display for ZooStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZooStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "present" => Ok(Self::Present),
            "deponated" => Ok(Self::Deponated),
            "no_evidence" => Ok(Self::NoEvidence),
            other => Err(format!("unknown zoo status '{other}'")),
        }
    }
}
