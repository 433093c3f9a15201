use serde::{Deserialize, Serialize};

use super::{MovementDate, MovementId, SpecimenId};

/// Storage form of one ledger row.
///
/// The store keeps increment and decrement reasons as two nullable
/// columns; calculation code reads the row through [`MovementRecord::kind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub movement_id: MovementId,
    pub specimen_id: SpecimenId,
    pub date: MovementDate,
    /// Nominal quantity; this is what the counters use.
    pub quantity: i64,
    /// Actual head count, which may differ for grouped or uncountable specimens.
    pub quantity_actual: i64,
    pub increment_reason: Option<String>,
    pub decrement_reason: Option<String>,
    pub location_id: Option<i64>,
    pub contract_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub price: Option<f64>,
}

/// A ledger row classified by direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind<'a> {
    Increment { reason: &'a str, quantity: i64 },
    Decrement { reason: &'a str, quantity: i64 },
    /// No reason code at all: counts as evidence but moves no stock.
    Neutral { quantity: i64 },
}

impl MovementRecord {
    /// Classify the row.
    ///
    /// A row carrying both reason codes is malformed; the increment wins.
    #[must_use]
    pub fn kind(&self) -> MovementKind<'_> {
        match (
            non_blank(self.increment_reason.as_deref()),
            non_blank(self.decrement_reason.as_deref()),
        ) {
            (Some(reason), _) => MovementKind::Increment {
                reason,
                quantity: self.quantity,
            },
            (None, Some(reason)) => MovementKind::Decrement {
                reason,
                quantity: self.quantity,
            },
            (None, None) => MovementKind::Neutral {
                quantity: self.quantity,
            },
        }
    }

    #[must_use]
    pub fn is_dual_tagged(&self) -> bool {
        non_blank(self.increment_reason.as_deref()).is_some()
            && non_blank(self.decrement_reason.as_deref()).is_some()
    }

    #[must_use]
    pub fn is_increment(&self) -> bool {
        matches!(self.kind(), MovementKind::Increment { .. })
    }

    #[must_use]
    pub fn is_decrement(&self) -> bool {
        matches!(self.kind(), MovementKind::Decrement { .. })
    }
}

fn non_blank(reason: Option<&str>) -> Option<&str> {
    reason.filter(|r| !r.trim().is_empty())
}

/// Input for inserting or replacing a ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub specimen_id: SpecimenId,
    pub date: MovementDate,
    pub quantity: i64,
    pub quantity_actual: i64,
    pub increment_reason: Option<String>,
    pub decrement_reason: Option<String>,
    pub location_id: Option<i64>,
    pub contract_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub price: Option<f64>,
}

impl NewMovement {
    #[must_use]
    pub fn increment(
        specimen_id: SpecimenId,
        date: MovementDate,
        reason: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            increment_reason: Some(reason.into()),
            ..Self::bare(specimen_id, date, quantity)
        }
    }

    #[must_use]
    pub fn decrement(
        specimen_id: SpecimenId,
        date: MovementDate,
        reason: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            decrement_reason: Some(reason.into()),
            ..Self::bare(specimen_id, date, quantity)
        }
    }

    const fn bare(specimen_id: SpecimenId, date: MovementDate, quantity: i64) -> Self {
        Self {
            specimen_id,
            date,
            quantity,
            quantity_actual: quantity,
            increment_reason: None,
            decrement_reason: None,
            location_id: None,
            contract_id: None,
            partner_id: None,
            price: None,
        }
    }
}
