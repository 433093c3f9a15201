//! Specimen quantity calculator.
//!
//! A pure fold over one specimen's ledger rows, ordered by
//! `(date, movement_id)`, into a [`QuantitySnapshot`]. The same rows always
//! give the same snapshot; there is no state outside the arguments.
//!
//! Rules per row:
//!
//! - increment: `owned += q`, `in_zoo += q` capped at `owned`; a
//!   deponation-in reason also adds `q` to `deponated_from`
//! - decrement: `owned -= q` and `in_zoo -= q`, both floored at zero; a
//!   deponation-out reason also adds `q` to `deponated_to`
//! - neutral rows (no reason code) move nothing
//!
//! Quantities are not validated here. A negative quantity produces a
//! deterministic, visibly wrong snapshot rather than an error.

use crate::config::ReasonRules;
use crate::model::{MovementKind, MovementRecord, QuantitySnapshot};

/// Fold ordered ledger rows into a snapshot.
#[must_use]
pub fn calculate(events: &[MovementRecord], rules: &ReasonRules) -> QuantitySnapshot {
    events.iter().fold(QuantitySnapshot::ZERO, |snapshot, event| {
        apply_event(snapshot, event, rules)
    })
}

/// Apply a single row to a running snapshot.
#[must_use]
pub fn apply_event(
    mut snapshot: QuantitySnapshot,
    event: &MovementRecord,
    rules: &ReasonRules,
) -> QuantitySnapshot {
    match event.kind() {
        MovementKind::Increment { reason, quantity } => {
            snapshot.owned += quantity;
            snapshot.in_zoo = (snapshot.in_zoo + quantity).min(snapshot.owned);
            if rules.is_deponation_in(reason) {
                snapshot.deponated_from += quantity;
            }
        }
        MovementKind::Decrement { reason, quantity } => {
            snapshot.owned = (snapshot.owned - quantity).max(0);
            snapshot.in_zoo = (snapshot.in_zoo - quantity).max(0);
            if rules.is_deponation_out(reason) {
                snapshot.deponated_to += quantity;
            }
        }
        MovementKind::Neutral { .. } => {}
    }
    snapshot
}

/// First row carrying an increment reason (how the specimen arrived).
#[must_use]
pub fn first_increment(events: &[MovementRecord]) -> Option<&MovementRecord> {
    events.iter().find(|event| event.is_increment())
}

/// Last row carrying a decrement reason (how the specimen left).
#[must_use]
pub fn last_decrement(events: &[MovementRecord]) -> Option<&MovementRecord> {
    events.iter().rev().find(|event| event.is_decrement())
}
