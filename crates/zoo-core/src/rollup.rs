//! Hierarchical rollup maintainer.
//!
//! A [`RollupUnit`] collects net deltas for every aggregate row a mutation
//! touches and writes them in one pass at the end. Each written row has its
//! [`ZooStatus`] recomputed from its post-update counters, so a row leaves
//! `new` the first time any rollup reaches it.
//!
//! The unit must be applied on the same connection (or transaction) as the
//! ledger write that produced the delta.

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::model::status::calculate_zoo_status_from_quantities;
use crate::model::{AncestorChain, QuantitySnapshot, TaxonLevel, ZooStatus};

// ---------------------------------------------------------------------------
// RollupUnit
// ---------------------------------------------------------------------------

/// Pending aggregate deltas keyed by `(level, id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupUnit {
    deltas: BTreeMap<(TaxonLevel, i64), QuantitySnapshot>,
}

/// One aggregate row after a rollup was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupRow {
    pub level: TaxonLevel,
    pub id: i64,
    pub delta: QuantitySnapshot,
    pub quantities: QuantitySnapshot,
    pub status: ZooStatus,
}

/// Result of [`RollupUnit::apply`], in `(level, id)` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupOutcome {
    pub rows: Vec<RollupRow>,
}

impl RollupOutcome {
    /// The row written for `(level, id)`, if the rollup touched it.
    #[must_use]
    pub fn row(&self, level: TaxonLevel, id: i64) -> Option<&RollupRow> {
        self.rows
            .iter()
            .find(|row| row.level == level && row.id == id)
    }
}

impl RollupUnit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to every aggregate row on `chain`.
    pub fn add_chain(&mut self, chain: &AncestorChain, delta: QuantitySnapshot) {
        for key in chain.aggregate_links() {
            *self.deltas.entry(key).or_default() += delta;
        }
    }

    /// Subtract `delta` from every aggregate row on `chain`.
    pub fn subtract_chain(&mut self, chain: &AncestorChain, delta: QuantitySnapshot) {
        self.add_chain(chain, -delta);
    }

    /// Mark a row for status recomputation without changing its counters.
    pub fn touch(&mut self, level: TaxonLevel, id: i64) {
        if level.has_aggregate() {
            self.deltas.entry((level, id)).or_default();
        }
    }

    /// Net delta collected so far for one row.
    #[must_use]
    pub fn delta_for(&self, level: TaxonLevel, id: i64) -> Option<QuantitySnapshot> {
        self.deltas.get(&(level, id)).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Write every collected delta and recompute statuses.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BrokenAncestorChain`] if a touched row no
    /// longer exists. The caller's transaction must then be rolled back;
    /// rows written before the failure are not undone here.
    pub fn apply(self, conn: &Connection, actor: &str) -> Result<RollupOutcome> {
        let now = crate::db::audit_timestamp();
        let mut outcome = RollupOutcome {
            rows: Vec::with_capacity(self.deltas.len()),
        };

        for ((level, id), delta) in self.deltas {
            let quantities = add_to_row(conn, level, id, delta, actor, &now)?.ok_or_else(|| {
                EngineError::BrokenAncestorChain {
                    level,
                    id,
                    from: "rollup".to_string(),
                }
            })?;

            let status =
                calculate_zoo_status_from_quantities(quantities.in_zoo, quantities.deponated_to);
            let sql = format!(
                "UPDATE {} SET zoo_status = ?1 WHERE {} = ?2",
                level.table(),
                level.id_column()
            );
            conn.execute(&sql, params![status.as_str(), id])?;

            outcome.rows.push(RollupRow {
                level,
                id,
                delta,
                quantities,
                status,
            });
        }

        tracing::debug!(rows = outcome.rows.len(), "applied rollup");
        Ok(outcome)
    }
}

fn add_to_row(
    conn: &Connection,
    level: TaxonLevel,
    id: i64,
    delta: QuantitySnapshot,
    actor: &str,
    now: &str,
) -> Result<Option<QuantitySnapshot>> {
    let sql = format!(
        "UPDATE {} SET
            quantity_owned = quantity_owned + ?1,
            quantity_in_zoo = quantity_in_zoo + ?2,
            quantity_deponated_from = quantity_deponated_from + ?3,
            quantity_deponated_to = quantity_deponated_to + ?4,
            modified_by = ?5,
            modified_at = ?6
         WHERE {} = ?7
         RETURNING quantity_owned, quantity_in_zoo, quantity_deponated_from, quantity_deponated_to",
        level.table(),
        level.id_column()
    );
    Ok(conn
        .query_row(
            &sql,
            params![
                delta.owned,
                delta.in_zoo,
                delta.deponated_from,
                delta.deponated_to,
                actor,
                now,
                id
            ],
            |row| {
                Ok(QuantitySnapshot::new(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )
        .optional()?)
}

/// Push `new - old` up a specimen's chain in one unit of work.
///
/// Every aggregate row on the chain is written even when the delta is zero,
/// so its status reflects that a descendant now has ledger evidence.
///
/// # Errors
///
/// Returns [`EngineError::BrokenAncestorChain`] if a row on the chain is
/// missing.
pub fn apply_delta(
    conn: &Connection,
    chain: &AncestorChain,
    old: QuantitySnapshot,
    new: QuantitySnapshot,
    actor: &str,
) -> Result<RollupOutcome> {
    let mut unit = RollupUnit::new();
    unit.add_chain(chain, new - old);
    unit.apply(conn, actor)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
