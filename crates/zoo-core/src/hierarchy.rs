//! Hierarchy moves: reparent specimens or sibling taxa and rebalance
//! aggregates on both ancestor chains.
//!
//! A move sums the counters of everything it relocates, subtracts that sum
//! along the old parent's chain and adds it along the new parent's chain,
//! all the way to the root. The reparenting and every aggregate write
//! happen on the caller's connection; run the call inside
//! [`crate::db::write_transaction`] so a failure leaves nothing behind.

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::db::taxa::{self, placeholders};
use crate::error::{EngineError, MoveViolation, Result};
use crate::model::{MoveSubject, QuantitySnapshot, SpecimenId, TaxonLevel};
use crate::rollup::{RollupOutcome, RollupUnit};

/// A taxon row addressed by level and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaxonRef {
    pub level: TaxonLevel,
    pub id: i64,
}

impl TaxonRef {
    #[must_use]
    pub const fn new(level: TaxonLevel, id: i64) -> Self {
        Self { level, id }
    }
}

/// Outcome of a committed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub subject: MoveSubject,
    pub moved_ids: Vec<i64>,
    /// Shared parent before the move (`None` for a class without phylum).
    pub from: Option<i64>,
    pub to: TaxonRef,
    pub moved_sum: QuantitySnapshot,
    pub rollup: RollupOutcome,
}

/// Move specimens to another species.
///
/// # Errors
///
/// Returns [`EngineError::InvalidMove`] listing every violated
/// precondition, or [`EngineError::BrokenAncestorChain`].
pub fn move_specimens(
    conn: &Connection,
    specimen_ids: &[SpecimenId],
    target: TaxonRef,
    actor: &str,
) -> Result<MoveReport> {
    move_subject(conn, MoveSubject::Specimen, specimen_ids, target, actor)
}

/// Move sibling taxa of `level` to another parent one level up.
///
/// # Errors
///
/// Returns [`EngineError::InvalidMove`] listing every violated
/// precondition, or [`EngineError::BrokenAncestorChain`].
pub fn move_taxa(
    conn: &Connection,
    level: TaxonLevel,
    ids: &[i64],
    target: TaxonRef,
    actor: &str,
) -> Result<MoveReport> {
    move_subject(conn, MoveSubject::Taxon(level), ids, target, actor)
}

fn move_subject(
    conn: &Connection,
    subject: MoveSubject,
    ids: &[i64],
    target: TaxonRef,
    actor: &str,
) -> Result<MoveReport> {
    let ids: Vec<i64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let from = validate(conn, subject, &ids, target)?;

    let moved_sum = moved_sum(conn, subject, &ids)?;
    let mut unit = RollupUnit::new();
    if let Some(old_parent) = from {
        let old_chain = taxa::chain_from(conn, target.level, old_parent)?;
        unit.subtract_chain(&old_chain, moved_sum);
    }
    let new_chain = taxa::chain_from(conn, target.level, target.id)?;
    unit.add_chain(&new_chain, moved_sum);

    reparent(conn, subject, &ids, target.id, actor)?;
    let rollup = unit.apply(conn, actor)?;

    tracing::info!(
        %subject,
        count = ids.len(),
        from = ?from,
        to = target.id,
        owned = moved_sum.owned,
        in_zoo = moved_sum.in_zoo,
        "hierarchy move applied"
    );

    Ok(MoveReport {
        subject,
        moved_ids: ids,
        from,
        to: target,
        moved_sum,
        rollup,
    })
}

/// Check every precondition and return the shared current parent.
fn validate(
    conn: &Connection,
    subject: MoveSubject,
    ids: &[i64],
    target: TaxonRef,
) -> Result<Option<i64>> {
    let mut violations = Vec::new();

    if ids.is_empty() {
        violations.push(MoveViolation::EmptySelection);
    }

    let expected = subject.parent_level();
    if expected != Some(target.level) {
        violations.push(MoveViolation::WrongTargetLevel {
            moved: subject,
            expected,
            actual: target.level,
        });
    }

    if !taxa::taxon_exists(conn, target.level, target.id)? {
        violations.push(MoveViolation::TargetNotFound {
            level: target.level,
            id: target.id,
        });
    }

    let mut shared_parent = None;
    if let Some(parent_column) = subject.parent_column() {
        let parents =
            taxa::parents_for(conn, subject.table(), subject.id_column(), parent_column, ids)?;

        let missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !parents.contains_key(id))
            .collect();
        if !missing.is_empty() {
            violations.push(MoveViolation::NotFound {
                subject,
                ids: missing,
            });
        }

        let distinct: BTreeSet<Option<i64>> = parents.values().copied().collect();
        if distinct.len() > 1 {
            let mut listed: Vec<(i64, Option<i64>)> = parents.into_iter().collect();
            listed.sort_unstable();
            violations.push(MoveViolation::MixedParents { parents: listed });
        } else if let Some(&parent) = distinct.iter().next() {
            if parent == Some(target.id) && expected == Some(target.level) {
                violations.push(MoveViolation::SameParent { id: target.id });
            }
            shared_parent = parent;
        }
    }

    if violations.is_empty() {
        Ok(shared_parent)
    } else {
        tracing::debug!(%subject, violations = violations.len(), "hierarchy move rejected");
        Err(EngineError::InvalidMove(violations))
    }
}

/// Sum of the four counters over the moved rows. Species carry no counters,
/// so a species move sums the specimens under them.
fn moved_sum(conn: &Connection, subject: MoveSubject, ids: &[i64]) -> Result<QuantitySnapshot> {
    let (table, key) = match subject {
        MoveSubject::Taxon(TaxonLevel::Species) => ("specimens", "species_id"),
        other => (other.table(), other.id_column()),
    };
    let sql = format!(
        "SELECT COALESCE(SUM(quantity_owned), 0), COALESCE(SUM(quantity_in_zoo), 0), \
                COALESCE(SUM(quantity_deponated_from), 0), COALESCE(SUM(quantity_deponated_to), 0) \
         FROM {table} WHERE {key} IN ({})",
        placeholders(ids.len())
    );
    Ok(conn.query_row(&sql, params_from_iter(ids.iter()), |row| {
        Ok(QuantitySnapshot::new(
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
        ))
    })?)
}

fn reparent(
    conn: &Connection,
    subject: MoveSubject,
    ids: &[i64],
    parent_id: i64,
    actor: &str,
) -> Result<()> {
    let Some(parent_column) = subject.parent_column() else {
        return Ok(());
    };
    let sql = format!(
        "UPDATE {} SET {parent_column} = ?, modified_by = ?, modified_at = ? WHERE {} IN ({})",
        subject.table(),
        subject.id_column(),
        placeholders(ids.len())
    );
    let mut values = vec![
        Value::Integer(parent_id),
        Value::Text(actor.to_string()),
        Value::Text(crate::db::audit_timestamp()),
    ];
    values.extend(ids.iter().copied().map(Value::Integer));
    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(())
}
