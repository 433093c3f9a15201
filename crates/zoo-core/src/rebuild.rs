//! Full aggregate rebuild from the ledger.
//!
//! Stored counters are a cache over the `movements` table. `rebuild_aggregates`
//! throws the cache away and derives it again: every counter is zeroed, the
//! ledger is streamed through [`SpecimenGroups`], each specimen snapshot is
//! written, and a single [`RollupUnit`] carries all chains.

use rusqlite::{Connection, params};
use std::time::{Duration, Instant};

use crate::calc;
use crate::config::ReasonRules;
use crate::db::taxa::{self, ChainCache};
use crate::error::{EngineError, Result};
use crate::model::{TaxonLevel, ZooStatus};
use crate::reconstruct::{SpecimenGroups, SqlitePager};
use crate::rollup::RollupUnit;

// ---------------------------------------------------------------------------
// RebuildReport
// ---------------------------------------------------------------------------

/// Report returned after a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Ledger rows replayed.
    pub event_count: usize,
    /// Specimens with at least one ledger row.
    pub specimen_count: usize,
    /// Aggregate rows written.
    pub taxa_touched: usize,
    /// Ledger pages fetched.
    pub pages_fetched: usize,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// rebuild_aggregates
// ---------------------------------------------------------------------------

/// Recompute every specimen and aggregate counter from the ledger.
///
/// Aggregate rows that already left `new` have their status recomputed even
/// when no specimen under them has ledger rows; rows still in `new` stay
/// there unless a rebuilt chain reaches them. Run inside
/// [`crate::db::write_transaction`].
///
/// # Errors
///
/// Returns [`EngineError::BrokenAncestorChain`] if any specimen's chain is
/// incomplete, or a store error.
pub fn rebuild_aggregates(
    conn: &Connection,
    rules: &ReasonRules,
    page_size: usize,
    actor: &str,
) -> Result<RebuildReport> {
    let start = Instant::now();

    reset_counters(conn)?;

    let mut unit = RollupUnit::new();
    for level in TaxonLevel::AGGREGATE_LEVELS {
        for aggregate in taxa::list_aggregates(conn, level)? {
            if aggregate.status != ZooStatus::New {
                unit.touch(level, aggregate.id);
            }
        }
    }

    let mut chains = ChainCache::new();
    let mut pager = SqlitePager::new(conn, None);
    let mut groups = SpecimenGroups::new(&mut pager, page_size, None);
    let mut specimen_count = 0;

    for group in groups.by_ref() {
        let group = group?;
        let specimen = taxa::get_specimen(conn, group.specimen_id)?
            .ok_or(EngineError::SpecimenNotFound(group.specimen_id))?;
        let snapshot = calc::calculate(&group.events, rules);
        taxa::write_specimen_snapshot(conn, specimen.specimen_id, snapshot, actor)?;

        let chain = chains
            .for_species(conn, specimen.species_id)
            .map_err(|err| match err {
                EngineError::BrokenAncestorChain { level, id, .. } => {
                    EngineError::BrokenAncestorChain {
                        level,
                        id,
                        from: format!("specimen {}", specimen.specimen_id),
                    }
                }
                other => other,
            })?;
        unit.add_chain(chain, snapshot);
        specimen_count += 1;
    }

    let event_count = groups.events_read();
    let pages_fetched = groups.pages_fetched();
    let outcome = unit.apply(conn, actor)?;

    conn.execute(
        "UPDATE engine_meta SET last_rebuild_at = ?1, last_rebuild_events = ?2 WHERE id = 1",
        params![
            crate::db::audit_timestamp(),
            i64::try_from(event_count).unwrap_or(i64::MAX)
        ],
    )?;

    let elapsed = start.elapsed();
    tracing::info!(
        event_count,
        specimen_count,
        taxa_touched = outcome.rows.len(),
        pages_fetched,
        elapsed_ms = elapsed.as_millis(),
        "aggregate rebuild complete"
    );

    Ok(RebuildReport {
        event_count,
        specimen_count,
        taxa_touched: outcome.rows.len(),
        pages_fetched,
        elapsed,
    })
}

/// Zero every counter. Specimens without ledger rows are absent and are
/// never reached by the replay, so their placement is cleared here.
fn reset_counters(conn: &Connection) -> Result<()> {
    const ZEROED: &str = "quantity_owned = 0, quantity_in_zoo = 0, \
                          quantity_deponated_from = 0, quantity_deponated_to = 0";
    conn.execute(&format!("UPDATE specimens SET {ZEROED}"), [])?;
    let unplaced = conn.execute(
        "UPDATE specimens SET location_id = NULL, organization_level_id = NULL
         WHERE specimen_id NOT IN (SELECT specimen_id FROM movements)
           AND (location_id IS NOT NULL OR organization_level_id IS NOT NULL)",
        [],
    )?;
    if unplaced > 0 {
        tracing::debug!(unplaced, "cleared placement of specimens without ledger rows");
    }
    for level in TaxonLevel::AGGREGATE_LEVELS {
        conn.execute(&format!("UPDATE {} SET {ZEROED}", level.table()), [])?;
    }
    Ok(())
}

/// Timestamp and event count of the last completed rebuild.
///
/// # Errors
///
/// Returns an error if `engine_meta` cannot be read.
pub fn last_rebuild(conn: &Connection) -> Result<Option<(String, usize)>> {
    let (at, events): (Option<String>, i64) = conn.query_row(
        "SELECT last_rebuild_at, last_rebuild_events FROM engine_meta WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(at.map(|at| (at, usize::try_from(events).unwrap_or(0))))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
