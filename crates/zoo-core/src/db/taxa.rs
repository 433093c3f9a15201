//! Taxonomy and specimen rows: creation, lookups, ancestor chains, and the
//! specimen snapshot write.
//!
//! Level tables share one column layout, so SQL here is assembled from the
//! static table/column names on [`TaxonLevel`]; no caller input reaches the
//! SQL text.

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::model::{
    AncestorChain, QuantitySnapshot, Specimen, SpecimenId, TaxonAggregate, TaxonLevel, ZooStatus,
};

const COUNTER_COLUMNS: &str =
    "quantity_owned, quantity_in_zoo, quantity_deponated_from, quantity_deponated_to";

/// Create a taxon row. Aggregate levels start zeroed in [`ZooStatus::New`].
///
/// # Errors
///
/// Returns [`EngineError::TaxonNotFound`] if the parent does not exist or a
/// required parent is missing.
pub fn create_taxon(
    conn: &Connection,
    level: TaxonLevel,
    name: &str,
    parent_id: Option<i64>,
    actor: &str,
) -> Result<i64> {
    match (level.parent(), parent_id) {
        (Some(parent_level), Some(parent)) => {
            if !taxon_exists(conn, parent_level, parent)? {
                return Err(EngineError::TaxonNotFound {
                    level: parent_level,
                    id: parent,
                });
            }
        }
        (Some(parent_level), None) if !level.parent_optional() => {
            return Err(EngineError::TaxonNotFound {
                level: parent_level,
                id: 0,
            });
        }
        _ => {}
    }

    let now = super::audit_timestamp();
    match level.parent_column() {
        Some(parent_column) => {
            let sql = format!(
                "INSERT INTO {} (name, {parent_column}, modified_by, modified_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                level.table()
            );
            conn.execute(&sql, params![name, parent_id, actor, now])?;
        }
        None => {
            let sql = format!(
                "INSERT INTO {} (name, modified_by, modified_at) VALUES (?1, ?2, ?3)",
                level.table()
            );
            conn.execute(&sql, params![name, actor, now])?;
        }
    }

    let id = conn.last_insert_rowid();
    tracing::debug!(%level, id, name, "created taxon");
    Ok(id)
}

/// Create a specimen with zero counters under `species_id`.
///
/// # Errors
///
/// Returns [`EngineError::TaxonNotFound`] if the species does not exist.
pub fn create_specimen(
    conn: &Connection,
    species_id: i64,
    location_id: Option<i64>,
    actor: &str,
) -> Result<SpecimenId> {
    if !taxon_exists(conn, TaxonLevel::Species, species_id)? {
        return Err(EngineError::TaxonNotFound {
            level: TaxonLevel::Species,
            id: species_id,
        });
    }
    conn.execute(
        "INSERT INTO specimens (species_id, location_id, modified_by, modified_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![species_id, location_id, actor, super::audit_timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Set a specimen's placement. Used by callers that move an animal between
/// enclosures without a ledger event.
///
/// # Errors
///
/// Returns [`EngineError::SpecimenNotFound`] if the specimen does not exist.
pub fn set_specimen_placement(
    conn: &Connection,
    specimen_id: SpecimenId,
    location_id: Option<i64>,
    organization_level_id: Option<i64>,
    actor: &str,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE specimens SET location_id = ?1, organization_level_id = ?2, \
         modified_by = ?3, modified_at = ?4 WHERE specimen_id = ?5",
        params![
            location_id,
            organization_level_id,
            actor,
            super::audit_timestamp(),
            specimen_id
        ],
    )?;
    if changed == 0 {
        return Err(EngineError::SpecimenNotFound(specimen_id));
    }
    Ok(())
}

/// Whether a row exists at `level`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn taxon_exists(conn: &Connection, level: TaxonLevel, id: i64) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
        level.table(),
        level.id_column()
    );
    Ok(conn.query_row(&sql, params![id], |row| row.get(0))?)
}

fn row_to_specimen(row: &Row<'_>) -> rusqlite::Result<Specimen> {
    Ok(Specimen {
        specimen_id: row.get(0)?,
        species_id: row.get(1)?,
        quantities: QuantitySnapshot::new(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
        location_id: row.get(6)?,
        organization_level_id: row.get(7)?,
    })
}

/// Fetch a specimen's current-state projection.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_specimen(conn: &Connection, specimen_id: SpecimenId) -> Result<Option<Specimen>> {
    let sql = format!(
        "SELECT specimen_id, species_id, {COUNTER_COLUMNS}, location_id, organization_level_id \
         FROM specimens WHERE specimen_id = ?1"
    );
    Ok(conn
        .query_row(&sql, params![specimen_id], row_to_specimen)
        .optional()?)
}

/// All specimens ordered by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_specimens(conn: &Connection) -> Result<Vec<Specimen>> {
    let sql = format!(
        "SELECT specimen_id, species_id, {COUNTER_COLUMNS}, location_id, organization_level_id \
         FROM specimens ORDER BY specimen_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_specimen)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Write a specimen's snapshot, clearing its placement when nothing of it
/// remains in the zoo.
///
/// Returns `true` when placement was cleared.
///
/// # Errors
///
/// Returns [`EngineError::SpecimenNotFound`] if the specimen does not exist.
pub fn write_specimen_snapshot(
    conn: &Connection,
    specimen_id: SpecimenId,
    snapshot: QuantitySnapshot,
    actor: &str,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE specimens SET
            quantity_owned = ?1,
            quantity_in_zoo = ?2,
            quantity_deponated_from = ?3,
            quantity_deponated_to = ?4,
            location_id = CASE WHEN ?2 = 0 THEN NULL ELSE location_id END,
            organization_level_id = CASE WHEN ?2 = 0 THEN NULL ELSE organization_level_id END,
            modified_by = ?5,
            modified_at = ?6
         WHERE specimen_id = ?7",
        params![
            snapshot.owned,
            snapshot.in_zoo,
            snapshot.deponated_from,
            snapshot.deponated_to,
            actor,
            super::audit_timestamp(),
            specimen_id,
        ],
    )?;
    if changed == 0 {
        return Err(EngineError::SpecimenNotFound(specimen_id));
    }
    Ok(snapshot.is_absent())
}

/// Parent reference of one row. `Ok(None)` when the row does not exist;
/// `Ok(Some(None))` for a class without phylum (and for phyla).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn parent_of(conn: &Connection, level: TaxonLevel, id: i64) -> Result<Option<Option<i64>>> {
    let Some(parent_column) = level.parent_column() else {
        return Ok(taxon_exists(conn, level, id)?.then_some(None));
    };
    let sql = format!(
        "SELECT {parent_column} FROM {} WHERE {} = ?1",
        level.table(),
        level.id_column()
    );
    Ok(conn
        .query_row(&sql, params![id], |row| row.get::<_, Option<i64>>(0))
        .optional()?)
}

/// Parent references for a set of rows in `table`, keyed by id. Ids that do
/// not exist are absent from the map.
pub(crate) fn parents_for(
    conn: &Connection,
    table: &str,
    id_column: &str,
    parent_column: &str,
    ids: &[i64],
) -> Result<HashMap<i64, Option<i64>>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT {id_column}, {parent_column} FROM {table} WHERE {id_column} IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?))
        })?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(rows)
}

pub(crate) fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 3);
    for idx in 0..count {
        if idx > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

/// Walk from `(level, id)` up to the root.
///
/// # Errors
///
/// Returns [`EngineError::BrokenAncestorChain`] when a row on the way is
/// missing; a rollup must never skip a level.
pub fn chain_from(conn: &Connection, level: TaxonLevel, id: i64) -> Result<AncestorChain> {
    let origin = format!("{level} {id}");
    let mut links = Vec::with_capacity(6);
    let mut cursor = Some((level, id));

    while let Some((current_level, current_id)) = cursor {
        let parent = parent_of(conn, current_level, current_id)?.ok_or_else(|| {
            EngineError::BrokenAncestorChain {
                level: current_level,
                id: current_id,
                from: origin.clone(),
            }
        })?;
        links.push((current_level, current_id));
        cursor = match (current_level.parent(), parent) {
            (Some(parent_level), Some(parent_id)) => Some((parent_level, parent_id)),
            _ => None,
        };
    }

    Ok(AncestorChain::from_links(links))
}

/// Ancestor chain of a specimen, starting at its species.
///
/// # Errors
///
/// Returns [`EngineError::SpecimenNotFound`] or
/// [`EngineError::BrokenAncestorChain`].
pub fn specimen_chain(conn: &Connection, specimen_id: SpecimenId) -> Result<AncestorChain> {
    let specimen =
        get_specimen(conn, specimen_id)?.ok_or(EngineError::SpecimenNotFound(specimen_id))?;
    chain_from(conn, TaxonLevel::Species, specimen.species_id).map_err(|err| match err {
        EngineError::BrokenAncestorChain { level, id, .. } => EngineError::BrokenAncestorChain {
            level,
            id,
            from: format!("specimen {specimen_id}"),
        },
        other => other,
    })
}

/// Memoizes species → chain lookups during full passes over the ledger.
#[derive(Debug, Default)]
pub struct ChainCache {
    by_species: HashMap<i64, AncestorChain>,
}

impl ChainCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain for a species, reading it from the store on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BrokenAncestorChain`] for an incomplete chain.
    pub fn for_species(&mut self, conn: &Connection, species_id: i64) -> Result<&AncestorChain> {
        if !self.by_species.contains_key(&species_id) {
            let chain = chain_from(conn, TaxonLevel::Species, species_id)?;
            self.by_species.insert(species_id, chain);
        }
        self.by_species
            .get(&species_id)
            .ok_or(EngineError::TaxonNotFound {
                level: TaxonLevel::Species,
                id: species_id,
            })
    }
}

fn row_to_aggregate(level: TaxonLevel, row: &Row<'_>) -> rusqlite::Result<TaxonAggregate> {
    let status: String = row.get(6)?;
    Ok(TaxonAggregate {
        level,
        id: row.get(0)?,
        parent_id: row.get(1)?,
        quantities: QuantitySnapshot::new(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
        status: status.parse().map_err(|err: String| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, err.into())
        })?,
    })
}

fn aggregate_select(level: TaxonLevel) -> String {
    let parent = level.parent_column().unwrap_or("NULL");
    format!(
        "SELECT {}, {parent}, {COUNTER_COLUMNS}, zoo_status FROM {}",
        level.id_column(),
        level.table()
    )
}

/// Fetch one aggregate row.
///
/// # Errors
///
/// Returns an error if `level` carries no aggregate or the query fails.
pub fn get_aggregate(
    conn: &Connection,
    level: TaxonLevel,
    id: i64,
) -> Result<Option<TaxonAggregate>> {
    if !level.has_aggregate() {
        return Err(EngineError::TaxonNotFound { level, id });
    }
    let sql = format!("{} WHERE {} = ?1", aggregate_select(level), level.id_column());
    Ok(conn
        .query_row(&sql, params![id], |row| row_to_aggregate(level, row))
        .optional()?)
}

/// All aggregate rows at `level`, ordered by id.
///
/// # Errors
///
/// Returns an error if the query fails. Species yields an empty list.
pub fn list_aggregates(conn: &Connection, level: TaxonLevel) -> Result<Vec<TaxonAggregate>> {
    if !level.has_aggregate() {
        return Ok(Vec::new());
    }
    let sql = format!("{} ORDER BY {}", aggregate_select(level), level.id_column());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| row_to_aggregate(level, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
