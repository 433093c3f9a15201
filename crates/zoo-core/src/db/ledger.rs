//! Row-level access to the `movements` ledger.
//!
//! These functions only read and write ledger rows. Callers outside the
//! crate go through [`crate::mutate::LedgerWriter`], which refreshes the
//! affected specimen and its ancestors after every write.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{EngineError, Result};
use crate::model::{MovementDate, MovementId, MovementRecord, NewMovement, SpecimenId};

const MOVEMENT_COLUMNS: &str = "movement_id, specimen_id, date, quantity, quantity_actual, \
     increment_reason, decrement_reason, location_id, contract_id, partner_id, price";

fn row_to_movement(row: &Row<'_>) -> rusqlite::Result<MovementRecord> {
    Ok(MovementRecord {
        movement_id: row.get(0)?,
        specimen_id: row.get(1)?,
        date: row.get(2)?,
        quantity: row.get(3)?,
        quantity_actual: row.get(4)?,
        increment_reason: row.get(5)?,
        decrement_reason: row.get(6)?,
        location_id: row.get(7)?,
        contract_id: row.get(8)?,
        partner_id: row.get(9)?,
        price: row.get(10)?,
    })
}

/// Fetch one ledger row.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_movement(conn: &Connection, movement_id: MovementId) -> Result<Option<MovementRecord>> {
    let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE movement_id = ?1");
    Ok(conn
        .query_row(&sql, params![movement_id], row_to_movement)
        .optional()?)
}

/// All rows of one specimen in calculation order `(date, movement_id)`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn specimen_events(conn: &Connection, specimen_id: SpecimenId) -> Result<Vec<MovementRecord>> {
    let sql = format!(
        "SELECT {MOVEMENT_COLUMNS} FROM movements \
         WHERE specimen_id = ?1 \
         ORDER BY date ASC, movement_id ASC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![specimen_id], row_to_movement)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// One page of the ledger in `(specimen_id, date, movement_id)` order,
/// optionally restricted to rows dated on or before `as_of`.
///
/// The order keeps every specimen's rows contiguous and already in
/// calculation order, so a page boundary can split a specimen's group but
/// never reorder it.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn fetch_page(
    conn: &Connection,
    as_of: Option<MovementDate>,
    offset: usize,
    limit: usize,
) -> Result<Vec<MovementRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);

    let rows = if let Some(as_of) = as_of {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements \
             WHERE date <= ?1 \
             ORDER BY specimen_id ASC, date ASC, movement_id ASC \
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.query_map(params![as_of, limit, offset], row_to_movement)?
            .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements \
             ORDER BY specimen_id ASC, date ASC, movement_id ASC \
             LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.query_map(params![limit, offset], row_to_movement)?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    Ok(rows)
}

/// Insert a ledger row and return its id.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub(crate) fn insert_row(
    conn: &Connection,
    movement: &NewMovement,
    actor: &str,
) -> Result<MovementId> {
    conn.execute(
        "INSERT INTO movements (
            specimen_id, date, quantity, quantity_actual,
            increment_reason, decrement_reason,
            location_id, contract_id, partner_id, price,
            modified_by, modified_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            movement.specimen_id,
            movement.date,
            movement.quantity,
            movement.quantity_actual,
            movement.increment_reason,
            movement.decrement_reason,
            movement.location_id,
            movement.contract_id,
            movement.partner_id,
            movement.price,
            actor,
            super::audit_timestamp(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite a ledger row in place, keeping its id (and therefore its
/// position among same-day rows). Returns the previous row.
///
/// # Errors
///
/// Returns [`EngineError::MovementNotFound`] if the row does not exist.
pub(crate) fn replace_row(
    conn: &Connection,
    movement_id: MovementId,
    movement: &NewMovement,
    actor: &str,
) -> Result<MovementRecord> {
    let previous =
        get_movement(conn, movement_id)?.ok_or(EngineError::MovementNotFound(movement_id))?;

    conn.execute(
        "UPDATE movements SET
            specimen_id = ?1, date = ?2, quantity = ?3, quantity_actual = ?4,
            increment_reason = ?5, decrement_reason = ?6,
            location_id = ?7, contract_id = ?8, partner_id = ?9, price = ?10,
            modified_by = ?11, modified_at = ?12
         WHERE movement_id = ?13",
        params![
            movement.specimen_id,
            movement.date,
            movement.quantity,
            movement.quantity_actual,
            movement.increment_reason,
            movement.decrement_reason,
            movement.location_id,
            movement.contract_id,
            movement.partner_id,
            movement.price,
            actor,
            super::audit_timestamp(),
            movement_id,
        ],
    )?;

    Ok(previous)
}

/// Delete a ledger row and return it.
///
/// # Errors
///
/// Returns [`EngineError::MovementNotFound`] if the row does not exist.
pub(crate) fn delete_row(conn: &Connection, movement_id: MovementId) -> Result<MovementRecord> {
    let previous =
        get_movement(conn, movement_id)?.ok_or(EngineError::MovementNotFound(movement_id))?;
    conn.execute(
        "DELETE FROM movements WHERE movement_id = ?1",
        params![movement_id],
    )?;
    Ok(previous)
}

/// Total ledger rows, optionally restricted to `date <= as_of`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_movements(conn: &Connection, as_of: Option<MovementDate>) -> Result<usize> {
    let count: i64 = match as_of {
        Some(as_of) => conn.query_row(
            "SELECT COUNT(*) FROM movements WHERE date <= ?1",
            params![as_of],
            |row| row.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM movements", [], |row| row.get(0))?,
    };
    Ok(usize::try_from(count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{taxa, test_store};
    use crate::model::TaxonLevel;

    fn date(raw: &str) -> MovementDate {
        raw.parse().expect("valid date")
    }

    fn store_with_specimens(count: i64) -> (Connection, Vec<SpecimenId>) {
        let conn = test_store();
        let class =
            taxa::create_taxon(&conn, TaxonLevel::Class, "Reptilia", None, "test").expect("class");
        let order =
            taxa::create_taxon(&conn, TaxonLevel::Order, "Squamata", Some(class), "test")
                .expect("order");
        let family =
            taxa::create_taxon(&conn, TaxonLevel::Family, "Varanidae", Some(order), "test")
                .expect("family");
        let genus =
            taxa::create_taxon(&conn, TaxonLevel::Genus, "Varanus", Some(family), "test")
                .expect("genus");
        let species = taxa::create_taxon(
            &conn,
            TaxonLevel::Species,
            "Varanus komodoensis",
            Some(genus),
            "test",
        )
        .expect("species");
        let ids = (0..count)
            .map(|_| taxa::create_specimen(&conn, species, None, "test").expect("specimen"))
            .collect();
        (conn, ids)
    }

    #[test]
    fn specimen_events_are_ordered_by_date_then_id() {
        let (conn, ids) = store_with_specimens(1);
        let specimen = ids[0];
        let birth = |day: &str| NewMovement::increment(specimen, date(day), "BIRTH", 1);
        let late = insert_row(&conn, &birth("2021/01/01"), "t").expect("insert");
        let early_a = insert_row(&conn, &birth("2020/01/01"), "t").expect("insert");
        let death = NewMovement::decrement(specimen, date("2020/01/01"), "DEATH", 1);
        let early_b = insert_row(&conn, &death, "t").expect("insert");

        let order: Vec<_> = specimen_events(&conn, specimen)
            .expect("events")
            .into_iter()
            .map(|e| e.movement_id)
            .collect();
        assert_eq!(order, vec![early_a, early_b, late]);
    }

    #[test]
    fn pages_follow_specimen_order_and_respect_as_of() {
        let (conn, ids) = store_with_specimens(3);
        for (offset, &specimen) in ids.iter().enumerate().rev() {
            let day = u32::try_from(offset).expect("small") + 1;
            let raw = format!("2020/01/{day:02}");
            insert_row(&conn, &NewMovement::increment(specimen, date(&raw), "BIRTH", 1), "t")
                .expect("insert");
            let future = NewMovement::increment(specimen, date("2030/01/01"), "BIRTH", 1);
            insert_row(&conn, &future, "t").expect("insert");
        }

        let all = fetch_page(&conn, None, 0, 100).expect("page");
        assert_eq!(all.len(), 6);
        let specimens: Vec<_> = all.iter().map(|e| e.specimen_id).collect();
        assert_eq!(specimens, vec![ids[0], ids[0], ids[1], ids[1], ids[2], ids[2]]);

        let bounded = fetch_page(&conn, Some(date("2025/01/01")), 0, 100).expect("page");
        assert_eq!(bounded.len(), 3);
        assert_eq!(count_movements(&conn, Some(date("2025/01/01"))).expect("count"), 3);

        let second = fetch_page(&conn, None, 2, 2).expect("page");
        assert_eq!(second.iter().map(|e| e.specimen_id).collect::<Vec<_>>(), vec![ids[1], ids[1]]);
    }

    #[test]
    fn replace_and_delete_return_previous_row() {
        let (conn, ids) = store_with_specimens(1);
        let birth = NewMovement::increment(ids[0], date("2020/01/01"), "BIRTH", 2);
        let id = insert_row(&conn, &birth, "t").expect("insert");

        let previous = replace_row(
            &conn,
            id,
            &NewMovement::increment(ids[0], date("2020/01/01"), "BIRTH", 5),
            "t",
        )
        .expect("replace");
        assert_eq!(previous.quantity, 2);
        assert_eq!(get_movement(&conn, id).expect("get").map(|m| m.quantity), Some(5));

        let deleted = delete_row(&conn, id).expect("delete");
        assert_eq!(deleted.quantity, 5);
        assert!(get_movement(&conn, id).expect("get").is_none());
        assert!(matches!(
            delete_row(&conn, id),
            Err(EngineError::MovementNotFound(missing)) if missing == id
        ));
    }
}
