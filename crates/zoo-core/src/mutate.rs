//! Ledger mutations.
//!
//! [`LedgerWriter`] is the only public way to change the `movements`
//! table. Every write is followed by [`LedgerWriter::refresh_specimen`] for
//! each affected specimen, which recalculates the snapshot from the full
//! ledger, stores it, and pushes the delta up the ancestor chain.
//!
//! The writer does not open a transaction. Wrap calls in
//! [`crate::db::write_transaction`] (or pass your own `Transaction`) so the
//! ledger row, the specimen row and all aggregate rows commit together.

use rusqlite::Connection;

use crate::calc;
use crate::config::ReasonRules;
use crate::db::{ledger, taxa};
use crate::error::{EngineError, Result};
use crate::model::{MovementId, NewMovement, QuantitySnapshot, SpecimenId};
use crate::rollup::{self, RollupOutcome};

/// What a refresh changed for one specimen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecimenRefresh {
    pub specimen_id: SpecimenId,
    pub before: QuantitySnapshot,
    pub after: QuantitySnapshot,
    pub delta: QuantitySnapshot,
    /// Placement fields were cleared because nothing remains in the zoo.
    pub placement_cleared: bool,
    pub rollup: RollupOutcome,
}

/// Writes ledger rows and keeps specimen and taxon counters in step.
pub struct LedgerWriter<'conn> {
    conn: &'conn Connection,
    rules: &'conn ReasonRules,
    actor: &'conn str,
}

impl<'conn> LedgerWriter<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection, rules: &'conn ReasonRules, actor: &'conn str) -> Self {
        Self { conn, rules, actor }
    }

    /// Insert a ledger row and refresh its specimen.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SpecimenNotFound`] for an unknown specimen, or
    /// any rollup failure.
    pub fn insert_movement(&self, movement: &NewMovement) -> Result<(MovementId, SpecimenRefresh)> {
        self.require_specimen(movement.specimen_id)?;
        let movement_id = ledger::insert_row(self.conn, movement, self.actor)?;
        tracing::debug!(
            movement_id,
            specimen_id = movement.specimen_id,
            date = %movement.date,
            "inserted movement"
        );
        let refresh = self.refresh_specimen(movement.specimen_id)?;
        Ok((movement_id, refresh))
    }

    /// Replace a ledger row. When the row changes specimen, both the old
    /// and the new specimen are refreshed (old first).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MovementNotFound`] or
    /// [`EngineError::SpecimenNotFound`], or any rollup failure.
    pub fn update_movement(
        &self,
        movement_id: MovementId,
        movement: &NewMovement,
    ) -> Result<Vec<SpecimenRefresh>> {
        self.require_specimen(movement.specimen_id)?;
        let previous = ledger::replace_row(self.conn, movement_id, movement, self.actor)?;
        tracing::debug!(
            movement_id,
            from_specimen = previous.specimen_id,
            to_specimen = movement.specimen_id,
            "updated movement"
        );

        let mut refreshes = Vec::with_capacity(2);
        if previous.specimen_id != movement.specimen_id {
            refreshes.push(self.refresh_specimen(previous.specimen_id)?);
        }
        refreshes.push(self.refresh_specimen(movement.specimen_id)?);
        Ok(refreshes)
    }

    /// Delete a ledger row and refresh its specimen.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MovementNotFound`], or any rollup failure.
    pub fn delete_movement(&self, movement_id: MovementId) -> Result<SpecimenRefresh> {
        let previous = ledger::delete_row(self.conn, movement_id)?;
        tracing::debug!(
            movement_id,
            specimen_id = previous.specimen_id,
            "deleted movement"
        );
        self.refresh_specimen(previous.specimen_id)
    }

    /// Recalculate one specimen from its full ledger and roll the
    /// difference up its chain.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SpecimenNotFound`] or
    /// [`EngineError::BrokenAncestorChain`].
    pub fn refresh_specimen(&self, specimen_id: SpecimenId) -> Result<SpecimenRefresh> {
        let specimen = taxa::get_specimen(self.conn, specimen_id)?
            .ok_or(EngineError::SpecimenNotFound(specimen_id))?;
        let chain = taxa::specimen_chain(self.conn, specimen_id)?;

        let events = ledger::specimen_events(self.conn, specimen_id)?;
        for event in events.iter().filter(|event| event.is_dual_tagged()) {
            tracing::warn!(
                movement_id = event.movement_id,
                specimen_id,
                "movement carries both increment and decrement reasons; treating as increment"
            );
        }

        let before = specimen.quantities;
        let after = calc::calculate(&events, self.rules);
        let placement_cleared =
            taxa::write_specimen_snapshot(self.conn, specimen_id, after, self.actor)?;
        let rollup = rollup::apply_delta(self.conn, &chain, before, after, self.actor)?;

        tracing::debug!(
            specimen_id,
            events = events.len(),
            owned = after.owned,
            in_zoo = after.in_zoo,
            placement_cleared,
            "refreshed specimen"
        );

        Ok(SpecimenRefresh {
            specimen_id,
            before,
            after,
            delta: after - before,
            placement_cleared,
            rollup,
        })
    }

    fn require_specimen(&self, specimen_id: SpecimenId) -> Result<()> {
        if taxa::get_specimen(self.conn, specimen_id)?.is_some() {
            Ok(())
        } else {
            Err(EngineError::SpecimenNotFound(specimen_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::taxa::{create_specimen, create_taxon, get_aggregate, get_specimen};
    use crate::db::{test_store, write_transaction};
    use crate::model::{MovementDate, TaxonLevel, ZooStatus};

    struct Fixture {
        genus: i64,
        phylum: i64,
        species: i64,
    }

    fn fixture(conn: &Connection) -> Fixture {
        let phylum = create_taxon(conn, TaxonLevel::Phylum, "Chordata", None, "t").expect("phylum");
        let class =
            create_taxon(conn, TaxonLevel::Class, "Mammalia", Some(phylum), "t").expect("class");
        let order =
            create_taxon(conn, TaxonLevel::Order, "Carnivora", Some(class), "t").expect("order");
        let family =
            create_taxon(conn, TaxonLevel::Family, "Felidae", Some(order), "t").expect("family");
        let genus =
            create_taxon(conn, TaxonLevel::Genus, "Panthera", Some(family), "t").expect("genus");
        let species =
            create_taxon(conn, TaxonLevel::Species, "Panthera leo", Some(genus), "t")
                .expect("species");
        Fixture {
            genus,
            phylum,
            species,
        }
    }

    fn date(raw: &str) -> MovementDate {
        raw.parse().expect("valid date")
    }

    fn genus_counters(conn: &Connection, genus: i64) -> QuantitySnapshot {
        get_aggregate(conn, TaxonLevel::Genus, genus)
            .expect("query")
            .expect("genus")
            .quantities
    }

    #[test]
    fn insert_then_delete_clears_placement_and_rolls_up() {
        let conn = test_store();
        let f = fixture(&conn);
        let rules = ReasonRules::default();
        let specimen = create_specimen(&conn, f.species, Some(7), "t").expect("specimen");
        let writer = LedgerWriter::new(&conn, &rules, "keeper");

        let (_, birth) = writer
            .insert_movement(&NewMovement::increment(specimen, date("2020/01/01"), "BIRTH", 2))
            .expect("birth");
        assert_eq!(birth.after, QuantitySnapshot::new(2, 2, 0, 0));
        assert_eq!(birth.delta, birth.after);

        let transfer = NewMovement::decrement(specimen, date("2020/06/01"), "TRANSFER_OUT", 1);
        writer.insert_movement(&transfer).expect("transfer");
        let (death_id, death) = writer
            .insert_movement(&NewMovement::decrement(specimen, date("2021/01/01"), "DEATH", 1))
            .expect("death");
        assert_eq!(death.after, QuantitySnapshot::ZERO);
        assert!(death.placement_cleared);
        assert_eq!(
            get_specimen(&conn, specimen).expect("get").expect("row").location_id,
            None
        );
        assert_eq!(genus_counters(&conn, f.genus), QuantitySnapshot::ZERO);
        let phylum = get_aggregate(&conn, TaxonLevel::Phylum, f.phylum)
            .expect("query")
            .expect("phylum");
        assert_eq!(phylum.status, ZooStatus::NoEvidence);

        let undone = writer.delete_movement(death_id).expect("delete death");
        assert_eq!(undone.after, QuantitySnapshot::new(1, 1, 0, 0));
        assert_eq!(genus_counters(&conn, f.genus), QuantitySnapshot::new(1, 1, 0, 0));
    }

    #[test]
    fn update_between_specimens_refreshes_both() {
        let conn = test_store();
        let f = fixture(&conn);
        let rules = ReasonRules::default();
        let a = create_specimen(&conn, f.species, None, "t").expect("a");
        let b = create_specimen(&conn, f.species, None, "t").expect("b");
        let writer = LedgerWriter::new(&conn, &rules, "t");

        let (id, _) = writer
            .insert_movement(&NewMovement::increment(a, date("2022/03/01"), "PURCHASE", 3))
            .expect("insert");
        let refreshes = writer
            .update_movement(id, &NewMovement::increment(b, date("2022/03/01"), "PURCHASE", 3))
            .expect("update");

        assert_eq!(refreshes.len(), 2);
        assert_eq!(refreshes[0].specimen_id, a);
        assert_eq!(refreshes[0].after, QuantitySnapshot::ZERO);
        assert_eq!(refreshes[1].specimen_id, b);
        assert_eq!(refreshes[1].after, QuantitySnapshot::new(3, 3, 0, 0));
        assert_eq!(genus_counters(&conn, f.genus), QuantitySnapshot::new(3, 3, 0, 0));
    }

    #[test]
    fn unknown_specimen_and_movement_are_rejected() {
        let conn = test_store();
        let rules = ReasonRules::default();
        let writer = LedgerWriter::new(&conn, &rules, "t");

        let err = writer
            .insert_movement(&NewMovement::increment(9, date("2022/01/01"), "BIRTH", 1))
            .expect_err("no specimen 9");
        assert!(matches!(err, EngineError::SpecimenNotFound(9)));

        let err = writer.delete_movement(77).expect_err("no movement 77");
        assert!(matches!(err, EngineError::MovementNotFound(77)));
    }

    #[test]
    fn broken_chain_rolls_back_the_ledger_write() {
        let mut conn = test_store();
        let f = fixture(&conn);
        let rules = ReasonRules::default();
        let specimen = create_specimen(&conn, f.species, None, "t").expect("specimen");

        conn.pragma_update(None, "foreign_keys", "OFF").expect("fk off");
        conn.execute("DELETE FROM genera WHERE genus_id = ?1", [f.genus])
            .expect("drop genus");

        let result = write_transaction(&mut conn, |tx| {
            LedgerWriter::new(tx, &rules, "t")
                .insert_movement(&NewMovement::increment(specimen, date("2023/01/01"), "BIRTH", 1))
        });
        assert!(matches!(result, Err(EngineError::BrokenAncestorChain { .. })));

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM movements", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 0);
    }

    #[test]
    fn deponation_reasons_follow_configuration() {
        let conn = test_store();
        let f = fixture(&conn);
        let rules = ReasonRules {
            deponation_in: vec!["LOAN_IN".to_string()],
            deponation_out: vec!["LOAN_OUT".to_string()],
        };
        let specimen = create_specimen(&conn, f.species, None, "t").expect("specimen");
        let writer = LedgerWriter::new(&conn, &rules, "t");

        writer
            .insert_movement(&NewMovement::increment(specimen, date("2019/05/05"), "LOAN_IN", 1))
            .expect("loan in");
        let (_, refresh) = writer
            .insert_movement(&NewMovement::decrement(specimen, date("2019/09/09"), "LOAN_OUT", 1))
            .expect("loan out");

        assert_eq!(refresh.after, QuantitySnapshot::new(0, 0, 1, 1));
        let genus = get_aggregate(&conn, TaxonLevel::Genus, f.genus)
            .expect("query")
            .expect("genus");
        assert_eq!(genus.status, ZooStatus::Deponated);
    }
}
