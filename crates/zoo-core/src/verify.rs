//! Drift detection between stored counters and the ledger.
//!
//! Verification derives expected counters in memory and compares them with
//! what is stored. It never writes; repairing drift is the job of
//! [`crate::rebuild::rebuild_aggregates`].

use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::calc;
use crate::config::ReasonRules;
use crate::db::taxa::{self, ChainCache};
use crate::error::{ErrorCode, Result};
use crate::model::status::calculate_zoo_status_from_quantities;
use crate::model::{QuantitySnapshot, SpecimenId, TaxonLevel, ZooStatus};
use crate::reconstruct::{SpecimenGroups, SqlitePager};

/// A specimen whose stored counters disagree with its ledger, or which
/// still holds a placement although its ledger leaves it absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecimenDrift {
    pub specimen_id: SpecimenId,
    pub stored: QuantitySnapshot,
    pub expected: QuantitySnapshot,
    pub stale_placement: bool,
}

/// An aggregate row whose counters or status disagree with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonDrift {
    pub level: TaxonLevel,
    pub id: i64,
    pub stored: QuantitySnapshot,
    pub expected: QuantitySnapshot,
    pub stored_status: ZooStatus,
    pub expected_status: ZooStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub specimens: Vec<SpecimenDrift>,
    pub taxa: Vec<TaxonDrift>,
    pub events_checked: usize,
    pub specimens_checked: usize,
    pub taxa_checked: usize,
}

impl DriftReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.specimens.is_empty() && self.taxa.is_empty()
    }

    /// [`ErrorCode::AggregateDrift`] when anything disagrees.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        (!self.is_clean()).then_some(ErrorCode::AggregateDrift)
    }
}

/// Compare every stored specimen and aggregate counter with the ledger.
///
/// A row still in `new` passes when no specimen below it has ledger rows;
/// any other row must carry the status its expected counters imply. A
/// specimen the ledger leaves absent must hold no placement.
///
/// # Errors
///
/// Returns a store error, or [`crate::error::EngineError::BrokenAncestorChain`]
/// if a specimen with ledger rows has no complete chain.
pub fn verify_aggregates(
    conn: &Connection,
    rules: &ReasonRules,
    page_size: usize,
) -> Result<DriftReport> {
    let specimens = taxa::list_specimens(conn)?;
    let species_of: HashMap<SpecimenId, i64> = specimens
        .iter()
        .map(|specimen| (specimen.specimen_id, specimen.species_id))
        .collect();

    let mut expected_specimens: HashMap<SpecimenId, QuantitySnapshot> = HashMap::new();
    let mut expected_taxa: BTreeMap<(TaxonLevel, i64), QuantitySnapshot> = BTreeMap::new();
    let mut chains = ChainCache::new();

    let mut pager = SqlitePager::new(conn, None);
    let mut groups = SpecimenGroups::new(&mut pager, page_size, None);
    for group in groups.by_ref() {
        let group = group?;
        let snapshot = calc::calculate(&group.events, rules);
        expected_specimens.insert(group.specimen_id, snapshot);
        if let Some(&species_id) = species_of.get(&group.specimen_id) {
            let chain = chains.for_species(conn, species_id)?;
            for key in chain.aggregate_links() {
                *expected_taxa.entry(key).or_default() += snapshot;
            }
        }
    }

    let mut report = DriftReport {
        events_checked: groups.events_read(),
        specimens_checked: specimens.len(),
        ..DriftReport::default()
    };

    for specimen in &specimens {
        let expected = expected_specimens
            .get(&specimen.specimen_id)
            .copied()
            .unwrap_or_default();
        let stale_placement = expected.is_absent() && specimen.is_placed();
        if specimen.quantities != expected || stale_placement {
            tracing::warn!(
                specimen_id = specimen.specimen_id,
                stored = ?specimen.quantities,
                expected = ?expected,
                stale_placement,
                "specimen drifted"
            );
            report.specimens.push(SpecimenDrift {
                specimen_id: specimen.specimen_id,
                stored: specimen.quantities,
                expected,
                stale_placement,
            });
        }
    }

    for level in TaxonLevel::AGGREGATE_LEVELS {
        for aggregate in taxa::list_aggregates(conn, level)? {
            report.taxa_checked += 1;
            let reached = expected_taxa.get(&(level, aggregate.id)).copied();
            let expected = reached.unwrap_or_default();
            let expected_status = if reached.is_none() && aggregate.status == ZooStatus::New {
                ZooStatus::New
            } else {
                calculate_zoo_status_from_quantities(expected.in_zoo, expected.deponated_to)
            };

            if aggregate.quantities != expected || aggregate.status != expected_status {
                tracing::warn!(
                    %level,
                    id = aggregate.id,
                    stored = ?aggregate.quantities,
                    expected = ?expected,
                    stored_status = %aggregate.status,
                    %expected_status,
                    "aggregate drifted"
                );
                report.taxa.push(TaxonDrift {
                    level,
                    id: aggregate.id,
                    stored: aggregate.quantities,
                    expected,
                    stored_status: aggregate.status,
                    expected_status,
                });
            }
        }
    }

    tracing::info!(
        events = report.events_checked,
        specimens = report.specimens_checked,
        taxa = report.taxa_checked,
        drifted = report.specimens.len() + report.taxa.len(),
        "verification finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::taxa::{create_specimen, create_taxon, set_specimen_placement};
    use crate::db::test_store;
    use crate::model::{MovementDate, NewMovement};
    use crate::mutate::LedgerWriter;
    use crate::rebuild::rebuild_aggregates;

    fn date(raw: &str) -> MovementDate {
        raw.parse().expect("valid date")
    }

    fn populated(conn: &Connection, rules: &ReasonRules) -> (i64, SpecimenId) {
        let phylum = create_taxon(conn, TaxonLevel::Phylum, "Chordata", None, "t").expect("phylum");
        let class =
            create_taxon(conn, TaxonLevel::Class, "Mammalia", Some(phylum), "t").expect("class");
        let order =
            create_taxon(conn, TaxonLevel::Order, "Rodentia", Some(class), "t").expect("order");
        let family =
            create_taxon(conn, TaxonLevel::Family, "Caviidae", Some(order), "t").expect("family");
        let genus =
            create_taxon(conn, TaxonLevel::Genus, "Cavia", Some(family), "t").expect("genus");
        let species =
            create_taxon(conn, TaxonLevel::Species, "Cavia porcellus", Some(genus), "t")
                .expect("species");
        let idle = create_taxon(conn, TaxonLevel::Genus, "Dolichotis", Some(family), "t")
            .expect("idle genus");
        assert!(idle > genus);

        let specimen = create_specimen(conn, species, None, "t").expect("specimen");
        LedgerWriter::new(conn, rules, "t")
            .insert_movement(&NewMovement::increment(specimen, date("2021/07/01"), "BIRTH", 6))
            .expect("birth");
        (genus, specimen)
    }

    #[test]
    fn incremental_state_verifies_clean() {
        let conn = test_store();
        let rules = ReasonRules::default();
        populated(&conn, &rules);

        let report = verify_aggregates(&conn, &rules, 2).expect("verify");
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.code(), None);
        assert_eq!(report.events_checked, 1);
        assert_eq!(report.taxa_checked, 6);
    }

    #[test]
    fn drift_is_reported_not_patched() {
        let conn = test_store();
        let rules = ReasonRules::default();
        let (genus, specimen) = populated(&conn, &rules);
        conn.execute("UPDATE genera SET quantity_in_zoo = 1 WHERE genus_id = ?1", [genus])
            .expect("corrupt genus");
        conn.execute("UPDATE specimens SET quantity_owned = 5 WHERE specimen_id = ?1", [specimen])
            .expect("corrupt specimen");

        let report = verify_aggregates(&conn, &rules, 50).expect("verify");
        assert_eq!(report.code(), Some(ErrorCode::AggregateDrift));
        assert_eq!(report.specimens.len(), 1);
        assert_eq!(report.specimens[0].expected, QuantitySnapshot::new(6, 6, 0, 0));
        assert_eq!(report.taxa.len(), 1);
        assert_eq!(report.taxa[0].stored.in_zoo, 1);
        assert_eq!(report.taxa[0].expected.in_zoo, 6);

        let again = verify_aggregates(&conn, &rules, 50).expect("verify again");
        assert_eq!(again, report);

        rebuild_aggregates(&conn, &rules, 50, "t").expect("rebuild");
        assert!(verify_aggregates(&conn, &rules, 50).expect("verify").is_clean());
    }

    #[test]
    fn wrong_status_is_drift() {
        let conn = test_store();
        let rules = ReasonRules::default();
        let (genus, _) = populated(&conn, &rules);
        conn.execute("UPDATE genera SET zoo_status = 'no_evidence' WHERE genus_id = ?1", [genus])
            .expect("corrupt status");

        let report = verify_aggregates(&conn, &rules, 50).expect("verify");
        assert_eq!(report.taxa.len(), 1);
        assert_eq!(report.taxa[0].expected_status, ZooStatus::Present);
    }

    #[test]
    fn placement_on_an_absent_specimen_is_drift() {
        let conn = test_store();
        let rules = ReasonRules::default();
        let (_, specimen) = populated(&conn, &rules);
        LedgerWriter::new(&conn, &rules, "t")
            .insert_movement(&NewMovement::decrement(specimen, date("2022/01/01"), "DEATH", 6))
            .expect("death");
        assert!(verify_aggregates(&conn, &rules, 50).expect("verify").is_clean());

        set_specimen_placement(&conn, specimen, Some(9), None, "t").expect("placement");
        let report = verify_aggregates(&conn, &rules, 50).expect("verify");
        assert_eq!(report.code(), Some(ErrorCode::AggregateDrift));
        assert_eq!(report.specimens.len(), 1);
        assert!(report.specimens[0].stale_placement);
        assert_eq!(report.specimens[0].stored, report.specimens[0].expected);
        assert!(report.taxa.is_empty());

        rebuild_aggregates(&conn, &rules, 50, "t").expect("rebuild");
        assert!(verify_aggregates(&conn, &rules, 50).expect("verify").is_clean());
    }
}
