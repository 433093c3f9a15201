use proptest::prelude::*;
use rusqlite::Connection;
use zoo_core::calc::calculate;
use zoo_core::config::ReasonRules;
use zoo_core::db::taxa::{create_specimen, get_aggregate, list_aggregates, list_specimens};
use zoo_core::hierarchy::{TaxonRef, move_taxa};
use zoo_core::model::{MovementRecord, QuantitySnapshot, TaxonAggregate, TaxonLevel};
use zoo_core::mutate::LedgerWriter;
use zoo_core::rebuild::rebuild_aggregates;
use zoo_core::reconstruct::{MemoryPager, ReconstructOptions, reconstruct};
use zoo_core::verify::verify_aggregates;

use generators::*;

fn all_aggregates(conn: &Connection) -> Vec<TaxonAggregate> {
    TaxonLevel::AGGREGATE_LEVELS
        .into_iter()
        .flat_map(|level| list_aggregates(conn, level).expect("list aggregates"))
        .collect()
}

/// Apply `ops` through the writer, tracking surviving movement ids.
fn apply_ops(conn: &Connection, rules: &ReasonRules, specimens: &[i64], ops: &[LedgerOp]) {
    let writer = LedgerWriter::new(conn, rules, "prop");
    let mut live: Vec<i64> = Vec::new();
    for op in ops {
        match *op {
            LedgerOp::Insert { specimen, row } => {
                let specimen_id = specimens[specimen % specimens.len()];
                let (id, _) = writer
                    .insert_movement(&new_movement(specimen_id, row))
                    .expect("insert");
                live.push(id);
            }
            LedgerOp::Update {
                target,
                specimen,
                row,
            } => {
                if live.is_empty() {
                    continue;
                }
                let id = live[target % live.len()];
                let specimen_id = specimens[specimen % specimens.len()];
                writer
                    .update_movement(id, &new_movement(specimen_id, row))
                    .expect("update");
            }
            LedgerOp::Delete { target } => {
                if live.is_empty() {
                    continue;
                }
                let id = live.remove(target % live.len());
                writer.delete_movement(id).expect("delete");
            }
        }
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn calculation_is_deterministic(ledger in arb_ledger(1, 40)) {
        let rules = ReasonRules::default();
        let first = calculate(&ledger, &rules);
        let second = calculate(&ledger, &rules);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn pagination_never_changes_results(ledger in arb_ledger(12, 120), page_size in 1usize..40) {
        let rules = ReasonRules::default();
        let accept = |snapshot: &QuantitySnapshot, _: &[MovementRecord]| snapshot.owned % 2 == 0;

        let mut unpaged = MemoryPager::new(ledger.clone(), None);
        let unbounded = ReconstructOptions::with_page_size(usize::MAX);
        let expected = reconstruct(&mut unpaged, &rules, &unbounded, accept).expect("unpaged");

        let mut paged = MemoryPager::new(ledger, None);
        let bounded = ReconstructOptions::with_page_size(page_size);
        let actual = reconstruct(&mut paged, &rules, &bounded, accept).expect("paged");

        prop_assert_eq!(&actual.entries, &expected.entries);
        prop_assert_eq!(actual.groups_evaluated, expected.groups_evaluated);
        prop_assert_eq!(actual.events_read, expected.events_read);
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(48))]

    #[test]
    fn incremental_maintenance_matches_rebuild(ops in arb_ops(40)) {
        let conn = memory_store();
        let rules = ReasonRules::default();
        let taxonomy = build_taxonomy(&conn);
        let specimens: Vec<i64> = (0..6)
            .map(|idx| {
                let species = taxonomy.species[idx % taxonomy.species.len()];
                create_specimen(&conn, species, None, "prop").expect("specimen")
            })
            .collect();

        apply_ops(&conn, &rules, &specimens, &ops);
        let drift = verify_aggregates(&conn, &rules, 7).expect("verify");
        prop_assert!(drift.is_clean(), "{:?}", drift);

        let incremental_taxa = all_aggregates(&conn);
        let incremental_specimens = list_specimens(&conn).expect("specimens");

        rebuild_aggregates(&conn, &rules, 5, "rebuild").expect("rebuild");
        prop_assert_eq!(all_aggregates(&conn), incremental_taxa);
        let rebuilt_counters: Vec<_> = list_specimens(&conn)
            .expect("specimens")
            .into_iter()
            .map(|s| (s.specimen_id, s.quantities))
            .collect();
        let incremental_counters: Vec<_> = incremental_specimens
            .into_iter()
            .map(|s| (s.specimen_id, s.quantities))
            .collect();
        prop_assert_eq!(rebuilt_counters, incremental_counters);
    }

    #[test]
    fn moves_conserve_counters(ops in arb_ops(30), genus_pick in 0usize..4) {
        let conn = memory_store();
        let rules = ReasonRules::default();
        let taxonomy = build_taxonomy(&conn);
        let specimens: Vec<i64> = taxonomy
            .species
            .iter()
            .map(|&species| create_specimen(&conn, species, None, "prop").expect("specimen"))
            .collect();
        apply_ops(&conn, &rules, &specimens, &ops);

        let genus = taxonomy.genera[genus_pick];
        let (old_family, new_family) = if genus_pick < 2 {
            (taxonomy.families[0], taxonomy.families[1])
        } else {
            (taxonomy.families[1], taxonomy.families[0])
        };
        let family = |id| {
            get_aggregate(&conn, TaxonLevel::Family, id)
                .expect("query")
                .expect("family")
                .quantities
        };
        let moved = get_aggregate(&conn, TaxonLevel::Genus, genus)
            .expect("query")
            .expect("genus")
            .quantities;
        let old_before = family(old_family);
        let new_before = family(new_family);
        let order_before = get_aggregate(&conn, TaxonLevel::Order, taxonomy.order)
            .expect("query")
            .expect("order")
            .quantities;

        let report = move_taxa(
            &conn,
            TaxonLevel::Genus,
            &[genus],
            TaxonRef::new(TaxonLevel::Family, new_family),
            "prop",
        )
        .expect("move");

        prop_assert_eq!(report.moved_sum, moved);
        prop_assert_eq!(family(old_family) + moved, old_before);
        prop_assert_eq!(family(new_family), new_before + moved);
        let order_after = get_aggregate(&conn, TaxonLevel::Order, taxonomy.order)
            .expect("query")
            .expect("order")
            .quantities;
        prop_assert_eq!(order_after, order_before);
        prop_assert!(verify_aggregates(&conn, &rules, 3).expect("verify").is_clean());
    }
}
