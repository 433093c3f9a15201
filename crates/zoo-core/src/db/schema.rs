//! Canonical SQLite schema for the specimen store.
//!
//! - `movements` is the ledger and the single source of truth
//! - `specimens` holds each specimen's live snapshot and placement
//! - `genera` .. `phyla` hold denormalized counters summed over descendants;
//!   they are a cache that `rebuild` can always regenerate from the ledger
//! - `engine_meta` tracks the schema version and the last full rebuild

/// Migration v1: taxonomy, specimens, ledger and engine metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS phyla (
    phylum_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    quantity_owned INTEGER NOT NULL DEFAULT 0,
    quantity_in_zoo INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_from INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_to INTEGER NOT NULL DEFAULT 0,
    zoo_status TEXT NOT NULL DEFAULT 'new'
        CHECK (zoo_status IN ('new', 'present', 'deponated', 'no_evidence')),
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS classes (
    class_id INTEGER PRIMARY KEY,
    phylum_id INTEGER REFERENCES phyla(phylum_id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    quantity_owned INTEGER NOT NULL DEFAULT 0,
    quantity_in_zoo INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_from INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_to INTEGER NOT NULL DEFAULT 0,
    zoo_status TEXT NOT NULL DEFAULT 'new'
        CHECK (zoo_status IN ('new', 'present', 'deponated', 'no_evidence')),
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS orders (
    order_id INTEGER PRIMARY KEY,
    class_id INTEGER NOT NULL REFERENCES classes(class_id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    quantity_owned INTEGER NOT NULL DEFAULT 0,
    quantity_in_zoo INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_from INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_to INTEGER NOT NULL DEFAULT 0,
    zoo_status TEXT NOT NULL DEFAULT 'new'
        CHECK (zoo_status IN ('new', 'present', 'deponated', 'no_evidence')),
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS families (
    family_id INTEGER PRIMARY KEY,
    order_id INTEGER NOT NULL REFERENCES orders(order_id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    quantity_owned INTEGER NOT NULL DEFAULT 0,
    quantity_in_zoo INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_from INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_to INTEGER NOT NULL DEFAULT 0,
    zoo_status TEXT NOT NULL DEFAULT 'new'
        CHECK (zoo_status IN ('new', 'present', 'deponated', 'no_evidence')),
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS genera (
    genus_id INTEGER PRIMARY KEY,
    family_id INTEGER NOT NULL REFERENCES families(family_id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    quantity_owned INTEGER NOT NULL DEFAULT 0,
    quantity_in_zoo INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_from INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_to INTEGER NOT NULL DEFAULT 0,
    zoo_status TEXT NOT NULL DEFAULT 'new'
        CHECK (zoo_status IN ('new', 'present', 'deponated', 'no_evidence')),
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS species (
    species_id INTEGER PRIMARY KEY,
    genus_id INTEGER NOT NULL REFERENCES genera(genus_id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS specimens (
    specimen_id INTEGER PRIMARY KEY,
    species_id INTEGER NOT NULL REFERENCES species(species_id),
    quantity_owned INTEGER NOT NULL DEFAULT 0,
    quantity_in_zoo INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_from INTEGER NOT NULL DEFAULT 0,
    quantity_deponated_to INTEGER NOT NULL DEFAULT 0,
    location_id INTEGER,
    organization_level_id INTEGER,
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS movements (
    movement_id INTEGER PRIMARY KEY AUTOINCREMENT,
    specimen_id INTEGER NOT NULL REFERENCES specimens(specimen_id),
    date TEXT NOT NULL CHECK (length(date) = 10),
    quantity INTEGER NOT NULL,
    quantity_actual INTEGER NOT NULL,
    increment_reason TEXT,
    decrement_reason TEXT,
    location_id INTEGER,
    contract_id INTEGER,
    partner_id INTEGER,
    price REAL,
    modified_by TEXT NOT NULL DEFAULT '',
    modified_at TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS engine_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_rebuild_at TEXT,
    last_rebuild_events INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO engine_meta (
    id,
    schema_version,
    last_rebuild_at,
    last_rebuild_events
) VALUES (1, 1, NULL, 0);
";

/// Migration v2: ledger ordering and hierarchy traversal indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_movements_specimen_date
    ON movements(specimen_id, date, movement_id);

CREATE INDEX IF NOT EXISTS idx_movements_date
    ON movements(date);

CREATE INDEX IF NOT EXISTS idx_specimens_species
    ON specimens(species_id);

CREATE INDEX IF NOT EXISTS idx_species_genus
    ON species(genus_id);

CREATE INDEX IF NOT EXISTS idx_genera_family
    ON genera(family_id);

CREATE INDEX IF NOT EXISTS idx_families_order
    ON families(order_id);

CREATE INDEX IF NOT EXISTS idx_orders_class
    ON orders(class_id);

CREATE INDEX IF NOT EXISTS idx_classes_phylum
    ON classes(phylum_id);

UPDATE engine_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by the ledger and hierarchy query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_movements_specimen_date",
    "idx_movements_date",
    "idx_specimens_species",
    "idx_species_genus",
    "idx_genera_family",
    "idx_families_order",
    "idx_orders_class",
    "idx_classes_phylum",
];

#[cfg(test)]
mod tests {
    use crate::db::migrations;
    use rusqlite::{Connection, params};

    fn seeded_conn() -> rusqlite::Result<Connection> {
        let mut conn = Connection::open_in_memory()?;
        migrations::migrate(&mut conn)?;

        conn.execute_batch(
            "INSERT INTO classes (class_id, name) VALUES (1, 'Aves');
             INSERT INTO orders (order_id, class_id, name) VALUES (1, 1, 'Strigiformes');
             INSERT INTO families (family_id, order_id, name) VALUES (1, 1, 'Strigidae');
             INSERT INTO genera (genus_id, family_id, name) VALUES (1, 1, 'Bubo');
             INSERT INTO species (species_id, genus_id, name) VALUES (1, 1, 'Bubo bubo');",
        )?;

        for idx in 1..=40_i64 {
            conn.execute(
                "INSERT INTO specimens (specimen_id, species_id) VALUES (?1, 1)",
                params![idx],
            )?;
            conn.execute(
                "INSERT INTO movements
                     (specimen_id, date, quantity, quantity_actual, increment_reason)
                 VALUES (?1, ?2, 1, 1, 'BIRTH')",
                params![idx, format!("2020/01/{:02}", idx % 28 + 1)],
            )?;
        }

        Ok(conn)
    }

    fn query_plan_details(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}"))?;
        stmt.query_map([], |row| row.get::<_, String>(3))?
            .collect::<Result<Vec<_>, _>>()
    }

    #[test]
    fn specimen_history_uses_ordering_index() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let details = query_plan_details(
            &conn,
            "SELECT movement_id FROM movements
             WHERE specimen_id = 3
             ORDER BY date, movement_id",
        )?;

        assert!(
            details
                .iter()
                .any(|detail| detail.contains("idx_movements_specimen_date")),
            "expected ordering index in plan, got: {details:?}"
        );

        Ok(())
    }

    #[test]
    fn species_lookup_uses_parent_index() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let details = query_plan_details(
            &conn,
            "SELECT specimen_id FROM specimens WHERE species_id = 1",
        )?;

        assert!(
            details
                .iter()
                .any(|detail| detail.contains("idx_specimens_species")),
            "expected species index in plan, got: {details:?}"
        );

        Ok(())
    }

    #[test]
    fn status_check_rejects_unknown_codes() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let result =
            conn.execute("UPDATE genera SET zoo_status = 'extinct' WHERE genus_id = 1", []);
        assert!(result.is_err(), "unknown status code must be rejected");
        Ok(())
    }
}
