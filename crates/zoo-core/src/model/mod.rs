//! Domain types shared by the calculator, rollup maintainer, reconstructor
//! and hierarchy moves.

pub mod date;
pub mod movement;
pub mod snapshot;
pub mod specimen;
pub mod status;
pub mod taxon;

pub use date::MovementDate;
pub use movement::{MovementKind, MovementRecord, NewMovement};
pub use snapshot::QuantitySnapshot;
pub use specimen::Specimen;
pub use status::ZooStatus;
pub use taxon::{AncestorChain, MoveSubject, TaxonAggregate, TaxonLevel};

/// Identifier of a specimen row.
pub type SpecimenId = i64;

/// Identifier of a movement (ledger) row. Insertion order breaks date ties.
pub type MovementId = i64;
