//! zoo-core library.
//!
//! Derives specimen stock from the movement ledger, keeps the taxonomic
//! aggregates (genus up to phylum) in step with it, and reconstructs stock
//! for past dates by streaming the ledger in pages.
//!
//! # Conventions
//!
//! - **Errors**: engine operations return [`error::Result`] with an
//!   [`error::EngineError`]; configuration and store opening use
//!   `anyhow::Result`.
//! - **Logging**: `tracing` macros with structured fields.
//! - **Transactions**: operations take a `&Connection` and never open a
//!   transaction themselves. Wrap mutations in [`db::write_transaction`].

pub mod calc;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod mutate;
pub mod rebuild;
pub mod reconstruct;
pub mod rollup;
pub mod verify;

pub use config::{EngineConfig, ReasonRules};
pub use error::{EngineError, ErrorCode};
pub use model::{MovementDate, MovementRecord, NewMovement, QuantitySnapshot, TaxonLevel, ZooStatus};
