use serde::{Deserialize, Serialize};

use super::{QuantitySnapshot, SpecimenId};

/// Current-state projection of one specimen.
///
/// `location_id` and `organization_level_id` describe where the specimen is
/// kept; both are cleared whenever `quantities.in_zoo` drops to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specimen {
    pub specimen_id: SpecimenId,
    pub species_id: i64,
    pub quantities: QuantitySnapshot,
    pub location_id: Option<i64>,
    pub organization_level_id: Option<i64>,
}

impl Specimen {
    #[must_use]
    pub const fn is_placed(&self) -> bool {
        self.location_id.is_some() || self.organization_level_id.is_some()
    }
}
