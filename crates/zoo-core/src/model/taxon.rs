use serde::{Deserialize, Serialize};
use std::fmt;

use super::{QuantitySnapshot, ZooStatus};

/// One level of the taxonomic hierarchy, lowest first.
///
/// Species rows only link specimens to a genus; the five levels above carry
/// a [`TaxonAggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonLevel {
    Species,
    Genus,
    Family,
    Order,
    Class,
    Phylum,
}

impl TaxonLevel {
    /// Levels that carry aggregate counters, lowest first.
    pub const AGGREGATE_LEVELS: [Self; 5] =
        [Self::Genus, Self::Family, Self::Order, Self::Class, Self::Phylum];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Species => "species",
            Self::Genus => "genus",
            Self::Family => "family",
            Self::Order => "order",
            Self::Class => "class",
            Self::Phylum => "phylum",
        }
    }

    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Species => Some(Self::Genus),
            Self::Genus => Some(Self::Family),
            Self::Family => Some(Self::Order),
            Self::Order => Some(Self::Class),
            Self::Class => Some(Self::Phylum),
            Self::Phylum => None,
        }
    }

    #[must_use]
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::Species => None,
            Self::Genus => Some(Self::Species),
            Self::Family => Some(Self::Genus),
            Self::Order => Some(Self::Family),
            Self::Class => Some(Self::Order),
            Self::Phylum => Some(Self::Class),
        }
    }

    #[must_use]
    pub const fn has_aggregate(self) -> bool {
        !matches!(self, Self::Species)
    }

    /// Only a class may lack a parent (phylum is optional).
    #[must_use]
    pub const fn parent_optional(self) -> bool {
        matches!(self, Self::Class)
    }

    pub(crate) const fn table(self) -> &'static str {
        match self {
            Self::Species => "species",
            Self::Genus => "genera",
            Self::Family => "families",
            Self::Order => "orders",
            Self::Class => "classes",
            Self::Phylum => "phyla",
        }
    }

    pub(crate) const fn id_column(self) -> &'static str {
        match self {
            Self::Species => "species_id",
            Self::Genus => "genus_id",
            Self::Family => "family_id",
            Self::Order => "order_id",
            Self::Class => "class_id",
            Self::Phylum => "phylum_id",
        }
    }

    /// Column on this level's table referencing the parent row.
    pub(crate) const fn parent_column(self) -> Option<&'static str> {
        match self.parent() {
            Some(parent) => Some(parent.id_column()),
            None => None,
        }
    }
}

impl fmt::Display for TaxonLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hierarchy move relocates: specimens between species, or taxa of
/// one level between parents of the next level up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveSubject {
    Specimen,
    Taxon(TaxonLevel),
}

impl MoveSubject {
    /// Level of the rows the subject is attached to.
    #[must_use]
    pub const fn parent_level(self) -> Option<TaxonLevel> {
        match self {
            Self::Specimen => Some(TaxonLevel::Species),
            Self::Taxon(level) => level.parent(),
        }
    }

    pub(crate) const fn table(self) -> &'static str {
        match self {
            Self::Specimen => "specimens",
            Self::Taxon(level) => level.table(),
        }
    }

    pub(crate) const fn id_column(self) -> &'static str {
        match self {
            Self::Specimen => "specimen_id",
            Self::Taxon(level) => level.id_column(),
        }
    }

    pub(crate) const fn parent_column(self) -> Option<&'static str> {
        match self {
            Self::Specimen => Some("species_id"),
            Self::Taxon(level) => level.parent_column(),
        }
    }
}

impl fmt::Display for MoveSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specimen => f.write_str("specimen"),
            Self::Taxon(level) => f.write_str(level.as_str()),
        }
    }
}

/// Denormalized counters of one Genus/Family/Order/Class/Phylum row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonAggregate {
    pub level: TaxonLevel,
    pub id: i64,
    pub parent_id: Option<i64>,
    pub quantities: QuantitySnapshot,
    pub status: ZooStatus,
}

/// Path from a starting row up to the root, lowest level first.
///
/// For a specimen the path starts at its species; for a move target it
/// starts at the target row itself. The path always ends at a class
/// without phylum or at a phylum.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AncestorChain {
    links: Vec<(TaxonLevel, i64)>,
}

impl AncestorChain {
    pub(crate) const fn from_links(links: Vec<(TaxonLevel, i64)>) -> Self {
        Self { links }
    }

    #[must_use]
    pub fn links(&self) -> &[(TaxonLevel, i64)] {
        &self.links
    }

    /// Id of the row at `level`, if the path passes through it.
    #[must_use]
    pub fn id_at(&self, level: TaxonLevel) -> Option<i64> {
        self.links
            .iter()
            .find_map(|&(l, id)| (l == level).then_some(id))
    }

    /// Rows on the path that carry aggregate counters.
    pub fn aggregate_links(&self) -> impl Iterator<Item = (TaxonLevel, i64)> + '_ {
        self.links
            .iter()
            .copied()
            .filter(|(level, _)| level.has_aggregate())
    }
}
