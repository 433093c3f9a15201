use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub};

/// The four derived quantity counters of a specimen, or their sum over a
/// taxon's descendants.
///
/// Arithmetic is component-wise so deltas compose: `new - old` is the
/// delta pushed up the ancestor chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantitySnapshot {
    pub owned: i64,
    pub in_zoo: i64,
    pub deponated_from: i64,
    pub deponated_to: i64,
}

impl QuantitySnapshot {
    pub const ZERO: Self = Self {
        owned: 0,
        in_zoo: 0,
        deponated_from: 0,
        deponated_to: 0,
    };

    #[must_use]
    pub const fn new(owned: i64, in_zoo: i64, deponated_from: i64, deponated_to: i64) -> Self {
        Self {
            owned,
            in_zoo,
            deponated_from,
            deponated_to,
        }
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.owned == 0 && self.in_zoo == 0 && self.deponated_from == 0 && self.deponated_to == 0
    }

    /// Whether the specimen is physically absent, which requires clearing
    /// its placement fields.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        self.in_zoo == 0
    }
}

impl Add for QuantitySnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            owned: self.owned + rhs.owned,
            in_zoo: self.in_zoo + rhs.in_zoo,
            deponated_from: self.deponated_from + rhs.deponated_from,
            deponated_to: self.deponated_to + rhs.deponated_to,
        }
    }
}

impl AddAssign for QuantitySnapshot {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for QuantitySnapshot {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Neg for QuantitySnapshot {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            owned: -self.owned,
            in_zoo: -self.in_zoo,
            deponated_from: -self.deponated_from,
            deponated_to: -self.deponated_to,
        }
    }
}

impl std::iter::Sum for QuantitySnapshot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
