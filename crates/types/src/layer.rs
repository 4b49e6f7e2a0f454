//! Layer and epoch arithmetic.
//!
//! A layer is a single block height, the unit of Hare consensus. An epoch
//! is a fixed-length run of layers sharing a beacon and active set. The
//! layers-per-epoch ratio is a chain parameter supplied by configuration,
//! so epoch derivation takes it as an explicit argument.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A block height. Monotonically increasing, 32-bit.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Encode, Decode, Serialize, Deserialize,
)]
pub struct LayerId(u32);

impl LayerId {
    /// Creates a layer id from a raw height.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw height.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The epoch this layer belongs to.
    #[inline]
    pub fn epoch(self, layers_per_epoch: u32) -> EpochId {
        EpochId::new(self.0 / layers_per_epoch)
    }

    /// The layer directly after this one.
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Add<u32> for LayerId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub<u32> for LayerId {
    type Output = Self;

    fn sub(self, rhs: u32) -> Self {
        Self(self.0.saturating_sub(rhs))
    }
}

impl From<u32> for LayerId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An epoch number: `layer / layers_per_epoch`.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Encode, Decode, Serialize, Deserialize,
)]
pub struct EpochId(u32);

impl EpochId {
    /// Creates an epoch id from a raw number.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw epoch number.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The epoch before this one, saturating at zero.
    #[inline]
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Debug for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EpochId({})", self.0)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_derivation() {
        assert_eq!(LayerId::new(0).epoch(4032).get(), 0);
        assert_eq!(LayerId::new(4031).epoch(4032).get(), 0);
        assert_eq!(LayerId::new(4032).epoch(4032).get(), 1);
        assert_eq!(LayerId::new(10_000).epoch(4032).get(), 2);
    }

    #[test]
    fn layer_arithmetic() {
        let layer = LayerId::new(10);
        assert_eq!(layer.next().get(), 11);
        assert_eq!((layer + 5).get(), 15);
        assert_eq!((layer - 20).get(), 0);
    }

    #[test]
    fn epoch_prev_saturates() {
        assert_eq!(EpochId::new(0).prev().get(), 0);
        assert_eq!(EpochId::new(3).prev().get(), 2);
    }
}
