use std::fmt::Display;

use derive_getters::Dissolve;
use eyre::{eyre, Result};

use crate::num::PrimInt;

/// Interval is a half-open genomic region [start, end).
/// Unlike a Rust-native Range, empty intervals (start == end) and intervals with
/// negative length (start > end) can't be constructed.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Dissolve)]
pub struct Interval<Idx: PrimInt> {
    start: Idx,
    end: Idx,
}

impl<Idx: PrimInt> Interval<Idx> {
    pub fn new(start: Idx, end: Idx) -> Result<Self> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(eyre!("Invalid interval: start >= end ({start} >= {end})"))
        }
    }

    /// Build the interval from 1-based inclusive coordinates, as used by GFF/GTF files.
    pub fn from_closed(start: Idx, end: Idx) -> Result<Self> {
        if start < Idx::one() || end < start {
            return Err(eyre!("Invalid 1-based closed interval: [{start}, {end}]"));
        }
        Ok(Self {
            start: start - Idx::one(),
            end,
        })
    }

    /// 1-based inclusive coordinates of the interval.
    pub fn closed(&self) -> (Idx, Idx) {
        (self.start + Idx::one(), self.end)
    }

    #[inline(always)]
    pub fn start(&self) -> Idx {
        self.start
    }

    #[inline(always)]
    pub fn end(&self) -> Idx {
        self.end
    }

    pub fn len(&self) -> Idx {
        self.end - self.start
    }

    pub fn contains(&self, pos: Idx) -> bool {
        self.start <= pos && pos < self.end
    }

    /// The condition is strict and doesn't allow touching intervals.
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn touches(&self, other: &Self) -> bool {
        self.start == other.end || self.end == other.start
    }

    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn cast<T: PrimInt>(&self) -> Option<Interval<T>> {
        match (::num::cast(self.start), ::num::cast(self.end)) {
            (Some(start), Some(end)) => Some(Interval { start, end }),
            _ => None,
        }
    }
}

impl<Idx: PrimInt> Display for Interval<Idx> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl<Idx: PrimInt> TryFrom<(Idx, Idx)> for Interval<Idx> {
    type Error = eyre::Report;

    fn try_from(value: (Idx, Idx)) -> Result<Self> {
        Self::new(value.0, value.1)
    }
}
