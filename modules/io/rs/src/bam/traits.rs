use ::higher_kinded_types::prelude::*;
use eyre::Result;

use riboprof_core_rs::LendingIterator;

use super::record::AlignmentRecord;

/// Batches of alignments for one reference sequence. Each batch lives in a buffer owned by the
/// source and is invalidated by the next call to `next`.
pub type Batches<'borrow> = Box<
    dyn 'borrow + LendingIterator<Item = For!(<'iter> = Result<&'iter [AlignmentRecord]>)>,
>;

pub trait AlignmentSource: Send + Sync {
    /// Names and lengths of all reference sequences, in header order.
    fn reference_sequences(&self) -> &[(String, usize)];

    fn reference_length(&self, sequence: &str) -> Option<usize> {
        self.reference_sequences()
            .iter()
            .find(|(name, _)| name == sequence)
            .map(|(_, length)| *length)
    }

    /// Fetch all alignments placed on the given reference sequence, in source order.
    fn fetch<'borrow>(&'borrow mut self, sequence: &str) -> Result<Batches<'borrow>>;

    /// Open an independent handle to the same data. Handles never share mutable state,
    /// so each worker thread can query its own.
    fn try_clone(&self) -> Result<Box<dyn AlignmentSource>>;
}

impl AlignmentSource for Box<dyn AlignmentSource> {
    fn reference_sequences(&self) -> &[(String, usize)] {
        (**self).reference_sequences()
    }

    fn fetch<'borrow>(&'borrow mut self, sequence: &str) -> Result<Batches<'borrow>> {
        (**self).fetch(sequence)
    }

    fn try_clone(&self) -> Result<Box<dyn AlignmentSource>> {
        (**self).try_clone()
    }
}
