use ::higher_kinded_types::prelude::*;

use riboprof_core_rs::LendingIterator;
use riboprof_io_rs::bam::{AlignmentRecord, AlignmentSource, Batches};

use crate::error::{Error, Result};

/// Any flag bit except "secondary alignment" (0x100) disqualifies a record.
pub const EXCLUDED_FLAGS: u16 = !0x100;

/// Only primary or secondary alignments that are mapped, on the forward strand, and pass
/// QC are analyzable, i.e. records with flag 0 or 256.
#[inline(always)]
pub fn is_retained(flag: u16) -> bool {
    flag & EXCLUDED_FLAGS == 0
}

/// Streams retained alignments of a reference sequence out of an alignment source.
pub struct AlignmentFilter<'s> {
    source: &'s mut dyn AlignmentSource,
}

impl<'s> AlignmentFilter<'s> {
    pub fn new(source: &'s mut dyn AlignmentSource) -> Self {
        Self { source }
    }

    /// Lazily iterate over retained records of the sequence in source order.
    /// Every call starts a fresh pass over the sequence.
    pub fn retained(&mut self, sequence: &str) -> Result<Retained<'_>> {
        if self.source.reference_length(sequence).is_none() {
            return Err(Error::input(
                sequence,
                "sequence is absent from the alignment header",
            ));
        }

        let inner = self
            .source
            .fetch(sequence)
            .map_err(|err| Error::input(sequence, format!("{err:#}")))?;
        Ok(Retained {
            sequence: sequence.to_owned(),
            inner,
            buffer: Vec::new(),
        })
    }
}

pub struct Retained<'b> {
    sequence: String,
    inner: Batches<'b>,
    buffer: Vec<AlignmentRecord>,
}

impl LendingIterator for Retained<'_> {
    type Item = For!(<'iter> = Result<&'iter [AlignmentRecord]>);

    fn next(&'_ mut self) -> Option<<Self::Item as ForLt>::Of<'_>> {
        loop {
            let batch = match self.inner.next()? {
                Ok(batch) => batch,
                Err(err) => return Some(Err(Error::input(&self.sequence, format!("{err:#}")))),
            };

            self.buffer.clear();
            self.buffer
                .extend(batch.iter().filter(|x| is_retained(x.flag)).copied());
            if !self.buffer.is_empty() {
                return Some(Ok(self.buffer.as_slice()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use riboprof_io_rs::bam::Loaded;

    use super::*;

    #[test]
    fn test_retained_flags() {
        let retained = [0, 256];
        for flag in [0u16, 1, 2, 4, 16, 256, 272, 512, 1024, 2048, 4095] {
            assert_eq!(is_retained(flag), retained.contains(&flag), "{flag}");
        }
    }

    #[test]
    fn test_filter_sequence() -> Result<()> {
        let records = vec![
            AlignmentRecord::new(10, 28, 0),
            AlignmentRecord::new(11, 28, 4),
            AlignmentRecord::new(12, 28, 16),
            AlignmentRecord::new(13, 28, 256),
            AlignmentRecord::new(14, 28, 1024),
        ];
        let mut source = Loaded::new(
            vec![("chr1".to_owned(), 100), ("chr2".to_owned(), 100)],
            [
                ("chr1".to_owned(), records),
                ("chr2".to_owned(), vec![AlignmentRecord::new(1, 28, 0)]),
            ],
        )
        .map_err(|err| Error::input("chr1", err.to_string()))?
        .with_batch_size(2);

        let mut filter = AlignmentFilter::new(&mut source);
        for _ in 0..2 {
            let mut retained = filter.retained("chr1")?;
            let mut collected = Vec::new();
            while let Some(batch) = retained.next() {
                collected.extend_from_slice(batch?);
            }
            assert_eq!(
                collected,
                vec![
                    AlignmentRecord::new(10, 28, 0),
                    AlignmentRecord::new(13, 28, 256)
                ]
            );
        }

        assert!(matches!(
            filter.retained("chrM"),
            Err(Error::Input { sequence, .. }) if sequence == "chrM"
        ));
        Ok(())
    }
}
