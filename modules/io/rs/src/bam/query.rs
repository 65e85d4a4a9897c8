use ::higher_kinded_types::prelude::*;
use eyre::{Result, WrapErr};
use noodles::{
    bam, bam::io::Reader, bgzf, csi, csi::binning_index::index::reference_sequence::bin::Chunk,
};

use riboprof_core_rs::LendingIterator;

use super::record::{AlignmentRecord, FlagFilter};

/// Positional query over a BAM file, converting records into batches of `AlignmentRecord`.
pub struct Query<'a, R> {
    reader: Reader<csi::io::Query<'a, R>>,
    reference_sequence_id: usize,
    record: bam::Record,
    cache: &'a mut Vec<AlignmentRecord>,
    batch_size: usize,
    filter: FlagFilter,
}

impl<'a, R> Query<'a, R>
where
    R: bgzf::io::BufRead + bgzf::io::Seek,
{
    pub fn new(
        reader: &'a mut R,
        chunks: Vec<Chunk>,
        reference_sequence_id: usize,
        cache: &'a mut Vec<AlignmentRecord>,
        batch_size: usize,
        filter: FlagFilter,
    ) -> Self {
        Self {
            reader: Reader::from(csi::io::Query::new(reader, chunks)),
            reference_sequence_id,
            record: bam::Record::default(),
            cache,
            batch_size: batch_size.max(1),
            filter,
        }
    }

    /// Convert the current record, returning None if it must be skipped.
    fn convert(&self) -> Result<Option<AlignmentRecord>> {
        let flag = u16::from(self.record.flags());
        if !self.filter.passes(flag) {
            return Ok(None);
        }

        match (
            self.record.reference_sequence_id().transpose()?,
            self.record.alignment_start().transpose()?,
        ) {
            (Some(id), Some(start)) if id == self.reference_sequence_id => {
                let length = AlignmentRecord::query_length(
                    &self.record.cigar(),
                    self.record.sequence().len(),
                )?;
                Ok(Some(AlignmentRecord::new(start.get(), length, flag)))
            }
            _ => Ok(None),
        }
    }

    fn read(&mut self) -> Result<usize> {
        self.cache.clear();
        while self.cache.len() < self.batch_size {
            if self
                .reader
                .read_record(&mut self.record)
                .wrap_err("Failed to read a BAM record")?
                == 0
            {
                break;
            }

            if let Some(record) = self.convert()? {
                self.cache.push(record);
            }
        }
        Ok(self.cache.len())
    }
}

impl<R> LendingIterator for Query<'_, R>
where
    R: bgzf::io::BufRead + bgzf::io::Seek,
{
    type Item = For!(<'iter> = Result<&'iter [AlignmentRecord]>);

    fn next(&'_ mut self) -> Option<<Self::Item as ForLt>::Of<'_>> {
        match self.read() {
            Ok(0) => None,
            Ok(_) => Some(Ok(self.cache.as_slice())),
            Err(e) => Some(Err(e)),
        }
    }
}
