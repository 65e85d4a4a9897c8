use std::fs::File;
use std::path::PathBuf;

use derive_getters::Getters;
use eyre::{OptionExt, Result, WrapErr};
use noodles::core::region::Interval;
use noodles::csi::BinningIndex;
use noodles::{bgzf, sam};

use super::builder::ReaderBuilder;
use super::indexed_reader::IndexedReader;
use super::query::Query;
use super::record::{AlignmentRecord, FlagFilter};
use super::traits::{AlignmentSource, Batches};

/// Indexed BAM file opened for positional queries.
#[derive(Getters)]
pub struct Reader {
    filename: PathBuf,
    #[getter(skip)]
    inner: IndexedReader<bgzf::Reader<File>>,
    header: sam::Header,
    references: Vec<(String, usize)>,
    filter: FlagFilter,
    batch_size: usize,
    #[getter(skip)]
    cache: Vec<AlignmentRecord>,
}

impl Reader {
    pub(super) fn new(
        filename: PathBuf,
        inner: IndexedReader<bgzf::Reader<File>>,
        header: sam::Header,
        references: Vec<(String, usize)>,
        filter: FlagFilter,
        batch_size: usize,
    ) -> Self {
        Self {
            filename,
            inner,
            header,
            references,
            filter,
            cache: Vec::with_capacity(batch_size),
            batch_size,
        }
    }
}

impl AlignmentSource for Reader {
    fn reference_sequences(&self) -> &[(String, usize)] {
        &self.references
    }

    fn fetch<'borrow>(&'borrow mut self, sequence: &str) -> Result<Batches<'borrow>> {
        let reference_sequence_id = self
            .header
            .reference_sequences()
            .get_index_of(sequence.as_bytes())
            .ok_or_eyre(format!(
                "Reference sequence {sequence} is missing in {}",
                self.filename.display()
            ))?;

        let chunks = self
            .inner
            .index
            .query(reference_sequence_id, Interval::from(..))
            .wrap_err_with(|| format!("Failed to query the BAM index for {sequence}"))?;

        Ok(Box::new(Query::new(
            self.inner.inner.get_mut(),
            chunks,
            reference_sequence_id,
            &mut self.cache,
            self.batch_size,
            self.filter,
        )))
    }

    fn try_clone(&self) -> Result<Box<dyn AlignmentSource>> {
        let reader = ReaderBuilder::new(self.filename.clone())
            .with_inflags(self.filter.inflags)
            .with_exflags(self.filter.exflags)
            .with_batch_size(self.batch_size)
            .build()?;
        Ok(Box::new(reader))
    }
}
