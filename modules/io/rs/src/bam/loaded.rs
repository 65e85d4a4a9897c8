use std::path::Path;
use std::sync::Arc;

use ::higher_kinded_types::prelude::*;
use ahash::HashMap;
use eyre::{ensure, OptionExt, Result, WrapErr};
use noodles::sam;

use riboprof_core_rs::LendingIterator;

use super::builder::ReaderBuilder;
use super::record::{AlignmentRecord, FlagFilter};
use super::traits::{AlignmentSource, Batches};

/// Alignments held in memory, grouped by reference sequence.
/// Clones share the underlying records and only own their batch buffer.
#[derive(Debug)]
pub struct Loaded {
    references: Arc<Vec<(String, usize)>>,
    records: Arc<HashMap<String, Vec<AlignmentRecord>>>,
    filter: FlagFilter,
    batch_size: usize,
    cache: Vec<AlignmentRecord>,
}

impl Loaded {
    /// Records are given per reference sequence; every sequence must be declared in `references`.
    pub fn new(
        references: Vec<(String, usize)>,
        records: impl IntoIterator<Item = (String, Vec<AlignmentRecord>)>,
    ) -> Result<Self> {
        let mut grouped = HashMap::default();
        for (name, _) in &references {
            ensure!(
                grouped.insert(name.clone(), Vec::new()).is_none(),
                "Duplicated reference sequence: {name}"
            );
        }
        for (name, batch) in records {
            grouped
                .get_mut(&name)
                .ok_or_eyre(format!("Records for an undeclared reference sequence: {name}"))?
                .extend(batch);
        }

        Ok(Self {
            references: Arc::new(references),
            records: Arc::new(grouped),
            filter: FlagFilter::default(),
            batch_size: ReaderBuilder::DEFAULT_BATCH_SIZE,
            cache: Vec::new(),
        })
    }

    /// Load all placed alignments from a SAM file. Reference lengths come from its @SQ header lines.
    pub fn from_sam_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = sam::io::reader::Builder::default()
            .build_from_path(path)
            .wrap_err_with(|| format!("Failed to open SAM file {}", path.display()))?;
        let header = reader
            .read_header()
            .wrap_err_with(|| format!("Failed to read the SAM header: {}", path.display()))?;

        let references = header
            .reference_sequences()
            .iter()
            .map(|(name, sequence)| (name.to_string(), sequence.length().get()))
            .collect::<Vec<_>>();

        let mut records: Vec<Vec<AlignmentRecord>> = vec![Vec::new(); references.len()];
        for (ind, result) in reader.record_bufs(&header).enumerate() {
            let record = result
                .wrap_err_with(|| format!("Failed to parse SAM record #{} in {}", ind + 1, path.display()))?;

            match (record.reference_sequence_id(), record.alignment_start()) {
                (Some(id), Some(start)) => {
                    let length =
                        AlignmentRecord::query_length(record.cigar(), record.sequence().len())?;
                    records[id].push(AlignmentRecord::new(
                        start.get(),
                        length,
                        u16::from(record.flags()),
                    ))
                }
                _ => log::debug!("Skipping an unplaced SAM record #{}", ind + 1),
            }
        }

        let named = references
            .iter()
            .map(|(name, _)| name.clone())
            .zip(records)
            .collect::<Vec<_>>();
        Self::new(references, named)
    }

    pub fn with_filter(mut self, filter: FlagFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// All records on the sequence, ignoring the flag filter.
    pub fn records(&self, sequence: &str) -> Option<&[AlignmentRecord]> {
        self.records.get(sequence).map(Vec::as_slice)
    }
}

impl Clone for Loaded {
    fn clone(&self) -> Self {
        Self {
            references: Arc::clone(&self.references),
            records: Arc::clone(&self.records),
            filter: self.filter,
            batch_size: self.batch_size,
            cache: Vec::new(),
        }
    }
}

impl AlignmentSource for Loaded {
    fn reference_sequences(&self) -> &[(String, usize)] {
        &self.references
    }

    fn fetch<'borrow>(&'borrow mut self, sequence: &str) -> Result<Batches<'borrow>> {
        let records = self
            .records
            .get(sequence)
            .ok_or_eyre(format!("Reference sequence {sequence} is missing"))?;

        Ok(Box::new(LoadedQuery {
            records: records.as_slice(),
            position: 0,
            cache: &mut self.cache,
            batch_size: self.batch_size,
            filter: self.filter,
        }))
    }

    fn try_clone(&self) -> Result<Box<dyn AlignmentSource>> {
        Ok(Box::new(self.clone()))
    }
}

struct LoadedQuery<'a> {
    records: &'a [AlignmentRecord],
    position: usize,
    cache: &'a mut Vec<AlignmentRecord>,
    batch_size: usize,
    filter: FlagFilter,
}

impl LendingIterator for LoadedQuery<'_> {
    type Item = For!(<'iter> = Result<&'iter [AlignmentRecord]>);

    fn next(&'_ mut self) -> Option<<Self::Item as ForLt>::Of<'_>> {
        self.cache.clear();
        while self.cache.len() < self.batch_size && self.position < self.records.len() {
            let record = self.records[self.position];
            self.position += 1;
            if self.filter.passes(record.flag) {
                self.cache.push(record);
            }
        }

        if self.cache.is_empty() {
            None
        } else {
            Some(Ok(self.cache.as_slice()))
        }
    }
}
