use std::path::PathBuf;

use eyre::{Result, WrapErr};

use super::indexed_reader::IndexedReader;
use super::reader::Reader;
use super::record::FlagFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderBuilder {
    filename: PathBuf,
    inflags: Option<u16>,
    exflags: Option<u16>,
    batch_size: Option<usize>,
}

impl ReaderBuilder {
    pub const DEFAULT_BATCH_SIZE: usize = 1024;

    pub fn new<T: Into<PathBuf>>(filename: T) -> Self {
        Self {
            filename: filename.into(),
            inflags: None,
            exflags: None,
            batch_size: None,
        }
    }

    pub fn with_inflags(mut self, inflags: u16) -> Self {
        self.inflags = Some(inflags);
        self
    }

    pub fn with_exflags(mut self, exflags: u16) -> Self {
        self.exflags = Some(exflags);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn build(self) -> Result<Reader> {
        let mut reader = IndexedReader::new(&self.filename)?;
        let header = reader
            .inner
            .read_header()
            .wrap_err_with(|| format!("Failed to read the BAM header: {}", self.filename.display()))?;

        let mut references = Vec::with_capacity(header.reference_sequences().len());
        for (name, sequence) in header.reference_sequences() {
            references.push((name.to_string(), sequence.length().get()));
        }

        // No masks by default: flag-based filtering belongs to the caller
        let filter = FlagFilter::new(self.inflags.unwrap_or(0), self.exflags.unwrap_or(0));
        let batch_size = self.batch_size.unwrap_or(Self::DEFAULT_BATCH_SIZE);

        Ok(Reader::new(
            self.filename,
            reader,
            header,
            references,
            filter,
            batch_size,
        ))
    }
}
