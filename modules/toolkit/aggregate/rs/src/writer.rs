use std::path::{Path, PathBuf};

use riboprof_io_rs::store::Writer;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::layout::{self, Field};
use crate::profile::{GeneProfile, Summary};
use crate::window::GeneWindow;

/// Single point of serialization for a run: writes gene entries in the order they are given,
/// then alias links and run attributes on `finish`.
pub struct ProfileWriter {
    path: PathBuf,
    dataset: String,
    inner: Writer,
    aliases: Vec<(String, String)>,
}

impl ProfileWriter {
    /// Start writing. Fails if another run holds the partial file of the same output.
    pub fn create(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let storage = |err| Error::storage(&path, err);

        let mut inner = Writer::create(&path)
            .and_then(|x| x.with_compression(*config.compression_level()))
            .map_err(storage)?;
        for (key, value) in layout::config_attrs(config) {
            inner.set_attr("/", key, value).map_err(storage)?;
        }

        Ok(Self {
            dataset: config.dataset().clone(),
            inner,
            aliases: Vec::new(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, window: &GeneWindow, profile: &GeneProfile) -> Result<()> {
        let id = window.primary_id();
        let dataset = self.dataset.as_str();
        let storage = |err| Error::storage(&self.path, err);

        let (rows, cols) = profile.data.shape();
        let scalars = [
            (Field::BufferLeft, profile.buffer_left),
            (Field::BufferRight, profile.buffer_right),
        ];

        self.inner
            .create_group(&layout::reads(id, dataset))
            .map_err(storage)?;
        self.inner
            .write_dataset(
                &layout::field(id, dataset, Field::Data),
                &[rows, cols],
                profile.data.values().to_vec(),
            )
            .map_err(storage)?;
        for (field, value) in scalars {
            self.inner
                .write_dataset(&layout::field(id, dataset, field), &[], vec![value])
                .map_err(storage)?;
        }
        for (field, codon) in [
            (Field::StartCodonPos, profile.start_codon_pos),
            (Field::StopCodonPos, profile.stop_codon_pos),
        ] {
            self.inner
                .write_dataset(&layout::field(id, dataset, field), &[3], codon.to_vec())
                .map_err(storage)?;
        }
        self.inner
            .write_dataset(
                &layout::field(id, dataset, Field::Lengths),
                &[profile.lengths.len()],
                profile.lengths.clone(),
            )
            .map_err(storage)?;
        self.inner
            .write_dataset(
                &layout::field(id, dataset, Field::ReadsByLen),
                &[profile.reads_by_len.len()],
                profile.reads_by_len.clone(),
            )
            .map_err(storage)?;
        self.inner
            .write_dataset(
                &layout::field(id, dataset, Field::ReadsTotal),
                &[],
                vec![profile.reads_total],
            )
            .map_err(storage)?;

        if let Some(secondary) = window.secondary_id() {
            self.aliases.push((id.clone(), secondary.clone()));
        }
        Ok(())
    }

    /// Link aliases, record the summary, and move the container into place.
    pub fn finish(mut self, summary: &Summary) -> Result<PathBuf> {
        let path = self.path.clone();
        let storage = |err| Error::storage(&path, err);

        for (primary, secondary) in std::mem::take(&mut self.aliases) {
            self.inner
                .link_soft(&layout::gene(&primary), &layout::gene(&secondary))
                .map_err(storage)?;
        }
        for (key, value) in layout::summary_attrs(summary) {
            self.inner.set_attr("/", key, value).map_err(storage)?;
        }
        self.inner.finish().map_err(storage)
    }

    /// Drop everything written so far, leaving no file behind.
    pub fn abort(self) {
        log::debug!("Discarding the partial output for {}", self.path.display());
        self.inner.abort()
    }
}
