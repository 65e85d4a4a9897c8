use std::path::Path;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable run parameters shared by every component of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Shortest read length to count, inclusive.
    min_read_length: usize,
    /// Longest read length to count, inclusive.
    max_read_length: usize,
    /// Flank length used when UTRs are not annotated.
    buffer: usize,
    is_three_feature_mode: bool,
    stop_codon_in_feature: bool,
    primary_id_field: String,
    secondary_id_field: Option<String>,
    feature_type: String,
    utr5_type: String,
    utr3_type: String,
    /// Sample name, used as a path component in the output container.
    dataset: String,
    threads: isize,
    queue_capacity: usize,
    compression_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_read_length: 10,
            max_read_length: 50,
            buffer: 250,
            is_three_feature_mode: true,
            stop_codon_in_feature: false,
            primary_id_field: "Name".to_owned(),
            secondary_id_field: None,
            feature_type: "CDS".to_owned(),
            utr5_type: "UTR5".to_owned(),
            utr3_type: "UTR3".to_owned(),
            dataset: String::new(),
            threads: -1,
            queue_capacity: 64,
            compression_level: 4,
        }
    }
}

impl Config {
    pub fn builder(dataset: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(dataset)
    }

    /// Load and validate parameters from a JSON file. Missing keys take their default values.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|err| {
            Error::Config(format!("failed to open {}: {err}", path.display()))
        })?;
        let config: Config = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|err| Error::Config(format!("failed to parse {}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Number of read-length rows in every matrix.
    pub fn rows(&self) -> usize {
        self.max_read_length - self.min_read_length + 1
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| -> Result<()> { Err(Error::Config(reason)) };

        let dataset = self.dataset.as_str();
        if dataset.is_empty() || dataset.contains('/') || dataset == "." || dataset == ".." {
            return fail(format!(
                "dataset must be a non-empty name without '/', got {:?}",
                self.dataset
            ));
        }
        if self.min_read_length == 0 || self.min_read_length > self.max_read_length {
            return fail(format!(
                "read lengths must satisfy 1 <= min <= max, got min={} max={}",
                self.min_read_length, self.max_read_length
            ));
        }
        if !self.is_three_feature_mode && self.buffer < 3 {
            return fail(format!(
                "buffer must hold at least a codon in single-feature mode, got {}",
                self.buffer
            ));
        }
        if self.primary_id_field.is_empty() {
            return fail("primary_id_field must not be empty".to_owned());
        }
        match &self.secondary_id_field {
            Some(field) if field.is_empty() || *field == self.primary_id_field => {
                return fail(format!(
                    "secondary_id_field must be non-empty and differ from primary_id_field, got {field:?}"
                ));
            }
            _ => {}
        }

        let types = [&self.feature_type, &self.utr5_type, &self.utr3_type];
        if types.iter().any(|x| x.is_empty()) {
            return fail("feature types must not be empty".to_owned());
        }
        if types[0] == types[1] || types[0] == types[2] || types[1] == types[2] {
            return fail(format!(
                "feature, UTR5, and UTR3 types must differ, got {types:?}"
            ));
        }
        if self.queue_capacity == 0 {
            return fail("queue_capacity must be positive".to_owned());
        }
        if self.compression_level > 9 {
            return fail(format!(
                "compression_level must be in [0, 9], got {}",
                self.compression_level
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            config: Config {
                dataset: dataset.into(),
                ..Config::default()
            },
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.config.dataset = dataset.into();
        self
    }

    pub fn with_read_lengths(mut self, min: usize, max: usize) -> Self {
        self.config.min_read_length = min;
        self.config.max_read_length = max;
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.config.buffer = buffer;
        self
    }

    pub fn with_three_feature_mode(mut self, enabled: bool) -> Self {
        self.config.is_three_feature_mode = enabled;
        self
    }

    pub fn with_stop_codon_in_feature(mut self, enabled: bool) -> Self {
        self.config.stop_codon_in_feature = enabled;
        self
    }

    pub fn with_primary_id_field(mut self, field: impl Into<String>) -> Self {
        self.config.primary_id_field = field.into();
        self
    }

    pub fn with_secondary_id_field(mut self, field: Option<String>) -> Self {
        self.config.secondary_id_field = field;
        self
    }

    pub fn with_feature_types(
        mut self,
        feature: impl Into<String>,
        utr5: impl Into<String>,
        utr3: impl Into<String>,
    ) -> Self {
        self.config.feature_type = feature.into();
        self.config.utr5_type = utr5.into();
        self.config.utr3_type = utr3.into();
        self
    }

    pub fn with_threads(mut self, threads: isize) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl From<Config> for ConfigBuilder {
    fn from(config: Config) -> Self {
        Self { config }
    }
}
