//! Paths and root attributes of a profile container.
//!
//! ```text
//! /                                  run parameters and summary as attributes
//! /<primary_id>/<dataset>/reads/     one dataset per Field
//! /<secondary_id>                    soft link to /<primary_id>
//! ```

use std::collections::BTreeMap;

use riboprof_io_rs::store::Attr;

use crate::config::{Config, ConfigBuilder};
use crate::profile::Summary;

pub const FORMAT: &str = "riboprof";
pub const FORMAT_VERSION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Data,
    BufferLeft,
    BufferRight,
    StartCodonPos,
    StopCodonPos,
    Lengths,
    ReadsByLen,
    ReadsTotal,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Data,
        Field::BufferLeft,
        Field::BufferRight,
        Field::StartCodonPos,
        Field::StopCodonPos,
        Field::Lengths,
        Field::ReadsByLen,
        Field::ReadsTotal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Data => "data",
            Field::BufferLeft => "buffer_left",
            Field::BufferRight => "buffer_right",
            Field::StartCodonPos => "start_codon_pos",
            Field::StopCodonPos => "stop_codon_pos",
            Field::Lengths => "lengths",
            Field::ReadsByLen => "reads_by_len",
            Field::ReadsTotal => "reads_total",
        }
    }
}

pub fn gene(id: &str) -> String {
    format!("/{id}")
}

pub fn reads(id: &str, dataset: &str) -> String {
    format!("/{id}/{dataset}/reads")
}

pub fn field(id: &str, dataset: &str, field: Field) -> String {
    format!("/{id}/{dataset}/reads/{}", field.name())
}

/// Root attributes describing the run. Execution settings that don't change the content
/// (threads, queue capacity, compression) are left out so that outputs stay byte-identical.
pub fn config_attrs(config: &Config) -> Vec<(&'static str, Attr)> {
    let mut attrs = vec![
        ("format", Attr::from(FORMAT)),
        ("format_version", Attr::from(FORMAT_VERSION)),
        ("dataset", Attr::from(config.dataset().as_str())),
        ("min_read_length", Attr::from(*config.min_read_length() as u64)),
        ("max_read_length", Attr::from(*config.max_read_length() as u64)),
        ("buffer", Attr::from(*config.buffer() as u64)),
        ("is_three_feature_mode", Attr::from(*config.is_three_feature_mode())),
        ("stop_codon_in_feature", Attr::from(*config.stop_codon_in_feature())),
        ("primary_id_field", Attr::from(config.primary_id_field().as_str())),
        ("feature_type", Attr::from(config.feature_type().as_str())),
        ("utr5_type", Attr::from(config.utr5_type().as_str())),
        ("utr3_type", Attr::from(config.utr3_type().as_str())),
    ];
    if let Some(field) = config.secondary_id_field() {
        attrs.push(("secondary_id_field", Attr::from(field.as_str())));
    }
    attrs
}

pub fn summary_attrs(summary: &Summary) -> Vec<(&'static str, Attr)> {
    vec![
        ("genes", Attr::from(summary.genes)),
        ("aliases", Attr::from(summary.aliases)),
        ("reads_counted", Attr::from(summary.tally.retained)),
        ("reads_out_of_range", Attr::from(summary.tally.out_of_range)),
    ]
}

fn uint(attrs: &BTreeMap<String, Attr>, key: &str) -> Result<u64, String> {
    match attrs.get(key) {
        Some(Attr::UInt(value)) => Ok(*value),
        Some(other) => Err(format!("root attribute {key} has an unexpected type: {other:?}")),
        None => Err(format!("root attribute {key} is missing")),
    }
}

fn string(attrs: &BTreeMap<String, Attr>, key: &str) -> Result<String, String> {
    match attrs.get(key) {
        Some(Attr::Str(value)) => Ok(value.clone()),
        Some(other) => Err(format!("root attribute {key} has an unexpected type: {other:?}")),
        None => Err(format!("root attribute {key} is missing")),
    }
}

/// Rebuild the run parameters from root attributes. Execution settings take their defaults.
pub fn config_from_attrs(attrs: &BTreeMap<String, Attr>) -> Result<ConfigBuilder, String> {
    let format = string(attrs, "format")?;
    if format != FORMAT {
        return Err(format!("not a {FORMAT} container (format = {format:?})"));
    }
    let version = uint(attrs, "format_version")?;
    if version != FORMAT_VERSION {
        return Err(format!("unsupported {FORMAT} container version {version}"));
    }

    let secondary = match attrs.get("secondary_id_field") {
        None => None,
        Some(_) => Some(string(attrs, "secondary_id_field")?),
    };
    let builder = Config::builder(string(attrs, "dataset")?)
        .with_read_lengths(
            uint(attrs, "min_read_length")? as usize,
            uint(attrs, "max_read_length")? as usize,
        )
        .with_buffer(uint(attrs, "buffer")? as usize)
        .with_three_feature_mode(uint(attrs, "is_three_feature_mode")? != 0)
        .with_stop_codon_in_feature(uint(attrs, "stop_codon_in_feature")? != 0)
        .with_primary_id_field(string(attrs, "primary_id_field")?)
        .with_secondary_id_field(secondary)
        .with_feature_types(
            string(attrs, "feature_type")?,
            string(attrs, "utr5_type")?,
            string(attrs, "utr3_type")?,
        );
    Ok(builder)
}
