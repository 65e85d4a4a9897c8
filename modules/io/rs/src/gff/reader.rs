use std::io::BufRead;
use std::path::Path;

use eyre::{bail, ensure, OptionExt, Result, WrapErr};
use riboprof_core_rs::loc::{Interval, Orientation};

use super::record::Record;
use crate::compression;

pub mod parse {
    use super::*;

    pub fn column<'a>(parts: &mut impl Iterator<Item = &'a str>, name: &str) -> Result<&'a str> {
        parts
            .next()
            .ok_or_else(|| eyre::eyre!("Missing GFF {name} column"))
    }

    pub fn interval<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<Interval<u64>> {
        let start = column(parts, "start")?;
        let end = column(parts, "end")?;

        let (start, end) = match (start.parse::<u64>(), end.parse::<u64>()) {
            (Ok(start), Ok(end)) => (start, end),
            _ => bail!("Invalid GFF coordinates: {start}-{end}"),
        };
        Interval::from_closed(start, end).wrap_err("Invalid GFF interval")
    }

    pub fn score<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<Option<f64>> {
        match column(parts, "score")? {
            "." => Ok(None),
            score => Ok(Some(score.parse().wrap_err("Invalid GFF score")?)),
        }
    }

    pub fn orientation<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<Orientation> {
        let strand = column(parts, "strand")?;
        let mut chars = strand.chars();
        match (chars.next(), chars.next()) {
            (Some(symbol), None) => {
                Orientation::try_from(symbol).map_err(|_| eyre::eyre!("Invalid GFF strand: {strand}"))
            }
            _ => bail!("Invalid GFF strand: {strand}"),
        }
    }

    pub fn phase<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<Option<u8>> {
        match column(parts, "phase")? {
            "." => Ok(None),
            phase => {
                let phase = phase.parse::<u8>().wrap_err("Invalid GFF phase")?;
                ensure!(phase < 3, "GFF phase must be 0, 1, or 2");
                Ok(Some(phase))
            }
        }
    }

    pub fn unescape(value: &str) -> Result<String> {
        if !value.contains('%') {
            return Ok(value.to_owned());
        }

        let bytes = value.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut ind = 0;
        while ind < bytes.len() {
            if bytes[ind] == b'%' {
                let hex = value
                    .get(ind + 1..ind + 3)
                    .ok_or_eyre("Truncated %-escape in GFF attribute")?;
                let byte = u8::from_str_radix(hex, 16)
                    .wrap_err_with(|| format!("Invalid %-escape in GFF attribute: %{hex}"))?;
                decoded.push(byte);
                ind += 3;
            } else {
                decoded.push(bytes[ind]);
                ind += 1;
            }
        }
        String::from_utf8(decoded).wrap_err("GFF attribute is not valid UTF-8 after unescaping")
    }

    pub fn attributes<'a>(
        parts: &mut impl Iterator<Item = &'a str>,
    ) -> Result<Vec<(String, String)>> {
        let column = match parts.next() {
            None | Some(".") | Some("") => return Ok(Vec::new()),
            Some(column) => column,
        };

        let mut attributes = Vec::new();
        for pair in column.split(';').map(str::trim).filter(|x| !x.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| eyre::eyre!("GFF attribute without a value: {pair}"))?;
            attributes.push((unescape(key.trim())?, unescape(value.trim())?));
        }
        Ok(attributes)
    }

    pub fn record<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<Record> {
        let seqid = column(parts, "seqid")?.to_owned();
        let source = column(parts, "source")?.to_owned();
        let feature = column(parts, "type")?.to_owned();
        let interval = interval(parts)?;
        let score = score(parts)?;
        let orientation = orientation(parts)?;
        let phase = phase(parts)?;
        let attributes = attributes(parts)?;

        Ok(Record::new(
            seqid,
            source,
            feature,
            interval,
            score,
            orientation,
            phase,
            attributes,
        ))
    }
}

pub struct Reader<R> {
    reader: R,
    buffer: String,
    line: usize,
    finished: bool,
}

impl<R: BufRead> Reader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            line: 0,
            finished: false,
        }
    }

    /// Parse the next feature, skipping comments, directives, and blank lines.
    /// Returns None once the feature section is over.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        while !self.finished {
            self.buffer.clear();
            self.line += 1;
            if self.reader.read_line(&mut self.buffer)? == 0 {
                self.finished = true;
                break;
            }

            let line = self.buffer.trim_end_matches(['\n', '\r']);
            if line.starts_with("##FASTA") || line.starts_with('>') {
                self.finished = true;
                break;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split('\t');
            let record = parse::record(&mut parts)
                .wrap_err_with(|| format!("Failed to parse GFF line {}: {}", self.line, line))?;
            ensure!(
                parts.next().is_none(),
                "GFF line {} has too many columns: {}",
                self.line,
                line
            );
            return Ok(Some(record));
        }
        Ok(None)
    }

    /// Read the remaining records and append them to the given vector. Returns the number of records read.
    pub fn read_to_end(&mut self, into: &mut Vec<Record>) -> Result<usize> {
        let mut total = 0;
        while let Some(record) = self.read_record()? {
            into.push(record);
            total += 1;
        }
        Ok(total)
    }
}

impl Reader<Box<dyn BufRead + Send + Sync + 'static>> {
    /// Create a new GFF reader from the given file path.
    /// Gzip compression is detected from the file signature.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let stream = compression::read_file(path)?;
        Ok(Self::new(stream.box_bufread()))
    }
}
