use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::Path;

use derive_getters::Getters;
use riboprof_core_rs::LendingIterator;
use riboprof_io_rs::bam::AlignmentSource;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::profile::GeneProfile;
use crate::resolver::GeneModelResolver;
use crate::store::ProfileStore;
use crate::window::GeneWindow;

/// A stored value that differs from the one recomputed from the inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub gene: String,
    pub sequence: String,
    pub field: String,
    pub position: Option<i64>,
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
pub struct ValidationReport {
    genes_checked: usize,
    aliases_checked: usize,
    reads_counted: u64,
    /// Reads dropped from each gene for out-of-range length, in annotation order.
    out_of_range: Vec<(String, u64)>,
    mismatches: Vec<Mismatch>,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.out_of_range.iter().map(|(_, x)| x).sum()
    }

    /// Fail with the first mismatch, if any.
    pub fn ensure(self) -> Result<Self> {
        match self.mismatches.first() {
            None => Ok(self),
            Some(first) => Err(Error::consistency(
                &first.gene,
                &first.sequence,
                first.position,
                format!(
                    "{} differs: expected {}, found {} ({} mismatches in total)",
                    first.field,
                    first.expected,
                    first.found,
                    self.mismatches.len()
                ),
            )),
        }
    }
}

/// Sparse recount of one gene: (row, column) -> reads.
#[derive(Debug, Default)]
struct Recount {
    cells: BTreeMap<(usize, usize), u64>,
    counted: u64,
    dropped: u64,
}

/// Recomputes every stored quantity straight from the annotation and the alignments.
pub struct Validator {
    config: Config,
}

impl Validator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Use the run parameters recorded in the container.
    pub fn for_store(store: &ProfileStore) -> Result<Self> {
        Ok(Self::new(store.config()?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validate_path(
        &self,
        store: &ProfileStore,
        annotation: impl AsRef<Path>,
        source: &mut dyn AlignmentSource,
    ) -> Result<ValidationReport> {
        let windows = GeneModelResolver::new(&self.config).resolve_path(annotation)?;
        self.validate(store, &windows, source)
    }

    pub fn validate(
        &self,
        store: &ProfileStore,
        windows: &[GeneWindow],
        source: &mut dyn AlignmentSource,
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let mut expected_entries = BTreeSet::new();

        for window in windows {
            expected_entries.insert(window.primary_id().clone());
            let recount = self.recount(window, source, &mut report)?;
            report.genes_checked += 1;
            report.reads_counted += recount.counted;
            report
                .out_of_range
                .push((window.primary_id().clone(), recount.dropped));

            let primary = match store.read(window.primary_id()) {
                Ok(profile) => {
                    self.compare(window, &recount, &profile, &mut report);
                    Some(profile)
                }
                Err(err) => {
                    mismatch(&mut report, window, "entry", "a readable profile", err.to_string());
                    None
                }
            };

            // The alias is expected even when the primary entry is broken
            if let Some(secondary) = window.secondary_id() {
                expected_entries.insert(secondary.clone());
                report.aliases_checked += 1;
                self.check_alias(store, window, secondary, primary.as_ref(), &mut report);
            }
        }

        for entry in store.entries()? {
            if !expected_entries.contains(&entry) {
                report.mismatches.push(Mismatch {
                    gene: entry,
                    sequence: String::new(),
                    field: "entry".to_owned(),
                    position: None,
                    expected: "no entry for an unannotated gene".to_owned(),
                    found: "an entry".to_owned(),
                });
            }
        }

        log::info!(
            "Validated {} genes and {} aliases: {} mismatches",
            report.genes_checked,
            report.aliases_checked,
            report.mismatches.len()
        );
        Ok(report)
    }

    fn recount(
        &self,
        window: &GeneWindow,
        source: &mut dyn AlignmentSource,
        report: &mut ValidationReport,
    ) -> Result<Recount> {
        let sequence = window.sequence();
        let length = source.reference_length(sequence).ok_or_else(|| {
            Error::input(sequence, "sequence is absent from the alignment header")
        })?;
        if length != *window.utr3_end() {
            mismatch(report, window, "utr3_end", length, window.utr3_end());
        }

        let (min, max) = (*self.config.min_read_length(), *self.config.max_read_length());
        let mut recount = Recount::default();
        let mut batches = source
            .fetch(sequence)
            .map_err(|err| Error::input(sequence, format!("{err:#}")))?;
        while let Some(batch) = batches.next() {
            let batch = batch.map_err(|err| Error::input(sequence, format!("{err:#}")))?;
            for record in batch {
                if record.flag != 0 && record.flag != 256 {
                    continue;
                }
                if !(min..=max).contains(&record.length) {
                    recount.dropped += 1;
                    continue;
                }
                if record.start < 1 || record.start > *window.utr3_end() {
                    report.mismatches.push(Mismatch {
                        gene: window.primary_id().clone(),
                        sequence: sequence.clone(),
                        field: "alignment start".to_owned(),
                        position: Some(record.start as i64),
                        expected: format!("a position in [1, {}]", window.utr3_end()),
                        found: record.start.to_string(),
                    });
                    continue;
                }
                *recount
                    .cells
                    .entry((record.length - min + 1, record.start))
                    .or_default() += 1;
                recount.counted += 1;
            }
        }
        Ok(recount)
    }

    fn compare(
        &self,
        window: &GeneWindow,
        recount: &Recount,
        stored: &GeneProfile,
        report: &mut ValidationReport,
    ) {
        let (min, max) = (*self.config.min_read_length(), *self.config.max_read_length());
        let rows = max - min + 1;
        let cols = *window.utr3_end();

        // Matrix, cell by cell, in 1-based coordinates
        if stored.data.shape() != (rows, cols) {
            mismatch(report, window, "data shape", (rows, cols), stored.data.shape());
        } else {
            for row in 1..=rows {
                for (ind, found) in stored.data.row(row - 1).iter().enumerate() {
                    let col = ind + 1;
                    let expected = recount.cells.get(&(row, col)).copied().unwrap_or(0);
                    if *found != expected {
                        report.mismatches.push(Mismatch {
                            gene: window.primary_id().clone(),
                            sequence: window.sequence().clone(),
                            field: format!("data[{row}, {col}]"),
                            position: Some(col as i64),
                            expected: expected.to_string(),
                            found: found.to_string(),
                        });
                    }
                }
            }
        }

        let mut by_len = vec![0u64; rows];
        for ((row, _), count) in &recount.cells {
            by_len[row - 1] += count;
        }
        check(report, window, "reads_by_len", &by_len, &stored.reads_by_len);
        check(report, window, "reads_total", &recount.counted, &stored.reads_total);
        check(
            report,
            window,
            "sum(reads_by_len)",
            &stored.reads_total,
            &stored.reads_by_len.iter().sum::<u64>(),
        );

        let lengths = (min as i64..=max as i64).collect::<Vec<_>>();
        check(report, window, "lengths", &lengths, &stored.lengths);

        let buffer_left = (*window.utr5_end() - *window.utr5_start() + 1) as i64;
        check(report, window, "buffer_left", &buffer_left, &stored.buffer_left);

        let start = *window.feature_start() as i64;
        check(
            report,
            window,
            "start_codon_pos",
            &[start, start + 1, start + 2],
            &stored.start_codon_pos,
        );

        let stop = *window.feature_end() as i64 - *window.stop_codon_offset();
        check(
            report,
            window,
            "stop_codon_pos",
            &[stop, stop + 1, stop + 2],
            &stored.stop_codon_pos,
        );
        check(
            report,
            window,
            "buffer_right",
            &(*window.utr3_end() as i64 - (stop + 2)),
            &stored.buffer_right,
        );
    }

    fn check_alias(
        &self,
        store: &ProfileStore,
        window: &GeneWindow,
        secondary: &str,
        primary: Option<&GeneProfile>,
        report: &mut ValidationReport,
    ) {
        match store.alias_target(secondary) {
            Ok(Some(target)) if target == *window.primary_id() => {}
            Ok(target) => {
                mismatch(
                    report,
                    window,
                    format!("alias {secondary}"),
                    format!("a soft link to {}", window.primary_id()),
                    format!("{target:?}"),
                );
                return;
            }
            Err(err) => {
                mismatch(report, window, format!("alias {secondary}"), "a soft link", err.to_string());
                return;
            }
        }

        // Reading through the alias would only repeat the failure of the primary entry
        let Some(primary) = primary else {
            return;
        };
        match store.read(secondary) {
            Ok(aliased) => {
                let name = |field: &str| format!("{field} via {secondary}");
                check(report, window, &name("data"), &primary.data, &aliased.data);
                check(report, window, &name("buffer_left"), &primary.buffer_left, &aliased.buffer_left);
                check(report, window, &name("buffer_right"), &primary.buffer_right, &aliased.buffer_right);
                check(
                    report,
                    window,
                    &name("start_codon_pos"),
                    &primary.start_codon_pos,
                    &aliased.start_codon_pos,
                );
                check(
                    report,
                    window,
                    &name("stop_codon_pos"),
                    &primary.stop_codon_pos,
                    &aliased.stop_codon_pos,
                );
                check(report, window, &name("lengths"), &primary.lengths, &aliased.lengths);
                check(report, window, &name("reads_by_len"), &primary.reads_by_len, &aliased.reads_by_len);
                check(report, window, &name("reads_total"), &primary.reads_total, &aliased.reads_total);
            }
            Err(err) => mismatch(report, window, format!("alias {secondary}"), "a readable profile", err.to_string()),
        }
    }
}

fn mismatch(
    report: &mut ValidationReport,
    window: &GeneWindow,
    field: impl Into<String>,
    expected: impl Debug,
    found: impl Debug,
) {
    report.mismatches.push(Mismatch {
        gene: window.primary_id().clone(),
        sequence: window.sequence().clone(),
        field: field.into(),
        position: None,
        expected: format!("{expected:?}"),
        found: format!("{found:?}"),
    });
}

fn check<T: PartialEq + Debug + ?Sized>(
    report: &mut ValidationReport,
    window: &GeneWindow,
    field: &str,
    expected: &T,
    found: &T,
) {
    if expected != found {
        mismatch(report, window, field, expected, found);
    }
}
