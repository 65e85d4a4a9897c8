use riboprof_io_rs::bam::AlignmentRecord;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::profile::{GeneProfile, Matrix, Tally};
use crate::window::GeneWindow;

/// Accumulates retained alignments of one gene into a length x position matrix.
///
/// Row `r` holds reads of length `min_read_length + r`, column `c` holds reads starting at
/// 1-based position `c + 1`. Accumulation is commutative, so builders over disjoint shards of
/// the same gene can be merged in any order.
#[derive(Debug, Clone)]
pub struct ProfileBuilder<'w> {
    window: &'w GeneWindow,
    min_read_length: usize,
    max_read_length: usize,
    matrix: Matrix,
    tally: Tally,
}

impl<'w> ProfileBuilder<'w> {
    pub fn new(window: &'w GeneWindow, config: &Config) -> Self {
        Self {
            window,
            min_read_length: *config.min_read_length(),
            max_read_length: *config.max_read_length(),
            matrix: Matrix::zeros(config.rows(), *window.utr3_end()),
            tally: Tally::default(),
        }
    }

    pub fn window(&self) -> &GeneWindow {
        self.window
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn add(&mut self, record: &AlignmentRecord) -> Result<()> {
        if record.length < self.min_read_length || record.length > self.max_read_length {
            self.tally.out_of_range += 1;
            return Ok(());
        }
        if record.start == 0 || record.start > *self.window.utr3_end() {
            return Err(Error::consistency(
                self.window.primary_id(),
                self.window.sequence(),
                Some(record.start as i64),
                format!(
                    "alignment starts outside the gene window [1, {}]",
                    self.window.utr3_end()
                ),
            ));
        }

        self.matrix
            .increment(record.length - self.min_read_length, record.start - 1);
        self.tally.retained += 1;
        Ok(())
    }

    pub fn extend<'r>(&mut self, records: impl IntoIterator<Item = &'r AlignmentRecord>) -> Result<()> {
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }

    /// Fold another partial builder of the same gene into this one.
    pub fn merge(&mut self, other: ProfileBuilder<'_>) -> Result<()> {
        let compatible = self.window == other.window
            && self.min_read_length == other.min_read_length
            && self.max_read_length == other.max_read_length;
        if !compatible || !self.matrix.accumulate(&other.matrix) {
            return Err(Error::consistency(
                self.window.primary_id(),
                self.window.sequence(),
                None,
                format!(
                    "can't merge partial profiles of different genes or read-length ranges ({})",
                    other.window.primary_id()
                ),
            ));
        }
        self.tally += other.tally;
        Ok(())
    }

    pub fn finish(self) -> (GeneProfile, Tally) {
        let reads_by_len = self.matrix.row_sums();
        let reads_total = reads_by_len.iter().sum();
        let lengths = (self.min_read_length..=self.max_read_length)
            .map(|x| x as i64)
            .collect();

        let profile = GeneProfile {
            data: self.matrix,
            buffer_left: self.window.buffer_left(),
            buffer_right: self.window.buffer_right(),
            start_codon_pos: self.window.start_codon_pos(),
            stop_codon_pos: self.window.stop_codon_pos(),
            lengths,
            reads_by_len,
            reads_total,
        };
        (profile, self.tally)
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::filter::is_retained;
    use crate::window::Convention;

    fn config() -> Config {
        Config::builder("sample").build().unwrap()
    }

    fn window() -> GeneWindow {
        GeneWindow::new(
            "YAL001C",
            None,
            "YAL001C",
            (1, 250),
            (251, 500),
            (501, 750),
            Convention::ThreeFeature.stop_codon_offset(),
        )
        .unwrap()
    }

    #[test]
    fn test_worked_example() -> Result<()> {
        let (config, window) = (config(), window());
        let mut builder = ProfileBuilder::new(&window, &config);
        builder.extend(&[
            AlignmentRecord::new(251, 28, 0),
            AlignmentRecord::new(251, 28, 0),
        ])?;
        let (profile, tally) = builder.finish();

        // 1-based row 19 (length 28) and column 251
        assert_eq!(profile.data.shape(), (41, 750));
        assert_eq!(profile.data.get(18, 250), 2);
        assert_eq!(profile.data.values().iter().sum::<u64>(), 2);
        assert_eq!(profile.reads_by_len[18], 2);
        assert_eq!(profile.reads_total, 2);
        assert_eq!(profile.buffer_left, 250);
        assert_eq!(profile.buffer_right, 250);
        assert_eq!(profile.start_codon_pos, [251, 252, 253]);
        assert_eq!(profile.stop_codon_pos, [498, 499, 500]);
        assert_eq!(profile.lengths, (10..=50).collect::<Vec<i64>>());
        assert_eq!(tally, Tally::new(2, 0));
        Ok(())
    }

    #[test]
    fn test_unmapped_contributes_nothing() -> Result<()> {
        let (config, window) = (config(), window());
        let records = [AlignmentRecord::new(251, 28, 4)];

        let mut builder = ProfileBuilder::new(&window, &config);
        builder.extend(records.iter().filter(|x| is_retained(x.flag)))?;
        let (profile, tally) = builder.finish();

        assert_eq!(profile.reads_total, 0);
        assert!(profile.reads_by_len.iter().all(|x| *x == 0));
        assert!(profile.data.values().iter().all(|x| *x == 0));
        assert_eq!(tally, Tally::default());
        Ok(())
    }

    #[test]
    fn test_length_out_of_range() -> Result<()> {
        let (config, window) = (config(), window());
        let mut builder = ProfileBuilder::new(&window, &config);
        builder.extend(&[
            AlignmentRecord::new(1, 9, 0),
            AlignmentRecord::new(1, 10, 0),
            AlignmentRecord::new(750, 50, 0),
            AlignmentRecord::new(1, 51, 0),
            // Out-of-range lengths are dropped before positions are checked
            AlignmentRecord::new(10_000, 5, 0),
        ])?;
        let (profile, tally) = builder.finish();

        assert_eq!(profile.data.get(0, 0), 1);
        assert_eq!(profile.data.get(40, 749), 1);
        assert_eq!(profile.reads_total, 2);
        assert_eq!(tally, Tally::new(2, 3));
        Ok(())
    }

    #[test]
    fn test_start_outside_window() {
        let (config, window) = (config(), window());
        for start in [0, 751] {
            let mut builder = ProfileBuilder::new(&window, &config);
            let err = builder.add(&AlignmentRecord::new(start, 28, 0));
            assert!(matches!(
                err,
                Err(Error::Consistency { position: Some(position), .. }) if position == start as i64
            ));
        }
    }

    #[test]
    fn test_order_independence() -> Result<()> {
        let (config, window) = (config(), window());
        let records = [
            AlignmentRecord::new(1, 10, 0),
            AlignmentRecord::new(251, 28, 256),
            AlignmentRecord::new(251, 28, 0),
            AlignmentRecord::new(300, 30, 0),
            AlignmentRecord::new(750, 50, 0),
            AlignmentRecord::new(400, 60, 0),
        ];

        let mut reference = ProfileBuilder::new(&window, &config);
        reference.extend(&records)?;
        let reference = reference.finish();

        for permutation in records.iter().permutations(records.len()) {
            let mut builder = ProfileBuilder::new(&window, &config);
            builder.extend(permutation)?;
            assert_eq!(builder.finish(), reference);
        }

        // Shards accumulated separately and merged afterwards
        for split in 0..=records.len() {
            let mut left = ProfileBuilder::new(&window, &config);
            left.extend(&records[..split])?;
            let mut right = ProfileBuilder::new(&window, &config);
            right.extend(&records[split..])?;
            right.merge(left)?;
            assert_eq!(right.finish(), reference);
        }
        Ok(())
    }

    #[test]
    fn test_merge_different_genes() {
        let config = config();
        let (first, second) = (window(), GeneWindow::new("B", None, "B", (1, 10), (11, 20), (21, 30), 2).unwrap());
        let mut builder = ProfileBuilder::new(&first, &config);
        assert!(builder.merge(ProfileBuilder::new(&second, &config)).is_err());
    }
}
