use derive_getters::{Dissolve, Getters};

use crate::config::Config;
use crate::error::{Error, Result};

/// How gene flanks are obtained from the annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// UTR5, body, and UTR3 are annotated as separate features. The body includes the stop codon.
    ThreeFeature,
    /// Only the body is annotated; flanks of `buffer` positions are synthesized on both sides.
    SingleFeature { buffer: usize, stop_in_feature: bool },
}

impl Convention {
    pub fn from_config(config: &Config) -> Self {
        if *config.is_three_feature_mode() {
            Convention::ThreeFeature
        } else {
            Convention::SingleFeature {
                buffer: *config.buffer(),
                stop_in_feature: *config.stop_codon_in_feature(),
            }
        }
    }

    /// Distance from the body end back to the first stop codon position:
    /// 2 when the body ends with the stop codon, -1 when the stop codon follows the body.
    pub fn stop_codon_offset(&self) -> i64 {
        match self {
            Convention::ThreeFeature => 2,
            Convention::SingleFeature {
                stop_in_feature: true,
                ..
            } => 2,
            Convention::SingleFeature {
                stop_in_feature: false,
                ..
            } => -1,
        }
    }
}

/// Coordinates of one gene on its reference sequence. All bounds are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters, Dissolve)]
pub struct GeneWindow {
    primary_id: String,
    secondary_id: Option<String>,
    sequence: String,
    utr5_start: usize,
    utr5_end: usize,
    feature_start: usize,
    feature_end: usize,
    utr3_start: usize,
    utr3_end: usize,
    stop_codon_offset: i64,
}

impl GeneWindow {
    /// Build a window, checking `1 <= utr5_start <= utr5_end < feature_start <= feature_end <
    /// utr3_start <= utr3_end` and that the stop codon fits into the window.
    pub fn new(
        primary_id: impl Into<String>,
        secondary_id: Option<String>,
        sequence: impl Into<String>,
        utr5: (usize, usize),
        feature: (usize, usize),
        utr3: (usize, usize),
        stop_codon_offset: i64,
    ) -> Result<Self> {
        let window = Self {
            primary_id: primary_id.into(),
            secondary_id,
            sequence: sequence.into(),
            utr5_start: utr5.0,
            utr5_end: utr5.1,
            feature_start: feature.0,
            feature_end: feature.1,
            utr3_start: utr3.0,
            utr3_end: utr3.1,
            stop_codon_offset,
        };

        let ordered = 1 <= window.utr5_start
            && window.utr5_start <= window.utr5_end
            && window.utr5_end < window.feature_start
            && window.feature_start <= window.feature_end
            && window.feature_end < window.utr3_start
            && window.utr3_start <= window.utr3_end;
        if !ordered {
            return Err(Error::annotation(
                &window.primary_id,
                format!(
                    "window is not ordered: UTR5 [{}, {}], feature [{}, {}], UTR3 [{}, {}]",
                    window.utr5_start,
                    window.utr5_end,
                    window.feature_start,
                    window.feature_end,
                    window.utr3_start,
                    window.utr3_end
                ),
            ));
        }

        let stop = window.stop_codon_pos();
        if stop[0] < 1 || stop[2] > window.utr3_end as i64 {
            return Err(Error::annotation(
                &window.primary_id,
                format!(
                    "stop codon {stop:?} lies outside the window [1, {}]",
                    window.utr3_end
                ),
            ));
        }
        Ok(window)
    }

    pub fn buffer_left(&self) -> i64 {
        (self.utr5_end - self.utr5_start + 1) as i64
    }

    pub fn buffer_right(&self) -> i64 {
        self.utr3_end as i64 - self.stop_codon_pos()[2]
    }

    pub fn start_codon_pos(&self) -> [i64; 3] {
        let start = self.feature_start as i64;
        [start, start + 1, start + 2]
    }

    pub fn stop_codon_pos(&self) -> [i64; 3] {
        let first = self.feature_end as i64 - self.stop_codon_offset;
        [first, first + 1, first + 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_feature_window() -> Result<()> {
        let window = GeneWindow::new(
            "YAL001C",
            Some("TFC3".to_owned()),
            "YAL001C",
            (1, 250),
            (251, 500),
            (501, 750),
            Convention::ThreeFeature.stop_codon_offset(),
        )?;
        assert_eq!(window.buffer_left(), 250);
        assert_eq!(window.start_codon_pos(), [251, 252, 253]);
        assert_eq!(window.stop_codon_pos(), [498, 499, 500]);
        assert_eq!(window.buffer_right(), 250);
        assert_eq!(window.buffer_right(), *window.utr3_end() as i64 - window.stop_codon_pos()[2]);
        Ok(())
    }

    #[test]
    fn test_stop_codon_outside_feature() -> Result<()> {
        let convention = Convention::SingleFeature {
            buffer: 250,
            stop_in_feature: false,
        };
        let window = GeneWindow::new(
            "YAL003W",
            None,
            "YAL003W",
            (1, 250),
            (251, 496),
            (497, 746),
            convention.stop_codon_offset(),
        )?;
        assert_eq!(window.stop_codon_pos(), [497, 498, 499]);
        assert_eq!(window.buffer_right(), 247);
        Ok(())
    }

    #[test]
    fn test_unordered_windows() {
        for (utr5, feature, utr3) in [
            ((0, 10), (11, 20), (21, 30)),
            ((1, 10), (10, 20), (21, 30)),
            ((1, 10), (11, 20), (20, 30)),
            ((1, 10), (21, 20), (21, 30)),
            ((5, 4), (11, 20), (21, 30)),
        ] {
            let err = GeneWindow::new("A", None, "chr", utr5, feature, utr3, 2);
            assert!(matches!(err, Err(Error::Annotation { .. })));
        }

        // The stop codon past the body must fit into UTR3
        let err = GeneWindow::new("A", None, "chr", (1, 10), (11, 20), (21, 22), -1);
        assert!(matches!(err, Err(Error::Annotation { .. })));
    }
}
