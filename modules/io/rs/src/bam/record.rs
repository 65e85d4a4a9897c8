use std::io;

use noodles::sam::alignment::record::Cigar;

/// Minimal view of an alignment used for profiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AlignmentRecord {
    /// 1-based leftmost mapped position.
    pub start: usize,
    /// Query width in bases, see [`AlignmentRecord::query_length`].
    pub length: usize,
    pub flag: u16,
}

impl AlignmentRecord {
    pub fn new(start: usize, length: usize, flag: u16) -> Self {
        Self {
            start,
            length,
            flag,
        }
    }

    /// Bases of the read covered by the CIGAR operations (M, I, S, = and X).
    /// Hard clips don't count. Secondary alignments often store `*` instead of the sequence,
    /// so the stored sequence length is used only when there is no CIGAR at all.
    pub fn query_length(cigar: &impl Cigar, sequence: usize) -> io::Result<usize> {
        if cigar.is_empty() {
            Ok(sequence)
        } else {
            cigar.read_length()
        }
    }
}

/// samtools-like flag masks: every `inflags` bit must be set, no `exflags` bit may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagFilter {
    pub inflags: u16,
    pub exflags: u16,
}

impl FlagFilter {
    pub fn new(inflags: u16, exflags: u16) -> Self {
        Self { inflags, exflags }
    }

    #[inline(always)]
    pub fn passes(&self, flag: u16) -> bool {
        flag & self.inflags == self.inflags && flag & self.exflags == 0
    }
}

#[cfg(test)]
mod tests {
    use noodles::sam::alignment::record::cigar::op::{Kind, Op};
    use noodles::sam::alignment::record_buf;

    use super::*;

    #[test]
    fn test_query_length() -> io::Result<()> {
        let cigar = |ops: &[(Kind, usize)]| {
            ops.iter()
                .map(|&(kind, len)| Op::new(kind, len))
                .collect::<record_buf::Cigar>()
        };

        let matched = cigar(&[(Kind::Match, 28)]);
        assert_eq!(AlignmentRecord::query_length(&matched, 0)?, 28);
        assert_eq!(AlignmentRecord::query_length(&matched, 28)?, 28);

        let clipped = cigar(&[(Kind::HardClip, 5), (Kind::Match, 28)]);
        assert_eq!(AlignmentRecord::query_length(&clipped, 28)?, 28);

        let spliced = cigar(&[
            (Kind::SoftClip, 2),
            (Kind::SequenceMatch, 10),
            (Kind::Skip, 300),
            (Kind::Deletion, 1),
            (Kind::SequenceMismatch, 1),
            (Kind::Insertion, 3),
            (Kind::Match, 14),
            (Kind::Pad, 4),
        ]);
        assert_eq!(AlignmentRecord::query_length(&spliced, 30)?, 30);

        let unaligned = cigar(&[]);
        assert_eq!(AlignmentRecord::query_length(&unaligned, 31)?, 31);
        Ok(())
    }

    #[test]
    fn test_flag_filter() {
        let all = FlagFilter::default();
        for flag in [0, 4, 16, 256, 2048] {
            assert!(all.passes(flag));
        }

        let primary = FlagFilter::new(0, !0x100);
        assert!(primary.passes(0));
        assert!(primary.passes(256));
        assert!(!primary.passes(4));
        assert!(!primary.passes(16));
        assert!(!primary.passes(256 | 16));

        let paired = FlagFilter::new(1, 4);
        assert!(paired.passes(1 | 64));
        assert!(!paired.passes(0));
        assert!(!paired.passes(1 | 4));
    }
}
