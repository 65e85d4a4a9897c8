use derive_getters::{Dissolve, Getters};
use riboprof_core_rs::loc::{Interval, Orientation};

/// A single GFF3 feature line.
#[derive(Clone, PartialEq, Debug, Getters, Dissolve)]
pub struct Record {
    seqid: String,
    source: String,
    feature: String,
    /// Half-open, 0-based coordinates of the feature.
    interval: Interval<u64>,
    score: Option<f64>,
    orientation: Orientation,
    phase: Option<u8>,
    attributes: Vec<(String, String)>,
}

impl Record {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seqid: String,
        source: String,
        feature: String,
        interval: Interval<u64>,
        score: Option<f64>,
        orientation: Orientation,
        phase: Option<u8>,
        attributes: Vec<(String, String)>,
    ) -> Self {
        Self {
            seqid,
            source,
            feature,
            interval,
            score,
            orientation,
            phase,
            attributes,
        }
    }

    /// Value of the first attribute with the given key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 1-based inclusive start of the feature.
    pub fn start(&self) -> u64 {
        self.interval.closed().0
    }

    /// 1-based inclusive end of the feature.
    pub fn end(&self) -> u64 {
        self.interval.closed().1
    }
}
