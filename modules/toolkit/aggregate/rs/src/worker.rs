use riboprof_core_rs::LendingIterator;
use riboprof_io_rs::bam::AlignmentSource;

use crate::config::Config;
use crate::error::Result;
use crate::filter::AlignmentFilter;
use crate::matrix::ProfileBuilder;
use crate::profile::{GeneProfile, Tally};
use crate::window::GeneWindow;

/// Per-thread state: an independent handle to the alignment source.
pub struct Worker {
    source: Box<dyn AlignmentSource>,
}

impl Worker {
    pub fn new(source: Box<dyn AlignmentSource>) -> Self {
        Self { source }
    }

    pub fn process(&mut self, window: &GeneWindow, config: &Config) -> Result<(GeneProfile, Tally)> {
        let mut builder = ProfileBuilder::new(window, config);

        let mut filter = AlignmentFilter::new(self.source.as_mut());
        let mut retained = filter.retained(window.sequence())?;
        while let Some(batch) = retained.next() {
            builder.extend(batch?)?;
        }

        let (profile, tally) = builder.finish();
        log::trace!(
            "Gene {}: {} reads counted, {} out of range",
            window.primary_id(),
            tally.retained,
            tally.out_of_range
        );
        Ok((profile, tally))
    }
}
