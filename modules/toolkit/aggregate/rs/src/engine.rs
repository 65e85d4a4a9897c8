use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rayon::ThreadPool;
use thread_local::ThreadLocal;

use riboprof_core_rs::parallelism;
use riboprof_io_rs::bam::AlignmentSource;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::profile::{GeneProfile, Summary, Tally};
use crate::resolver::GeneModelResolver;
use crate::window::GeneWindow;
use crate::worker::Worker;
use crate::writer::ProfileWriter;

type Message = (usize, GeneProfile, Tally);

/// How often a scheduler waiting for a free slot looks for failures and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Requests a running aggregation to stop. The run then fails with [`Error::Cancelled`] and
/// leaves no output behind.
#[derive(Debug, Clone, Default)]
pub struct Canceller(Arc<AtomicBool>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fans genes out to a pool of workers and funnels their profiles into a single writer.
///
/// Genes are independent. Each worker reads alignments through its own clone of the source,
/// while the writer thread restores annotation order before serialization, so the output is
/// the same for any number of threads.
///
/// At most `queue_capacity + threads` genes are scheduled but not yet written. A slow gene
/// therefore stalls scheduling instead of piling finished profiles up in the writer.
pub struct Aggregator {
    config: Config,
    pool: Option<ThreadPool>,
    canceller: Canceller,
}

impl Aggregator {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pool: None,
            canceller: Canceller::default(),
        })
    }

    /// Run on an existing pool instead of building one from the configured thread count.
    pub fn with_thread_pool(mut self, pool: ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn run(
        &self,
        annotation: impl AsRef<Path>,
        source: &dyn AlignmentSource,
        output: impl AsRef<Path>,
    ) -> Result<Summary> {
        let windows = GeneModelResolver::new(&self.config).resolve_path(annotation)?;
        self.run_windows(&windows, source, output)
    }

    pub fn run_windows(
        &self,
        windows: &[GeneWindow],
        source: &dyn AlignmentSource,
        output: impl AsRef<Path>,
    ) -> Result<Summary> {
        if self.canceller.is_cancelled() {
            return Err(Error::Cancelled);
        }
        for window in windows {
            check_reference(window, source)?;
        }

        let owned;
        let pool = match &self.pool {
            Some(pool) => pool,
            None => {
                owned = parallelism::pool(*self.config.threads())
                    .map_err(|err| Error::Config(format!("{err:#}")))?;
                &owned
            }
        };
        log::info!(
            "Aggregating {} genes into {} with {} threads",
            windows.len(),
            output.as_ref().display(),
            pool.current_num_threads()
        );

        let writer = ProfileWriter::create(output, &self.config)?;
        let path = writer.path().to_path_buf();

        let failed = AtomicBool::new(false);
        let errors = Mutex::new(Vec::new());
        let workers: ThreadLocal<RefCell<Worker>> = ThreadLocal::new();
        let (sender, receiver) = crossbeam_channel::bounded(*self.config.queue_capacity());

        // The writer returns one slot per serialized gene
        let in_flight = *self.config.queue_capacity() + pool.current_num_threads();
        let (release, acquire) = crossbeam_channel::bounded(in_flight);

        let written = std::thread::scope(|scope| {
            let (failed, cancelled) = (&failed, &*self.canceller.0);
            let handle =
                scope.spawn(move || drain(writer, windows, receiver, release, failed, cancelled));

            // Schedule from the calling thread so that waiting for a slot never blocks a worker
            pool.in_place_scope_fifo(|s| {
                for (ind, window) in windows.iter().enumerate() {
                    if ind >= in_flight && !wait_for_slot(&acquire, failed, cancelled) {
                        return;
                    }
                    // Stop scheduling once any gene has failed
                    if failed.load(Ordering::Relaxed) {
                        return;
                    }

                    let sender = sender.clone();
                    let (errors, workers, config) = (&errors, &workers, &self.config);
                    s.spawn_fifo(move |_| {
                        if failed.load(Ordering::Relaxed) || cancelled.load(Ordering::Relaxed) {
                            return;
                        }
                        if let Err(err) = process(ind, window, source, config, workers, &sender) {
                            log::error!("Failed to aggregate gene {}: {err}", window.primary_id());
                            failed.store(true, Ordering::Relaxed);
                            errors
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .push((ind, err));
                        }
                    });
                }
            });
            drop(sender);

            handle
                .join()
                .unwrap_or_else(|_| Err(storage(&path, "the writer thread panicked")))
        });

        // Report the failure of the earliest gene in annotation order
        let mut errors = errors.into_inner().unwrap_or_else(PoisonError::into_inner);
        errors.sort_by_key(|(ind, _)| *ind);

        if self.canceller.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some((_, err)) = errors.into_iter().next() {
            return Err(err);
        }

        let (writer, summary) = written?;
        if summary.genes != windows.len() as u64 {
            writer.abort();
            return Err(storage(
                &path,
                format!("{} of {} genes were written", summary.genes, windows.len()),
            ));
        }
        if self.canceller.is_cancelled() {
            writer.abort();
            return Err(Error::Cancelled);
        }

        writer.finish(&summary)?;
        log::info!("Aggregated {summary}");
        Ok(summary)
    }
}

/// Every gene must lie on a sequence of the alignment source and cover it exactly.
fn check_reference(window: &GeneWindow, source: &dyn AlignmentSource) -> Result<()> {
    let sequence = window.sequence();
    let length = source.reference_length(sequence).ok_or_else(|| {
        Error::input(sequence, "sequence is absent from the alignment header")
    })?;
    if length != *window.utr3_end() {
        return Err(Error::consistency(
            window.primary_id(),
            sequence,
            Some(*window.utr3_end() as i64),
            format!("gene window ends at {} but the sequence length is {length}", window.utr3_end()),
        ));
    }
    Ok(())
}

fn process(
    ind: usize,
    window: &GeneWindow,
    source: &dyn AlignmentSource,
    config: &Config,
    workers: &ThreadLocal<RefCell<Worker>>,
    sender: &Sender<Message>,
) -> Result<()> {
    let mut worker = workers
        .get_or_try(|| {
            source
                .try_clone()
                .map(|x| RefCell::new(Worker::new(x)))
                .map_err(|err| Error::input(window.sequence(), format!("{err:#}")))
        })?
        .borrow_mut();

    let (profile, tally) = worker.process(window, config)?;
    // A closed channel means the writer has already failed and reported it
    let _ = sender.send((ind, profile, tally));
    Ok(())
}

/// Block until the writer frees a slot. False once the run is stopping.
fn wait_for_slot(slots: &Receiver<()>, failed: &AtomicBool, cancelled: &AtomicBool) -> bool {
    loop {
        if failed.load(Ordering::Relaxed) || cancelled.load(Ordering::Relaxed) {
            return false;
        }
        match slots.recv_timeout(POLL_INTERVAL) {
            Ok(()) => return true,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

/// Serialize profiles in annotation order, buffering the ones that arrive early.
fn drain(
    mut writer: ProfileWriter,
    windows: &[GeneWindow],
    receiver: Receiver<Message>,
    release: Sender<()>,
    failed: &AtomicBool,
    cancelled: &AtomicBool,
) -> Result<(ProfileWriter, Summary)> {
    let mut pending = BTreeMap::new();
    let mut next = 0;
    let mut summary = Summary::default();

    for (ind, profile, tally) in receiver {
        if cancelled.load(Ordering::Relaxed) {
            failed.store(true, Ordering::Relaxed);
            return Err(Error::Cancelled);
        }

        pending.insert(ind, (profile, tally));
        while let Some((profile, tally)) = pending.remove(&next) {
            let window = &windows[next];
            if let Err(err) = writer.write(window, &profile) {
                log::error!("Failed to write gene {}: {err}", window.primary_id());
                failed.store(true, Ordering::Relaxed);
                return Err(err);
            }
            summary.add_gene(tally, window.secondary_id().is_some());
            next += 1;
            // Never full: the scheduler holds back a slot for every unwritten gene
            let _ = release.try_send(());
        }
    }
    Ok((writer, summary))
}

fn storage(path: &Path, reason: impl Into<String>) -> Error {
    Error::Storage {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}
