use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{debug, error, trace, warn};

use crate::process::schedule::{PlaybackScheduler, PlaybackSender, PlaybackSink};
use crate::structs::adts::{AdtsFrameBuilder, AdtsParams};
use crate::structs::metadata::AudioMetadata;
use crate::structs::track::{AudioTrack, Sample};
use crate::utils::errors::DecodeError;

/// Data-available deliveries folded into one decode submission.
pub const DEFAULT_THROTTLE: usize = 5;

/// Interleaved PCM produced by a [`DecodeBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// External AAC decoder fed with concatenated ADTS frames.
///
/// Runs on the dispatcher's worker thread, one batch at a time.
pub trait DecodeBackend: Send {
    fn decode(&mut self, adts: &[u8]) -> Result<PcmBuffer, DecodeError>;
}

impl<D: DecodeBackend + ?Sized> DecodeBackend for Box<D> {
    fn decode(&mut self, adts: &[u8]) -> Result<PcmBuffer, DecodeError> {
        (**self).decode(adts)
    }
}

/// Result of one decode submission.
#[derive(Debug)]
pub struct DecodeOutcome {
    /// Submission order, starting at 0.
    pub batch: u64,
    /// Access units in the submission.
    pub samples: usize,
    pub result: Result<PcmBuffer, DecodeError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub deliveries: u64,
    pub submitted: u64,
    pub decoded: u64,
    pub failed: u64,
    pub dropped_samples: u64,
}

struct DecodeJob {
    batch: u64,
    samples: usize,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct DecodeCounters {
    decoded: AtomicU64,
    failed: AtomicU64,
}

/// Where the worker hands finished batches.
enum OutcomeRoute {
    /// Kept for [`DecodeDispatcher::poll`].
    Poll(mpsc::Sender<DecodeOutcome>),
    /// Decoded buffers go straight to playback; failures are logged.
    Playback(PlaybackSender),
}

impl OutcomeRoute {
    /// Returns `false` once the receiving side is gone.
    fn send(&self, outcome: DecodeOutcome) -> bool {
        match self {
            OutcomeRoute::Poll(outcomes) => outcomes.send(outcome).is_ok(),
            OutcomeRoute::Playback(playback) => match outcome.result {
                Ok(pcm) => playback.push(pcm),
                Err(e) => {
                    error!(
                        "Decode failed for batch {} ({} samples): {e}",
                        outcome.batch, outcome.samples
                    );
                    true
                }
            },
        }
    }
}

struct DecodeWorkerConfig {
    backend: Box<dyn DecodeBackend>,
    jobs: mpsc::Receiver<DecodeJob>,
    route: OutcomeRoute,
    counters: Arc<DecodeCounters>,
    cancelled: Arc<AtomicBool>,
}

fn spawn_decode_worker(config: DecodeWorkerConfig) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let DecodeWorkerConfig {
            mut backend,
            jobs,
            route,
            counters,
            cancelled,
        } = config;

        while let Ok(job) = jobs.recv() {
            if cancelled.load(Ordering::Acquire) {
                trace!("Decode worker cancelled, dropping batch {}", job.batch);
                break;
            }

            let result = backend.decode(&job.bytes).and_then(|pcm| {
                if pcm.is_empty() {
                    Err(DecodeError::NoAudio(job.bytes.len()))
                } else {
                    Ok(pcm)
                }
            });

            match &result {
                Ok(pcm) => {
                    counters.decoded.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        "Batch {} decoded: {} frames at {} Hz",
                        job.batch,
                        pcm.frames(),
                        pcm.sample_rate
                    );
                }
                Err(_) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }

            let outcome = DecodeOutcome {
                batch: job.batch,
                samples: job.samples,
                result,
            };
            if !route.send(outcome) {
                break;
            }
        }

        trace!("Decode worker exiting");
    })
}

/// Batches samples into ADTS bitstreams and decodes them off-thread.
///
/// Every [`deliver`](Self::deliver) call counts as one data-available
/// delivery. Once `throttle` deliveries have accumulated their samples are
/// framed and submitted as a single batch. A single worker decodes batches in
/// submission order, so decoded buffers come back in stream order.
///
/// Built with [`new`](Self::new), outcomes wait for [`poll`](Self::poll).
/// Built with [`with_playback`](Self::with_playback), the worker queues
/// decoded buffers for playback itself.
///
/// # Example
///
/// ```rust,no_run
/// use flvaac::process::dispatch::{DecodeBackend, DecodeDispatcher, PcmBuffer};
/// use flvaac::utils::errors::DecodeError;
///
/// struct Counting;
///
/// impl DecodeBackend for Counting {
///     fn decode(&mut self, adts: &[u8]) -> Result<PcmBuffer, DecodeError> {
///         Ok(PcmBuffer::new(vec![0.0; adts.len()], 44100, 1))
///     }
/// }
///
/// let mut dispatcher = DecodeDispatcher::new(Box::new(Counting), 2);
/// for outcome in dispatcher.finish() {
///     println!("batch {} decoded: {}", outcome.batch, outcome.result.is_ok());
/// }
/// ```
pub struct DecodeDispatcher {
    throttle: usize,
    deliveries: usize,
    pending: Vec<Sample>,
    builder: Option<AdtsFrameBuilder>,
    next_batch: u64,

    jobs: Option<mpsc::Sender<DecodeJob>>,
    outcomes: mpsc::Receiver<DecodeOutcome>,
    worker: Option<thread::JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<DecodeCounters>,

    stats: DispatchStats,
}

impl DecodeDispatcher {
    /// Spawns the decode worker. A `throttle` of 0 is treated as 1.
    pub fn new(backend: Box<dyn DecodeBackend>, throttle: usize) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel();
        Self::start(backend, throttle, OutcomeRoute::Poll(outcome_tx), outcome_rx)
    }

    /// Spawns a decode worker that pushes decoded buffers to `playback` in
    /// submission order. [`poll`](Self::poll) never returns anything.
    pub fn with_playback(
        backend: Box<dyn DecodeBackend>,
        throttle: usize,
        playback: PlaybackSender,
    ) -> Self {
        let (_, outcome_rx) = mpsc::channel();
        Self::start(backend, throttle, OutcomeRoute::Playback(playback), outcome_rx)
    }

    fn start(
        backend: Box<dyn DecodeBackend>,
        throttle: usize,
        route: OutcomeRoute,
        outcomes: mpsc::Receiver<DecodeOutcome>,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(DecodeCounters::default());

        let worker = spawn_decode_worker(DecodeWorkerConfig {
            backend,
            jobs: job_rx,
            route,
            counters: counters.clone(),
            cancelled: cancelled.clone(),
        });

        Self {
            throttle: throttle.max(1),
            deliveries: 0,
            pending: Vec::new(),
            builder: None,
            next_batch: 0,
            jobs: Some(job_tx),
            outcomes,
            worker: Some(worker),
            cancelled,
            counters,
            stats: DispatchStats::default(),
        }
    }

    pub fn throttle(&self) -> usize {
        self.throttle
    }

    /// Takes the ADTS header fields from the latest track metadata.
    pub fn set_metadata(&mut self, meta: &AudioMetadata) {
        let params = AdtsParams::from(meta);
        if self.builder.is_some_and(|b| b.params() != params) && !self.pending.is_empty() {
            // Frames already queued were parsed under the previous config.
            self.submit();
        }
        debug!(
            "ADTS params: object type {}, sampling index {}, channel config {}",
            params.object_type, params.sampling_index, params.channel_config
        );
        self.builder = Some(AdtsFrameBuilder::new(params));
    }

    /// Accepts one data-available delivery. Returns `true` when it
    /// completed a batch that was submitted.
    pub fn deliver(&mut self, track: &AudioTrack) -> bool {
        if self.is_closed() {
            return false;
        }

        self.stats.deliveries += 1;
        self.pending.extend(track.samples.iter().cloned());
        self.deliveries += 1;

        if self.deliveries >= self.throttle {
            return self.submit();
        }
        false
    }

    /// Submits whatever has been delivered since the last batch.
    pub fn flush(&mut self) -> bool {
        if self.is_closed() || self.pending.is_empty() {
            self.deliveries = 0;
            return false;
        }
        self.submit()
    }

    fn submit(&mut self) -> bool {
        self.deliveries = 0;
        let samples = std::mem::take(&mut self.pending);
        if samples.is_empty() {
            return false;
        }

        let Some(builder) = self.builder else {
            warn!(
                "Dropping {} samples delivered before any track metadata",
                samples.len()
            );
            self.stats.dropped_samples += samples.len() as u64;
            return false;
        };

        let Some(jobs) = &self.jobs else {
            return false;
        };

        let bytes = builder.build(&samples);
        let batch = self.next_batch;
        trace!(
            "Submitting batch {batch}: {} samples, {} bytes",
            samples.len(),
            bytes.len()
        );

        let job = DecodeJob {
            batch,
            samples: samples.len(),
            bytes,
        };
        if jobs.send(job).is_err() {
            error!("{}", DecodeError::WorkerGone);
            self.stats.dropped_samples += samples.len() as u64;
            self.jobs = None;
            return false;
        }

        self.next_batch += 1;
        self.stats.submitted += 1;
        true
    }

    /// Collects outcomes that are ready without blocking.
    pub fn poll(&mut self) -> Vec<DecodeOutcome> {
        self.outcomes.try_iter().collect()
    }

    /// Submits the partial batch, waits for the worker to drain and returns
    /// every outcome not yet polled.
    pub fn finish(&mut self) -> Vec<DecodeOutcome> {
        self.flush();
        self.jobs = None;
        self.join_worker();
        self.poll()
    }

    /// Stops accepting deliveries. Batches the worker has not started are
    /// discarded.
    pub fn close(&mut self) {
        if self.jobs.is_none() && self.worker.is_none() {
            return;
        }
        self.cancelled.store(true, Ordering::Release);
        self.jobs = None;
        self.pending.clear();
        self.deliveries = 0;
        self.join_worker();
        // Anything still buffered belongs to a closed session.
        while self.outcomes.try_recv().is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.jobs.is_none()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            decoded: self.counters.decoded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            ..self.stats
        }
    }

    /// Polls outcomes and hands decoded buffers to `scheduler`. Failed
    /// batches are logged and skipped.
    pub fn route_completed<S: PlaybackSink>(&mut self, scheduler: &mut PlaybackScheduler<S>) -> usize {
        let outcomes = self.poll();
        Self::route(outcomes, scheduler)
    }

    /// [`finish`](Self::finish) followed by routing every outcome.
    pub fn finish_into<S: PlaybackSink>(&mut self, scheduler: &mut PlaybackScheduler<S>) -> usize {
        let outcomes = self.finish();
        Self::route(outcomes, scheduler)
    }

    fn route<S: PlaybackSink>(
        outcomes: Vec<DecodeOutcome>,
        scheduler: &mut PlaybackScheduler<S>,
    ) -> usize {
        let mut routed = 0;
        for outcome in outcomes {
            match outcome.result {
                Ok(pcm) => {
                    scheduler.push(pcm);
                    routed += 1;
                }
                Err(e) => error!(
                    "Decode failed for batch {} ({} samples): {e}",
                    outcome.batch, outcome.samples
                ),
            }
        }
        routed
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Decode worker panicked");
            }
        }
    }
}

impl Drop for DecodeDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::schedule::{Completion, PlaybackDriver, UnitId};
    use crate::structs::adts::ADTS_HEADER_LEN;
    use crate::structs::asc::{AudioSpecificConfig, RuntimeClass};
    use crate::utils::errors::PlaybackError;
    use std::sync::Mutex;

    /// Records every submission and fails the ones listed in `fail`.
    struct Scripted {
        seen: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: Vec<usize>,
    }

    impl DecodeBackend for Scripted {
        fn decode(&mut self, adts: &[u8]) -> Result<PcmBuffer, DecodeError> {
            let mut seen = self.seen.lock().unwrap();
            let index = seen.len();
            seen.push(adts.to_vec());
            if self.fail.contains(&index) {
                return Err(DecodeError::Rejected(format!("batch {index}")));
            }
            Ok(PcmBuffer::new(vec![0.25; 2048], 44100, 2))
        }
    }

    /// Finishes every unit as soon as it starts.
    struct Immediate;

    impl PlaybackSink for Immediate {
        fn start(
            &mut self,
            _unit: UnitId,
            _buffer: PcmBuffer,
            _offset: Duration,
            _duration: Duration,
            done: Completion,
        ) -> Result<(), PlaybackError> {
            done.notify();
            Ok(())
        }
        fn stop(&mut self, _unit: UnitId) {}
        fn set_gain(&mut self, _gain: f32) {}
    }

    fn lc_metadata() -> AudioMetadata {
        let mut meta = AudioMetadata::provisional(44100, 2);
        let asc = AudioSpecificConfig::parse(&[0x12, 0x10], &RuntimeClass::LcOnly).unwrap();
        meta.apply_config(&asc);
        meta
    }

    fn track_with(payloads: &[&[u8]]) -> AudioTrack {
        let mut track = AudioTrack::default();
        for (i, payload) in payloads.iter().enumerate() {
            track.push(Sample::new(payload, i as i64 * 23));
        }
        track
    }

    fn scripted(fail: Vec<usize>) -> (Box<Scripted>, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(Scripted {
                seen: seen.clone(),
                fail,
            }),
            seen,
        )
    }

    #[test]
    fn submits_every_throttle_deliveries() {
        let (backend, seen) = scripted(vec![]);
        let mut dispatcher = DecodeDispatcher::new(backend, 3);
        dispatcher.set_metadata(&lc_metadata());

        assert!(!dispatcher.deliver(&track_with(&[&[1]])));
        assert!(!dispatcher.deliver(&track_with(&[&[2, 2]])));
        assert!(dispatcher.deliver(&track_with(&[&[3, 3, 3]])));
        assert!(!dispatcher.deliver(&track_with(&[&[4]])));

        let outcomes = dispatcher.finish();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].samples, 3);
        assert_eq!(outcomes[1].samples, 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].len(), 3 * ADTS_HEADER_LEN + 6);
        assert_eq!(seen[0][..2], [0xFF, 0xF1]);
        assert_eq!(seen[0][ADTS_HEADER_LEN], 1);
        assert_eq!(seen[1].len(), ADTS_HEADER_LEN + 1);
        assert_eq!(dispatcher.stats().submitted, 2);
    }

    #[test]
    fn failed_batch_does_not_stop_later_ones() {
        let (backend, _) = scripted(vec![0]);
        let mut dispatcher = DecodeDispatcher::new(backend, 1);
        dispatcher.set_metadata(&lc_metadata());

        dispatcher.deliver(&track_with(&[&[0xAA]]));
        dispatcher.deliver(&track_with(&[&[0xBB]]));
        let outcomes = dispatcher.finish();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].result, Err(DecodeError::Rejected(_))));
        assert!(outcomes[1].result.is_ok());
        assert_eq!(outcomes[1].batch, 1);
        assert_eq!(dispatcher.stats().failed, 1);
        assert_eq!(dispatcher.stats().decoded, 1);
    }

    #[test]
    fn failed_batch_leaves_one_buffer_for_playback() {
        let (backend, seen) = scripted(vec![0]);
        let mut dispatcher = DecodeDispatcher::new(backend, 1);
        dispatcher.set_metadata(&lc_metadata());
        let mut scheduler = PlaybackScheduler::new(Immediate);

        dispatcher.deliver(&track_with(&[&[0xAA]]));
        dispatcher.deliver(&track_with(&[&[0xBB]]));
        assert_eq!(dispatcher.finish_into(&mut scheduler), 1);

        assert_eq!(scheduler.stats().queued, 1);
        assert_eq!(scheduler.stats().started, 1);
        // The failed batch is not retried.
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[test]
    fn worker_pushes_to_playback_in_order() {
        let (backend, seen) = scripted(vec![1]);
        let driver = PlaybackDriver::spawn(PlaybackScheduler::new(Immediate));
        let mut dispatcher = DecodeDispatcher::with_playback(backend, 1, driver.sender());
        dispatcher.set_metadata(&lc_metadata());

        for payload in [[1u8], [2], [3]] {
            dispatcher.deliver(&track_with(&[&payload[..]]));
        }
        assert!(dispatcher.finish().is_empty());
        assert!(driver.wait_idle(Duration::from_secs(1)));

        let stats = driver.lock().stats();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(dispatcher.stats().decoded, 2);
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[test]
    fn samples_without_metadata_are_dropped() {
        let (backend, seen) = scripted(vec![]);
        let mut dispatcher = DecodeDispatcher::new(backend, 1);

        assert!(!dispatcher.deliver(&track_with(&[&[1, 2]])));
        assert!(dispatcher.finish().is_empty());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(dispatcher.stats().dropped_samples, 1);
    }

    #[test]
    fn closed_dispatcher_ignores_deliveries() {
        let (backend, seen) = scripted(vec![]);
        let mut dispatcher = DecodeDispatcher::new(backend, 2);
        dispatcher.set_metadata(&lc_metadata());

        dispatcher.deliver(&track_with(&[&[1]]));
        dispatcher.close();
        assert!(dispatcher.is_closed());
        assert!(!dispatcher.deliver(&track_with(&[&[2]])));
        assert!(!dispatcher.flush());
        assert!(dispatcher.finish().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_throttle_behaves_as_one() {
        let (backend, _) = scripted(vec![]);
        let mut dispatcher = DecodeDispatcher::new(backend, 0);
        dispatcher.set_metadata(&lc_metadata());

        assert_eq!(dispatcher.throttle(), 1);
        assert!(dispatcher.deliver(&track_with(&[&[1]])));
    }

    #[test]
    fn pcm_duration_follows_frames() {
        let pcm = PcmBuffer::new(vec![0.0; 2 * 44100], 44100, 2);
        assert_eq!(pcm.frames(), 44100);
        assert_eq!(pcm.duration(), Duration::from_secs(1));
        assert_eq!(PcmBuffer::new(vec![], 0, 0).duration(), Duration::ZERO);
    }
}
