use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, trace, warn};

use crate::process::dispatch::PcmBuffer;
use crate::utils::errors::PlaybackError;
use crate::utils::lock;

/// Identifies one started playback unit. Never reused within a scheduler.
pub type UnitId = u64;

enum Event {
    Buffer(PcmBuffer),
    Complete(UnitId),
    /// Answered once every earlier event has been applied.
    Sync(mpsc::Sender<()>),
    Shutdown,
}

/// Handle a sink uses to report that a unit finished playing.
#[derive(Debug)]
pub struct Completion {
    unit: UnitId,
    tx: mpsc::Sender<Event>,
}

impl Completion {
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Reports the end of playback. Reports for units the scheduler has
    /// already moved past are ignored.
    pub fn notify(self) {
        // The scheduler may be gone already.
        let _ = self.tx.send(Event::Complete(self.unit));
    }
}

/// Queues decoded buffers on a scheduler from any thread.
#[derive(Debug, Clone)]
pub struct PlaybackSender {
    tx: mpsc::Sender<Event>,
}

impl PlaybackSender {
    /// Returns `false` once the scheduler is gone.
    pub fn push(&self, buffer: PcmBuffer) -> bool {
        self.tx.send(Event::Buffer(buffer)).is_ok()
    }
}

/// Audio output driven by the [`PlaybackScheduler`].
pub trait PlaybackSink {
    /// Starts playing `buffer` from `offset` for `duration`. The sink calls
    /// [`Completion::notify`] once playback ends, from any thread.
    fn start(
        &mut self,
        unit: UnitId,
        buffer: PcmBuffer,
        offset: Duration,
        duration: Duration,
        done: Completion,
    ) -> Result<(), PlaybackError>;

    /// Stops `unit` immediately if it is still playing.
    fn stop(&mut self, unit: UnitId);

    /// Linear output multiplier. Negative values invert the signal.
    fn set_gain(&mut self, gain: f32);
}

impl<S: PlaybackSink + ?Sized> PlaybackSink for Box<S> {
    fn start(
        &mut self,
        unit: UnitId,
        buffer: PcmBuffer,
        offset: Duration,
        duration: Duration,
        done: Completion,
    ) -> Result<(), PlaybackError> {
        (**self).start(unit, buffer, offset, duration, done)
    }

    fn stop(&mut self, unit: UnitId) {
        (**self).stop(unit)
    }

    fn set_gain(&mut self, gain: f32) {
        (**self).set_gain(gain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing playing. `since` is set when the queue ran dry after playback.
    Idle { since: Option<Instant> },
    Playing { unit: UnitId },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackStats {
    pub queued: u64,
    pub started: u64,
    pub completed: u64,
    pub start_failures: u64,
    pub stale_completions: u64,
    pub underruns: u64,
    /// Total duration of started units.
    pub played: Duration,
}

pub type VolumeCallback = Box<dyn FnMut(f32) + Send>;

/// Plays decoded buffers one after another.
///
/// Exactly one unit plays at a time. Starting a new unit stops the previous
/// one outright (hard cutover, no crossfade). Completions reported through
/// [`Completion`] handles and buffers queued through a [`PlaybackSender`] are
/// applied by [`pump`](Self::pump) or [`wait_idle`](Self::wait_idle), or
/// continuously once the scheduler runs inside a [`PlaybackDriver`].
pub struct PlaybackScheduler<S: PlaybackSink> {
    sink: S,
    queue: VecDeque<PcmBuffer>,
    state: SchedulerState,
    next_unit: UnitId,

    gain: f32,
    volume_callback: Option<VolumeCallback>,

    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,

    destroyed: bool,
    stats: PlaybackStats,
}

impl<S: PlaybackSink> PlaybackScheduler<S> {
    pub fn new(sink: S) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            sink,
            queue: VecDeque::new(),
            state: SchedulerState::Idle { since: None },
            next_unit: 0,
            gain: 1.0,
            volume_callback: None,
            events_tx,
            events_rx,
            destroyed: false,
            stats: PlaybackStats::default(),
        }
    }

    /// Called with the new volume in `[0, 1]` scale on every
    /// [`set_volume`](Self::set_volume).
    pub fn with_volume_callback(mut self, callback: VolumeCallback) -> Self {
        self.volume_callback = Some(callback);
        self
    }

    pub fn sender(&self) -> PlaybackSender {
        PlaybackSender {
            tx: self.events_tx.clone(),
        }
    }

    /// Queues a decoded buffer and starts it right away when idle.
    pub fn push(&mut self, buffer: PcmBuffer) {
        if self.destroyed {
            return;
        }

        self.queue.push_back(buffer);
        self.stats.queued += 1;

        if matches!(self.state, SchedulerState::Idle { .. }) {
            self.advance();
        }
    }

    /// Moves to the next queued buffer.
    ///
    /// Buffers the sink refuses to start are logged and skipped. With nothing
    /// left to play the scheduler goes idle and waits for the next push.
    pub fn advance(&mut self) {
        if self.destroyed {
            return;
        }

        if let SchedulerState::Playing { unit } = self.state {
            self.sink.stop(unit);
        }

        loop {
            let Some(buffer) = self.queue.pop_front() else {
                if let SchedulerState::Playing { .. } = self.state {
                    debug!("Playback queue ran dry, waiting for decoded audio");
                    self.stats.underruns += 1;
                }
                self.state = SchedulerState::Idle {
                    since: Some(Instant::now()),
                };
                return;
            };

            if let SchedulerState::Idle { since: Some(since) } = self.state {
                debug!("Resuming playback after {:?} idle", since.elapsed());
            }

            let unit = self.next_unit;
            self.next_unit += 1;

            let duration = buffer.duration();
            let done = Completion {
                unit,
                tx: self.events_tx.clone(),
            };

            match self.sink.start(unit, buffer, Duration::ZERO, duration, done) {
                Ok(()) => {
                    trace!("Started unit {unit} ({duration:?})");
                    self.state = SchedulerState::Playing { unit };
                    self.stats.started += 1;
                    self.stats.played += duration;
                    return;
                }
                Err(e) => {
                    error!("{e}");
                    self.stats.start_failures += 1;
                    self.state = SchedulerState::Idle { since: None };
                }
            }
        }
    }

    /// Applies a completion. Only the active unit advances the queue.
    pub fn on_unit_complete(&mut self, unit: UnitId) {
        if self.destroyed {
            return;
        }

        match self.state {
            SchedulerState::Playing { unit: active } if active == unit => {
                self.stats.completed += 1;
                self.advance();
            }
            _ => {
                trace!("Ignoring completion of stale unit {unit}");
                self.stats.stale_completions += 1;
            }
        }
    }

    /// Applies every event reported so far. Returns how many were read.
    pub fn pump(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            count += 1;
        }
        count
    }

    /// Blocks until the queue has played out. Gives up when no event
    /// arrives within `timeout`; returns whether the scheduler went idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        self.pump();
        while !self.destroyed && self.is_playing() {
            match self.events_rx.recv_timeout(timeout) {
                Ok(event) => {
                    self.apply(event);
                }
                Err(_) => {
                    warn!("No playback completion within {timeout:?}");
                    return false;
                }
            }
        }
        true
    }

    /// Returns `false` on shutdown.
    fn apply(&mut self, event: Event) -> bool {
        match event {
            Event::Buffer(buffer) => self.push(buffer),
            Event::Complete(unit) => self.on_unit_complete(unit),
            Event::Sync(ack) => {
                let _ = ack.send(());
            }
            Event::Shutdown => return false,
        }
        true
    }

    /// Sets the output volume on a `[0, 1]` scale. The sink receives
    /// `v * 2 - 1` as its gain: 1.0 is unity, 0.5 is silence and anything
    /// lower plays inverted.
    pub fn set_volume(&mut self, volume: f32) {
        self.gain = volume * 2.0 - 1.0;
        self.sink.set_gain(self.gain);
        if let Some(callback) = self.volume_callback.as_mut() {
            callback(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        (self.gain + 1.0) / 2.0
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Stops the active unit and drops the queue. Every later call is a
    /// no-op.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        if let SchedulerState::Playing { unit } = self.state {
            self.sink.stop(unit);
        }
        self.queue.clear();
        self.state = SchedulerState::Idle { since: None };
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, SchedulerState::Playing { .. })
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

struct Shared<S: PlaybackSink> {
    scheduler: Mutex<PlaybackScheduler<S>>,
    changed: Condvar,
}

fn spawn_playback_thread<S>(
    shared: Arc<Shared<S>>,
    events: mpsc::Receiver<Event>,
) -> thread::JoinHandle<()>
where
    S: PlaybackSink + Send + 'static,
{
    thread::spawn(move || {
        while let Ok(event) = events.recv() {
            let running = lock(&shared.scheduler).apply(event);
            shared.changed.notify_all();
            if !running {
                break;
            }
        }

        trace!("Playback thread exiting");
    })
}

/// Runs a [`PlaybackScheduler`] on its own thread.
///
/// The thread applies completions and queued buffers as they arrive, so the
/// next unit starts as soon as the previous one ends no matter what the
/// owner is doing. The owner reaches the scheduler through
/// [`lock`](Self::lock) for volume changes and statistics.
pub struct PlaybackDriver<S: PlaybackSink + Send + 'static> {
    shared: Arc<Shared<S>>,
    events: mpsc::Sender<Event>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<S: PlaybackSink + Send + 'static> PlaybackDriver<S> {
    pub fn spawn(mut scheduler: PlaybackScheduler<S>) -> Self {
        let (_, detached) = mpsc::channel();
        let events_rx = std::mem::replace(&mut scheduler.events_rx, detached);
        let events = scheduler.events_tx.clone();

        let shared = Arc::new(Shared {
            scheduler: Mutex::new(scheduler),
            changed: Condvar::new(),
        });
        let thread = spawn_playback_thread(shared.clone(), events_rx);

        Self {
            shared,
            events,
            thread: Some(thread),
        }
    }

    pub fn sender(&self) -> PlaybackSender {
        PlaybackSender {
            tx: self.events.clone(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PlaybackScheduler<S>> {
        lock(&self.shared.scheduler)
    }

    /// Waits until every event sent before this call has been applied.
    /// Returns `false` when the playback thread is gone.
    pub fn sync(&self) -> bool {
        let (ack, done) = mpsc::channel();
        if self.events.send(Event::Sync(ack)).is_err() {
            return false;
        }
        done.recv().is_ok()
    }

    /// Blocks until the queue has played out. Gives up when no unit completes
    /// within `timeout`; returns whether the scheduler went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.sync();

        let mut scheduler = self.lock();
        loop {
            if scheduler.is_destroyed() || !scheduler.is_playing() {
                return true;
            }

            let completed = scheduler.stats.completed;
            let (guard, wait) = self
                .shared
                .changed
                .wait_timeout_while(scheduler, timeout, |s| {
                    !s.is_destroyed() && s.is_playing() && s.stats.completed == completed
                })
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            scheduler = guard;

            if wait.timed_out() {
                warn!("No playback completion within {timeout:?}");
                return false;
            }
        }
    }

    /// Destroys the scheduler and joins the playback thread. Safe to call
    /// more than once.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.lock().destroy();
        let _ = self.events.send(Event::Shutdown);
        if thread.join().is_err() {
            error!("Playback thread panicked");
        }
    }
}

impl<S: PlaybackSink + Send + 'static> Drop for PlaybackDriver<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Start(UnitId, usize),
        Stop(UnitId),
        Gain(f32),
    }

    /// Keeps completions so tests decide when a unit ends.
    #[derive(Default)]
    struct ManualSink {
        events: Vec<Event>,
        pending: Vec<Completion>,
        refuse: Vec<UnitId>,
    }

    impl ManualSink {
        fn finish_oldest(&mut self) {
            if !self.pending.is_empty() {
                self.pending.remove(0).notify();
            }
        }
    }

    impl PlaybackSink for ManualSink {
        fn start(
            &mut self,
            unit: UnitId,
            buffer: PcmBuffer,
            offset: Duration,
            duration: Duration,
            done: Completion,
        ) -> Result<(), PlaybackError> {
            assert_eq!(offset, Duration::ZERO);
            assert_eq!(duration, buffer.duration());
            if self.refuse.contains(&unit) {
                return Err(PlaybackError::StartFailed {
                    unit,
                    reason: "device busy".into(),
                });
            }
            self.events.push(Event::Start(unit, buffer.samples.len()));
            self.pending.push(done);
            Ok(())
        }

        fn stop(&mut self, unit: UnitId) {
            self.events.push(Event::Stop(unit));
        }

        fn set_gain(&mut self, gain: f32) {
            self.events.push(Event::Gain(gain));
        }
    }

    fn pcm(len: usize) -> PcmBuffer {
        PcmBuffer::new(vec![0.0; len], 1000, 1)
    }

    fn starts(sink: &ManualSink) -> Vec<(UnitId, usize)> {
        sink.events
            .iter()
            .filter_map(|e| match e {
                Event::Start(unit, len) => Some((*unit, *len)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plays_buffers_in_push_order() {
        let mut scheduler = PlaybackScheduler::new(ManualSink::default());

        scheduler.push(pcm(10));
        scheduler.push(pcm(20));
        scheduler.push(pcm(30));
        assert_eq!(scheduler.state(), SchedulerState::Playing { unit: 0 });
        assert_eq!(scheduler.queued(), 2);

        for _ in 0..3 {
            scheduler.sink_mut().finish_oldest();
            scheduler.pump();
        }

        assert_eq!(starts(scheduler.sink()), vec![(0, 10), (1, 20), (2, 30)]);
        assert!(matches!(
            scheduler.state(),
            SchedulerState::Idle { since: Some(_) }
        ));
        assert_eq!(scheduler.stats().underruns, 1);
        assert_eq!(scheduler.stats().played, Duration::from_millis(60));
    }

    #[test]
    fn stale_completions_are_ignored() {
        let mut scheduler = PlaybackScheduler::new(ManualSink::default());
        scheduler.push(pcm(10));
        scheduler.push(pcm(10));

        scheduler.on_unit_complete(0);
        assert_eq!(scheduler.state(), SchedulerState::Playing { unit: 1 });

        // Unit 0 reports again, long after it was replaced.
        scheduler.on_unit_complete(0);
        assert_eq!(scheduler.state(), SchedulerState::Playing { unit: 1 });
        assert_eq!(scheduler.stats().stale_completions, 1);
    }

    #[test]
    fn advancing_stops_the_previous_unit() {
        let mut scheduler = PlaybackScheduler::new(ManualSink::default());
        scheduler.push(pcm(10));
        scheduler.push(pcm(10));
        scheduler.advance();

        assert_eq!(
            scheduler.sink().events,
            vec![Event::Start(0, 10), Event::Stop(0), Event::Start(1, 10)]
        );
    }

    #[test]
    fn refused_units_are_skipped() {
        let sink = ManualSink {
            refuse: vec![1],
            ..Default::default()
        };
        let mut scheduler = PlaybackScheduler::new(sink);
        scheduler.push(pcm(1));
        scheduler.push(pcm(2));
        scheduler.push(pcm(3));

        scheduler.on_unit_complete(0);
        assert_eq!(scheduler.state(), SchedulerState::Playing { unit: 2 });
        assert_eq!(starts(scheduler.sink()), vec![(0, 1), (2, 3)]);
        assert_eq!(scheduler.stats().start_failures, 1);
    }

    #[test]
    fn volume_maps_to_gain() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let mut scheduler = PlaybackScheduler::new(ManualSink::default())
            .with_volume_callback(Box::new(move |v| record.lock().unwrap().push(v)));

        scheduler.set_volume(0.5);
        assert_eq!(scheduler.gain(), 0.0);
        scheduler.set_volume(1.0);
        assert_eq!(scheduler.gain(), 1.0);
        assert_eq!(scheduler.volume(), 1.0);
        scheduler.set_volume(0.0);
        assert_eq!(scheduler.gain(), -1.0);
        assert_eq!(scheduler.volume(), 0.0);

        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0, 0.0]);
        assert_eq!(
            scheduler.sink().events,
            vec![Event::Gain(0.0), Event::Gain(1.0), Event::Gain(-1.0)]
        );
    }

    #[test]
    fn destroy_silences_everything() {
        let mut scheduler = PlaybackScheduler::new(ManualSink::default());
        scheduler.push(pcm(10));
        scheduler.push(pcm(10));

        scheduler.destroy();
        scheduler.destroy();
        scheduler.push(pcm(10));
        scheduler.on_unit_complete(0);
        scheduler.advance();

        assert!(scheduler.is_destroyed());
        assert_eq!(scheduler.queued(), 0);
        assert_eq!(
            scheduler.sink().events,
            vec![Event::Start(0, 10), Event::Stop(0)]
        );
    }

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

    #[test]
    fn wait_idle_drains_completions() {
        let mut scheduler = PlaybackScheduler::new(Immediate);
        scheduler.push(pcm(5));
        scheduler.push(pcm(5));
        assert!(scheduler.wait_idle(Duration::from_secs(1)));
        assert_eq!(scheduler.stats().started, 2);
        assert_eq!(scheduler.stats().completed, 2);
    }

    #[test]
    fn sender_queues_on_the_next_pump() {
        let mut scheduler = PlaybackScheduler::new(ManualSink::default());
        let sender = scheduler.sender();
        assert!(sender.push(pcm(10)));
        assert!(sender.push(pcm(20)));
        assert_eq!(scheduler.stats().queued, 0);

        assert_eq!(scheduler.pump(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Playing { unit: 0 });
        assert_eq!(scheduler.queued(), 1);
    }

    #[test]
    fn driver_plays_without_the_owner() {
        let mut driver = PlaybackDriver::spawn(PlaybackScheduler::new(Immediate));
        let sender = driver.sender();
        for _ in 0..3 {
            assert!(sender.push(pcm(5)));
        }

        assert!(driver.wait_idle(Duration::from_secs(1)));
        let stats = driver.lock().stats();
        assert_eq!(stats.started, 3);
        assert_eq!(stats.completed, 3);

        driver.shutdown();
        driver.shutdown();
        assert!(driver.lock().is_destroyed());
        assert!(!sender.push(pcm(5)));
    }

    #[test]
    fn driver_wait_gives_up_without_completions() {
        let driver = PlaybackDriver::spawn(PlaybackScheduler::new(ManualSink::default()));
        assert!(driver.sender().push(pcm(10)));

        assert!(!driver.wait_idle(Duration::from_millis(20)));
        assert_eq!(driver.lock().state(), SchedulerState::Playing { unit: 0 });
    }
}
