use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::process::assemble::ChunkAssembler;
use crate::process::demux::{DemuxListener, DemuxStats, TagParser};
use crate::process::dispatch::{DEFAULT_THROTTLE, DecodeBackend, DecodeDispatcher, DispatchStats};
use crate::process::schedule::{
    PlaybackDriver, PlaybackScheduler, PlaybackSink, PlaybackStats, VolumeCallback,
};
use crate::structs::asc::{RuntimeClass, RuntimeDecodePolicy};
use crate::structs::metadata::{AudioMetadata, MediaInfo};
use crate::structs::track::AudioTrack;
use crate::utils::errors::{ConfigError, DemuxError, ErrorKind, SessionError, StreamError};
use crate::utils::lock;

/// Wakes a [`ByteSource`] blocked in `next_chunk`. Called from any thread.
pub type AbortHook = Box<dyn Fn() + Send + Sync>;

/// Pull-based source of stream bytes.
pub trait ByteSource {
    /// Next chunk in stream order, `None` at end of stream.
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError>;

    /// Hook that makes a read in progress, and every later one, return
    /// promptly. Sources that never block can keep the default.
    fn abort_hook(&self) -> Option<AbortHook> {
        None
    }
}

impl ByteSource for VecDeque<Vec<u8>> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        Ok(self.pop_front())
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<AbortHook>>,
}

/// Cancels a running [`Session::run`] from another thread.
///
/// Cancelling also fires the abort hook of the source being read, so a read
/// that is stuck waiting for data returns early.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<CancelState>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
        let hooks = std::mem::take(&mut *lock(&self.0.hooks));
        for hook in hooks {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Runs `hook` on the next cancel, or right away when already cancelled.
    fn register(&self, hook: AbortHook) {
        let mut hooks = lock(&self.0.hooks);
        if self.is_cancelled() {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(hook);
    }

    fn clear_hooks(&self) {
        lock(&self.0.hooks).clear();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    pub chunks: u64,
    pub bytes: u64,
    pub demux_errors: u64,
    pub demux: DemuxStats,
    pub dispatch: DispatchStats,
    pub playback: PlaybackStats,
}

/// Demux listener that feeds the dispatcher.
struct Pipeline {
    dispatcher: DecodeDispatcher,
    media_info: Option<MediaInfo>,
    metadata: Option<AudioMetadata>,
    errors: u64,
}

impl DemuxListener for Pipeline {
    fn on_error(&mut self, kind: ErrorKind, error: &DemuxError) {
        self.errors += 1;
        debug!("Tag dropped ({kind}): {error}");
    }

    fn on_media_info(&mut self, info: &MediaInfo) {
        if let Some(mime_type) = &info.mime_type {
            info!("Media info: {mime_type}");
        }
        self.media_info = Some(info.clone());
    }

    fn on_track_metadata(&mut self, meta: &AudioMetadata) {
        info!(
            "Audio track: {} Hz, {} channels, {} (stream {})",
            meta.sample_rate,
            meta.channel_count,
            meta.codec.as_deref().unwrap_or("unknown"),
            meta.original_codec.as_deref().unwrap_or("unknown"),
        );
        self.dispatcher.set_metadata(meta);
        self.metadata = Some(meta.clone());
    }

    fn on_data_available(&mut self, track: &AudioTrack) {
        self.dispatcher.deliver(track);
    }
}

/// Configures a [`Session`].
///
/// A decode backend and a playback sink are required.
pub struct SessionBuilder {
    decoder: Option<Box<dyn DecodeBackend>>,
    sink: Option<Box<dyn PlaybackSink + Send>>,
    policy: Box<dyn RuntimeDecodePolicy>,
    throttle: usize,
    timestamp_base: i64,
    volume: Option<f32>,
    volume_callback: Option<VolumeCallback>,
    fail_level: log::Level,
    debug: bool,
    drain_timeout: Duration,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            decoder: None,
            sink: None,
            policy: Box::new(RuntimeClass::default()),
            throttle: DEFAULT_THROTTLE,
            timestamp_base: 0,
            volume: None,
            volume_callback: None,
            fail_level: log::Level::Error,
            debug: false,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decoder(mut self, decoder: Box<dyn DecodeBackend>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn sink(mut self, sink: Box<dyn PlaybackSink + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(mut self, policy: Box<dyn RuntimeDecodePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Deliveries per decode batch. Must be at least 1.
    pub fn throttle(mut self, throttle: usize) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn timestamp_base(mut self, base: i64) -> Self {
        self.timestamp_base = base;
        self
    }

    /// Initial volume on a `[0, 1]` scale.
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn on_volume_change(mut self, callback: VolumeCallback) -> Self {
        self.volume_callback = Some(callback);
        self
    }

    /// Structural warnings become errors at `log::Level::Warn`.
    pub fn fail_level(mut self, level: log::Level) -> Self {
        self.fail_level = level;
        self
    }

    /// Logs per-chunk progress at info level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Longest wait for a playback completion while draining at end of
    /// stream.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Session, ConfigError> {
        let decoder = self.decoder.ok_or(ConfigError::MissingDecoder)?;
        let sink = self.sink.ok_or(ConfigError::MissingSink)?;
        if self.throttle == 0 {
            return Err(ConfigError::ZeroThrottle);
        }

        let mut scheduler = PlaybackScheduler::new(sink);
        if let Some(callback) = self.volume_callback {
            scheduler = scheduler.with_volume_callback(callback);
        }
        if let Some(volume) = self.volume {
            scheduler.set_volume(volume);
        }
        let playback = PlaybackDriver::spawn(scheduler);

        let pipeline = Pipeline {
            dispatcher: DecodeDispatcher::with_playback(decoder, self.throttle, playback.sender()),
            media_info: None,
            metadata: None,
            errors: 0,
        };

        let mut parser = TagParser::new(pipeline).with_policy(self.policy);
        parser.set_timestamp_base(self.timestamp_base);
        parser.set_fail_level(self.fail_level);

        Ok(Session {
            assembler: ChunkAssembler::default(),
            parser,
            playback,
            cancel: CancelHandle::default(),
            debug: self.debug,
            drain_timeout: self.drain_timeout,
            destroyed: false,
            chunks: 0,
            bytes: 0,
        })
    }
}

/// Streams an FLV source through demux, decode and playback.
///
/// Chunks are parsed on the caller's thread. Decoding runs on a worker that
/// queues buffers for playback directly, and playback advances on its own
/// thread, so a source that stalls does not hold back audio that is already
/// decoded.
pub struct Session {
    assembler: ChunkAssembler,
    parser: TagParser<Pipeline>,
    playback: PlaybackDriver<Box<dyn PlaybackSink + Send>>,
    cancel: CancelHandle,
    debug: bool,
    drain_timeout: Duration,
    destroyed: bool,
    chunks: u64,
    bytes: u64,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Reads `source` to the end, then waits for playback to drain.
    ///
    /// A source error destroys the session and is returned. Demux errors are
    /// returned only for an unreadable header or, in strict mode, for
    /// structural warnings. Cancelling through [`cancel_handle`](Self::cancel_handle)
    /// aborts the read in progress, destroys the session and returns normally.
    pub fn run<B: ByteSource + ?Sized>(
        &mut self,
        source: &mut B,
    ) -> Result<SessionStats, SessionError> {
        if self.destroyed {
            return Err(SessionError::Destroyed);
        }

        if let Some(hook) = source.abort_hook() {
            self.cancel.register(hook);
        }
        let result = self.read_to_end(source);
        self.cancel.clear_hooks();
        result
    }

    fn read_to_end<B: ByteSource + ?Sized>(
        &mut self,
        source: &mut B,
    ) -> Result<SessionStats, SessionError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled());
            }

            let next = source.next_chunk();
            // Whatever the read produced belongs to a cancelled session.
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled());
            }

            match next {
                Ok(Some(chunk)) => {
                    if let Err(e) = self.feed(&chunk) {
                        self.destroy();
                        return Err(e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("{e}");
                    self.destroy();
                    return Err(e.into());
                }
            }
        }

        self.finish()?;
        Ok(self.stats())
    }

    fn cancelled(&mut self) -> SessionStats {
        info!("Session cancelled");
        self.destroy();
        self.stats()
    }

    /// Pushes one chunk through the assembler and the parser. Returns the
    /// number of bytes of the assembled chunk the parser consumed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize, SessionError> {
        if self.destroyed {
            return Err(SessionError::Destroyed);
        }

        self.chunks += 1;
        self.bytes += bytes.len() as u64;

        let Some(chunk) = self.assembler.push_bytes(bytes) else {
            trace!("Chunk {} buffered until the FLV header is complete", self.chunks);
            return Ok(0);
        };

        self.parser.begin_chunk_group();
        let consumed = self.parser.parse(&chunk.data, chunk.byte_start)?;
        let assembled = chunk.data.len();
        self.assembler.commit(chunk, consumed);
        self.parser.end_chunk_group();

        if self.debug {
            let dispatch = self.parser.listener().dispatcher.stats();
            info!(
                "Chunk {}: {} bytes in, {consumed}/{assembled} parsed, {} batches submitted, {} buffers queued",
                self.chunks,
                bytes.len(),
                dispatch.submitted,
                self.playback.lock().queued()
            );
        }

        Ok(consumed)
    }

    /// Decodes what is left and waits for playback to drain.
    pub fn finish(&mut self) -> Result<(), SessionError> {
        if self.destroyed {
            return Err(SessionError::Destroyed);
        }

        if self.assembler.pending_len() > 0 {
            warn!(
                "Unexpected end of stream, {} bytes of a partial tag discarded",
                self.assembler.pending_len()
            );
        }

        // The worker hands every remaining buffer to playback before exiting.
        self.parser.listener_mut().dispatcher.finish();

        if !self.playback.wait_idle(self.drain_timeout) {
            warn!("Playback did not drain within {:?}", self.drain_timeout);
        }
        Ok(())
    }

    /// Stops playback and decoding. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        debug!("Destroying session");
        self.cancel.cancel();
        self.parser.listener_mut().dispatcher.close();
        self.playback.shutdown();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.playback.lock().set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.playback.lock().volume()
    }

    pub fn metadata(&self) -> Option<&AudioMetadata> {
        self.parser.listener().metadata.as_ref()
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.parser.listener().media_info.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks: self.chunks,
            bytes: self.bytes,
            demux_errors: self.parser.listener().errors,
            demux: self.parser.stats(),
            dispatch: self.parser.listener().dispatcher.stats(),
            playback: self.playback.lock().stats(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::EXAMPLE_DATA;
    use crate::process::dispatch::PcmBuffer;
    use crate::process::schedule::{Completion, UnitId};
    use crate::structs::adts::ADTS_HEADER_LEN;
    use crate::utils::errors::{DecodeError, PlaybackError};
    use crate::utils::synth::FlvStreamBuilder;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    /// One PCM sample per input byte, so batch sizes are visible downstream.
    struct ByteCount(Arc<Mutex<Vec<usize>>>);

    impl DecodeBackend for ByteCount {
        fn decode(&mut self, adts: &[u8]) -> Result<PcmBuffer, DecodeError> {
            self.0.lock().unwrap().push(adts.len());
            Ok(PcmBuffer::new(vec![0.0; adts.len()], 1000, 1))
        }
    }

    struct Played(Arc<Mutex<Vec<usize>>>);

    impl PlaybackSink for Played {
        fn start(
            &mut self,
            _unit: UnitId,
            buffer: PcmBuffer,
            _offset: Duration,
            _duration: Duration,
            done: Completion,
        ) -> Result<(), PlaybackError> {
            self.0.lock().unwrap().push(buffer.samples.len());
            done.notify();
            Ok(())
        }
        fn stop(&mut self, _unit: UnitId) {}
        fn set_gain(&mut self, _gain: f32) {}
    }

    struct Failing;

    impl ByteSource for Failing {
        fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            Err(StreamError::Aborted("connection reset".into()))
        }
    }

    fn session(throttle: usize) -> (Session, Arc<Mutex<Vec<usize>>>, Arc<Mutex<Vec<usize>>>) {
        let decoded = Arc::new(Mutex::new(Vec::new()));
        let played = Arc::new(Mutex::new(Vec::new()));
        let session = SessionBuilder::new()
            .decoder(Box::new(ByteCount(decoded.clone())))
            .sink(Box::new(Played(played.clone())))
            .policy(Box::new(RuntimeClass::LcOnly))
            .throttle(throttle)
            .drain_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        (session, decoded, played)
    }

    #[test]
    fn builder_requires_decoder_and_sink() {
        assert_eq!(
            SessionBuilder::new().build().err(),
            Some(ConfigError::MissingDecoder)
        );
        assert_eq!(
            SessionBuilder::new()
                .decoder(Box::new(ByteCount(Arc::default())))
                .build()
                .err(),
            Some(ConfigError::MissingSink)
        );
        assert_eq!(
            SessionBuilder::new()
                .decoder(Box::new(ByteCount(Arc::default())))
                .sink(Box::new(Played(Arc::default())))
                .throttle(0)
                .build()
                .err(),
            Some(ConfigError::ZeroThrottle)
        );
    }

    #[test]
    fn plays_example_stream_end_to_end() -> anyhow::Result<()> {
        let (mut session, decoded, played) = session(5);
        let mut source: VecDeque<Vec<u8>> =
            EXAMPLE_DATA.chunks(7).map(|c| c.to_vec()).collect();

        let stats = session.run(&mut source)?;
        assert_eq!(stats.demux.samples, 2);
        assert_eq!(stats.dispatch.submitted, 1);
        assert_eq!(stats.playback.started, 1);

        // Two frames of 4 and 3 bytes, each behind an ADTS header.
        let expected = 2 * ADTS_HEADER_LEN + 7;
        assert_eq!(*decoded.lock().unwrap(), vec![expected]);
        assert_eq!(*played.lock().unwrap(), vec![expected]);

        let meta = session.metadata().unwrap();
        assert_eq!(meta.sample_rate, 44100);
        assert_eq!(meta.codec.as_deref(), Some("mp4a.40.2"));
        assert!(session.media_info().unwrap().is_complete());
        Ok(())
    }

    /// One chunk per tag after the header, so each 10-byte frame is its own
    /// delivery.
    fn tag_per_chunk(frames: u32) -> VecDeque<Vec<u8>> {
        let mut builder = FlvStreamBuilder::audio_only().sequence_header(0, &[0x12, 0x10]);
        for i in 0..frames {
            builder = builder.raw_frame(i * 23, &[i as u8; 10]);
        }
        let stream = builder.build();

        let mut chunks = VecDeque::new();
        chunks.push_back(stream[..13 + 19].to_vec());
        for tag in stream[13 + 19..].chunks(11 + 12 + 4) {
            chunks.push_back(tag.to_vec());
        }
        chunks
    }

    #[test]
    fn batches_follow_the_throttle() -> anyhow::Result<()> {
        let mut source = tag_per_chunk(6);
        let (mut session, decoded, played) = session(2);
        let stats = session.run(&mut source)?;

        assert_eq!(stats.dispatch.deliveries, 6);
        assert_eq!(stats.dispatch.submitted, 3);
        let frame = ADTS_HEADER_LEN + 10;
        assert_eq!(*decoded.lock().unwrap(), vec![2 * frame; 3]);
        assert_eq!(played.lock().unwrap().len(), 3);
        Ok(())
    }

    #[test]
    fn source_error_destroys_the_session() {
        let (mut session, _, _) = session(1);

        let result = session.run(&mut Failing);
        assert!(matches!(result, Err(SessionError::Stream(_))));
        assert!(session.is_destroyed());
        assert!(matches!(session.feed(EXAMPLE_DATA), Err(SessionError::Destroyed)));

        session.destroy();
    }

    #[test]
    fn bad_header_is_fatal() {
        let (mut session, _, _) = session(1);
        let mut source = VecDeque::from([b"NOTFLV-AT-ALL-0123456789".to_vec()]);

        let result = session.run(&mut source);
        assert!(matches!(
            result,
            Err(SessionError::Demux(DemuxError::SignatureMismatch(_)))
        ));
        assert_eq!(
            result.err().and_then(|e| e.kind()),
            Some(ErrorKind::Format)
        );
    }

    #[test]
    fn cancel_stops_reading() -> anyhow::Result<()> {
        let (mut session, decoded, _) = session(1);
        session.cancel_handle().cancel();

        let mut source = VecDeque::from([EXAMPLE_DATA.to_vec()]);
        let stats = session.run(&mut source)?;
        assert_eq!(stats.chunks, 0);
        assert!(session.is_destroyed());
        assert!(decoded.lock().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn volume_round_trips_through_gain() {
        let (mut session, _, _) = session(1);
        assert_eq!(session.volume(), 1.0);
        session.set_volume(0.8);
        assert!((session.volume() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn oversized_header_is_fatal() {
        let (mut session, _, _) = session(1);
        let mut stream = EXAMPLE_DATA.to_vec();
        stream[5..9].copy_from_slice(&u32::MAX.to_be_bytes());

        let result = session.run(&mut VecDeque::from([stream]));
        assert!(matches!(
            result,
            Err(SessionError::Demux(DemuxError::HeaderTooLarge(_)))
        ));
        assert!(session.is_destroyed());
    }

    /// Every batch decodes to 50 ms of mono audio.
    struct FixedLength;

    impl DecodeBackend for FixedLength {
        fn decode(&mut self, _adts: &[u8]) -> Result<PcmBuffer, DecodeError> {
            Ok(PcmBuffer::new(vec![0.0; 50], 1000, 1))
        }
    }

    /// Completes each unit once its duration has passed.
    struct Timed(Arc<Mutex<Vec<Instant>>>);

    impl PlaybackSink for Timed {
        fn start(
            &mut self,
            _unit: UnitId,
            _buffer: PcmBuffer,
            _offset: Duration,
            duration: Duration,
            done: Completion,
        ) -> Result<(), PlaybackError> {
            self.0.lock().unwrap().push(Instant::now());
            thread::spawn(move || {
                thread::sleep(duration);
                done.notify();
            });
            Ok(())
        }
        fn stop(&mut self, _unit: UnitId) {}
        fn set_gain(&mut self, _gain: f32) {}
    }

    /// Hands out its chunks 5 ms apart, then stalls before reporting the end.
    struct Stalling {
        chunks: VecDeque<Vec<u8>>,
        stall: Duration,
        released: Option<Instant>,
    }

    impl ByteSource for Stalling {
        fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            if let Some(chunk) = self.chunks.pop_front() {
                thread::sleep(Duration::from_millis(5));
                return Ok(Some(chunk));
            }
            thread::sleep(self.stall);
            self.released = Some(Instant::now());
            Ok(None)
        }
    }

    #[test]
    fn playback_continues_while_the_source_stalls() -> anyhow::Result<()> {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let mut session = SessionBuilder::new()
            .decoder(Box::new(FixedLength))
            .sink(Box::new(Timed(starts.clone())))
            .policy(Box::new(RuntimeClass::LcOnly))
            .throttle(1)
            .drain_timeout(Duration::from_secs(5))
            .build()?;

        let mut source = Stalling {
            chunks: tag_per_chunk(4),
            stall: Duration::from_millis(500),
            released: None,
        };
        let stats = session.run(&mut source)?;
        assert_eq!(stats.playback.started, 4);
        assert_eq!(stats.playback.completed, 4);

        // Four 50 ms units play out while the last read is still blocked.
        let starts = starts.lock().unwrap();
        let released = source.released.unwrap();
        assert!(starts[3] < released);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] < Duration::from_millis(250));
        }
        Ok(())
    }

    /// Blocks until its abort hook fires.
    struct Blocked {
        wake_tx: mpsc::Sender<()>,
        wake_rx: mpsc::Receiver<()>,
    }

    impl ByteSource for Blocked {
        fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            match self.wake_rx.recv_timeout(Duration::from_secs(5)) {
                Ok(()) => Err(StreamError::Aborted("woken".into())),
                Err(_) => Ok(Some(EXAMPLE_DATA.to_vec())),
            }
        }

        fn abort_hook(&self) -> Option<AbortHook> {
            let wake = self.wake_tx.clone();
            Some(Box::new(move || {
                let _ = wake.send(());
            }))
        }
    }

    #[test]
    fn cancel_aborts_a_blocked_read() -> anyhow::Result<()> {
        let (mut session, decoded, _) = session(1);
        let (wake_tx, wake_rx) = mpsc::channel();
        let mut source = Blocked { wake_tx, wake_rx };

        let cancel = session.cancel_handle();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });

        let begin = Instant::now();
        let stats = session.run(&mut source)?;
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert!(session.is_destroyed());
        assert_eq!(stats.chunks, 0);
        assert!(decoded.lock().unwrap().is_empty());

        canceller.join().unwrap();
        Ok(())
    }

    /// Yields one chunk, then cancels its own session during the second read
    /// and returns `tail`.
    struct CancelsOnSecondRead {
        cancel: CancelHandle,
        reads: usize,
        tail: Option<Vec<u8>>,
    }

    impl ByteSource for CancelsOnSecondRead {
        fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            self.reads += 1;
            if self.reads == 1 {
                return Ok(Some(EXAMPLE_DATA.to_vec()));
            }
            self.cancel.cancel();
            Ok(self.tail.take())
        }
    }

    #[test]
    fn read_result_after_cancel_is_discarded() -> anyhow::Result<()> {
        for tail in [None, Some(EXAMPLE_DATA.to_vec())] {
            let (mut session, decoded, played) = session(5);
            let mut source = CancelsOnSecondRead {
                cancel: session.cancel_handle(),
                reads: 0,
                tail,
            };

            let stats = session.run(&mut source)?;
            assert_eq!(stats.chunks, 1);
            assert_eq!(stats.demux.samples, 2);
            assert!(session.is_destroyed());
            // End of stream would have flushed the partial batch.
            assert!(decoded.lock().unwrap().is_empty());
            assert!(played.lock().unwrap().is_empty());
        }
        Ok(())
    }
}
