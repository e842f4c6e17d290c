use log::{debug, error, trace};

use crate::log_or_err;
use crate::structs::asc::{AudioSpecificConfig, RuntimeClass, RuntimeDecodePolicy};
use crate::structs::header::{FLV_SIGNATURE_LEN, PREV_TAG_SIZE_LEN, ProbeResult};
use crate::structs::metadata::{AudioMetadata, MediaInfo};
use crate::structs::tag::{TAG_HEADER_LEN, TAG_TRAILER_LEN, TagHeader, TagType};
use crate::structs::track::{AudioTrack, Sample};
use crate::utils::errors::{DemuxError, ErrorKind};

/// FLV sound rate index to Hz.
pub const FLV_SOUND_RATES: [u32; 5] = [5500, 11025, 22050, 44100, 48000];

const SOUND_FORMAT_MP3: u8 = 2;
const SOUND_FORMAT_AAC: u8 = 10;

const AAC_SEQUENCE_HEADER: u8 = 0;
const AAC_RAW: u8 = 1;

/// Receives everything the parser extracts.
///
/// All four capabilities are required; the parser cannot be built without
/// an implementation of each.
pub trait DemuxListener {
    /// A tag was dropped because of a format or codec problem.
    fn on_error(&mut self, kind: ErrorKind, error: &DemuxError);

    fn on_media_info(&mut self, info: &MediaInfo);

    /// Dispatched for the first sequence header and for later ones that
    /// change the stream configuration.
    fn on_track_metadata(&mut self, meta: &AudioMetadata);

    /// Samples accumulated since the previous delivery. The parser clears
    /// them once this returns.
    fn on_data_available(&mut self, track: &AudioTrack);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub tags: u64,
    pub audio_tags: u64,
    pub skipped_tags: u64,
    pub samples: u64,
    pub sequence_headers: u64,
    pub dropped_tags: u64,
}

#[derive(Debug)]
pub struct DemuxerState {
    pub fail_level: log::Level,

    probe: Option<ProbeResult>,
    first_parse: bool,
    dispatch: bool,

    has_audio: bool,
    has_video: bool,
    has_audio_override: Option<bool>,
    audio_initial_metadata_dispatched: bool,

    timestamp_base: i64,
    policy: Box<dyn RuntimeDecodePolicy>,

    metadata: Option<AudioMetadata>,
    media_info: MediaInfo,
    track: AudioTrack,

    stats: DemuxStats,
}

impl Default for DemuxerState {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            probe: None,
            first_parse: true,
            dispatch: false,
            has_audio: false,
            has_video: false,
            has_audio_override: None,
            audio_initial_metadata_dispatched: false,
            timestamp_base: 0,
            policy: Box::new(RuntimeClass::default()),
            metadata: None,
            media_info: MediaInfo::default(),
            track: AudioTrack::default(),
            stats: DemuxStats::default(),
        }
    }
}

impl DemuxerState {
    fn apply_probe(&mut self, probe: ProbeResult) {
        if self.probe.is_some() {
            return;
        }

        self.probe = Some(probe);
        self.has_audio = self.has_audio_override.unwrap_or(probe.has_audio_track);
        self.has_video = probe.has_video_track;
        self.media_info = MediaInfo::new(self.has_audio, self.has_video);
    }

    fn initial_metadata_dispatched(&self) -> bool {
        self.has_audio && self.audio_initial_metadata_dispatched
    }
}

/// Incremental FLV tag parser.
///
/// State persists across [`parse`](TagParser::parse) calls: the probed
/// header, the audio metadata and the pending samples. Chunks must be fed in
/// source order.
///
/// # Example
///
/// ```rust,no_run
/// use flvaac::process::EXAMPLE_DATA;
/// use flvaac::process::demux::{DemuxListener, TagParser};
/// use flvaac::structs::metadata::{AudioMetadata, MediaInfo};
/// use flvaac::structs::track::AudioTrack;
/// use flvaac::utils::errors::{DemuxError, ErrorKind};
///
/// #[derive(Default)]
/// struct Collect(Vec<Vec<u8>>);
///
/// impl DemuxListener for Collect {
///     fn on_error(&mut self, _kind: ErrorKind, _error: &DemuxError) {}
///     fn on_media_info(&mut self, _info: &MediaInfo) {}
///     fn on_track_metadata(&mut self, _meta: &AudioMetadata) {}
///     fn on_data_available(&mut self, track: &AudioTrack) {
///         self.0.extend(track.samples.iter().map(|s| s.unit.to_vec()));
///     }
/// }
///
/// let mut parser = TagParser::new(Collect::default());
/// let consumed = parser.parse(EXAMPLE_DATA, 0)?;
/// assert_eq!(consumed, EXAMPLE_DATA.len());
/// assert_eq!(parser.listener().0.len(), 2);
/// # Ok::<(), DemuxError>(())
/// ```
pub struct TagParser<L: DemuxListener> {
    state: DemuxerState,
    listener: L,
}

impl<L: DemuxListener> TagParser<L> {
    pub fn new(listener: L) -> Self {
        Self {
            state: DemuxerState::default(),
            listener,
        }
    }

    /// Replaces the policy used to rebuild AudioSpecificConfigs.
    pub fn with_policy(mut self, policy: Box<dyn RuntimeDecodePolicy>) -> Self {
        self.state.policy = policy;
        self
    }

    pub fn probe(bytes: &[u8]) -> Result<ProbeResult, DemuxError> {
        ProbeResult::probe(bytes)
    }

    /// Parses as many complete tags as `chunk` holds, starting at `byte_start`.
    ///
    /// A `byte_start` of 0 means the chunk begins with the FLV header, which
    /// is probed to find the first tag. Returns the offset up to which the
    /// chunk was consumed; the remainder belongs to a tag that continues in
    /// the next chunk.
    ///
    /// Tags with codec or format problems are reported to the listener and
    /// skipped. Structural inconsistencies are logged as warnings, or returned
    /// as errors when the fail level is raised to [`log::Level::Warn`].
    pub fn parse(&mut self, chunk: &[u8], byte_start: usize) -> Result<usize, DemuxError> {
        let mut offset = byte_start;

        if byte_start == 0 {
            if chunk.len() <= FLV_SIGNATURE_LEN + PREV_TAG_SIZE_LEN {
                return Ok(0);
            }

            let probe = ProbeResult::probe(chunk)?;
            self.state.apply_probe(probe);
            offset = probe.data_offset;
        }

        if self.state.first_parse {
            if chunk.len() < offset + PREV_TAG_SIZE_LEN {
                return Ok(byte_start);
            }
            self.state.first_parse = false;

            if let Some(probe) = self.state.probe {
                if offset != probe.data_offset {
                    log_or_err!(
                        self.state,
                        log::Level::Warn,
                        DemuxError::UnexpectedFirstOffset {
                            expected: probe.data_offset,
                            found: offset,
                        }
                    );
                }
            }

            let prev_tag_size = read_u32(chunk, offset);
            if prev_tag_size != 0 {
                log_or_err!(
                    self.state,
                    log::Level::Warn,
                    DemuxError::NonZeroPrevTagSize0(prev_tag_size)
                );
            }
            offset += PREV_TAG_SIZE_LEN;
        }

        while chunk.len().saturating_sub(offset) >= TAG_HEADER_LEN + TAG_TRAILER_LEN {
            self.state.dispatch = true;

            let Some(header) = TagHeader::read(&chunk[offset..]) else {
                break;
            };

            if offset + header.total_len() > chunk.len() {
                trace!(
                    "Tag at {offset} needs {} bytes, {} available",
                    header.total_len(),
                    chunk.len() - offset
                );
                break;
            }

            if header.stream_id != 0 {
                log_or_err!(
                    self.state,
                    log::Level::Warn,
                    DemuxError::NonZeroStreamId(header.stream_id)
                );
            }

            let body_start = offset + TAG_HEADER_LEN;
            let body = &chunk[body_start..body_start + header.data_size as usize];

            match header.tag_type {
                TagType::Audio => {
                    self.state.stats.audio_tags += 1;
                    self.parse_audio_data(body, header.timestamp)?;
                }
                TagType::Video | TagType::Script => {}
                TagType::Other(code) => {
                    self.state.stats.skipped_tags += 1;
                    offset += header.total_len();
                    log_or_err!(
                        self.state,
                        log::Level::Warn,
                        DemuxError::UnsupportedTagType(code)
                    );
                    continue;
                }
            }

            let prev_tag_size = read_u32(chunk, body_start + header.data_size as usize);
            if prev_tag_size != header.expected_trailer() {
                log_or_err!(
                    self.state,
                    log::Level::Warn,
                    DemuxError::TagSizeMismatch {
                        found: prev_tag_size,
                        expected: header.expected_trailer(),
                    }
                );
            }

            self.state.stats.tags += 1;
            offset += header.total_len();
        }

        if self.state.initial_metadata_dispatched() && self.state.dispatch {
            self.flush_track();
        }

        Ok(offset)
    }

    /// Starts a new chunk group. Samples left from the previous group are
    /// dropped; metadata is kept.
    pub fn begin_chunk_group(&mut self) {
        self.state.track.clear_samples();
    }

    pub fn end_chunk_group(&mut self) {
        if !self.state.track.is_empty() {
            debug!(
                "Dropping {} samples parsed before the first sequence header",
                self.state.track.samples.len()
            );
        }
        self.state.track.clear_samples();
        self.state.track.sequence_number += 1;
    }

    /// Milliseconds added to every tag timestamp.
    pub fn set_timestamp_base(&mut self, base: i64) {
        self.state.timestamp_base = base;
    }

    pub fn timestamp_base(&self) -> i64 {
        self.state.timestamp_base
    }

    /// Forces the audio-present flag. When forced to `false` every audio tag
    /// is ignored.
    pub fn override_has_audio(&mut self, has_audio: bool) {
        self.state.has_audio_override = Some(has_audio);
        self.state.has_audio = has_audio;
        self.state.media_info.has_audio = has_audio;
    }

    /// Sets the failure level for structural warnings.
    ///
    /// - `log::Level::Error`: warnings are only logged (default)
    /// - `log::Level::Warn`: warnings abort the current `parse` call
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.state.fail_level = level;
    }

    pub fn probe_result(&self) -> Option<ProbeResult> {
        self.state.probe
    }

    pub fn metadata(&self) -> Option<&AudioMetadata> {
        self.state.metadata.as_ref()
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.state.media_info
    }

    pub fn track(&self) -> &AudioTrack {
        &self.state.track
    }

    pub fn stats(&self) -> DemuxStats {
        self.state.stats
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    fn report(&mut self, error: DemuxError) {
        error!("{error}");
        self.state.stats.dropped_tags += 1;
        self.listener.on_error(error.kind(), &error);
    }

    fn flush_track(&mut self) {
        if self.state.track.is_empty() {
            return;
        }

        self.listener.on_data_available(&self.state.track);
        self.state.track.clear_samples();
    }

    fn parse_audio_data(&mut self, body: &[u8], tag_timestamp: u32) -> Result<(), DemuxError> {
        if body.len() <= 1 {
            log_or_err!(self.state, log::Level::Warn, DemuxError::EmptyAudioPacket);
            return Ok(());
        }

        if self.state.has_audio_override == Some(false) {
            return Ok(());
        }

        let sound_spec = body[0];

        let sound_format = sound_spec >> 4;
        if sound_format != SOUND_FORMAT_MP3 && sound_format != SOUND_FORMAT_AAC {
            self.report(DemuxError::UnsupportedCodec(sound_format));
            return Ok(());
        }

        let sound_rate_index = (sound_spec & 0x0C) >> 2;
        let Some(&sound_rate) = FLV_SOUND_RATES.get(sound_rate_index as usize) else {
            self.report(DemuxError::InvalidSoundRate(sound_rate_index));
            return Ok(());
        };

        let channel_count = if sound_spec & 0x01 != 0 { 2 } else { 1 };

        if self.state.metadata.is_none() {
            if !self.state.has_audio && self.state.has_audio_override.is_none() {
                self.state.has_audio = true;
                self.state.media_info.has_audio = true;
            }
            self.state.metadata = Some(AudioMetadata::provisional(sound_rate, channel_count));
        }

        if sound_format == SOUND_FORMAT_AAC {
            self.parse_aac_audio_data(&body[1..], tag_timestamp)
        } else {
            self.report(DemuxError::Mp3Unsupported);
            Ok(())
        }
    }

    fn parse_aac_audio_data(&mut self, data: &[u8], tag_timestamp: u32) -> Result<(), DemuxError> {
        if data.len() <= 1 {
            log_or_err!(self.state, log::Level::Warn, DemuxError::EmptyAacPacket);
            return Ok(());
        }

        match data[0] {
            AAC_SEQUENCE_HEADER => {
                match AudioSpecificConfig::parse(&data[1..], self.state.policy.as_ref()) {
                    Ok(asc) => self.apply_sequence_header(asc),
                    Err(e) => {
                        self.report(e);
                        Ok(())
                    }
                }
            }
            AAC_RAW => {
                let dts = self.state.timestamp_base + tag_timestamp as i64;
                self.state.track.push(Sample::new(&data[1..], dts));
                self.state.stats.samples += 1;
                Ok(())
            }
            packet_type => {
                self.report(DemuxError::UnsupportedPacketType(packet_type));
                Ok(())
            }
        }
    }

    fn apply_sequence_header(&mut self, asc: AudioSpecificConfig) -> Result<(), DemuxError> {
        self.state.stats.sequence_headers += 1;

        let repeated = self.state.metadata.as_ref().is_some_and(AudioMetadata::has_config);
        if repeated {
            log_or_err!(
                self.state,
                log::Level::Warn,
                DemuxError::DuplicateSequenceHeader
            );
        }

        let notify = if self.state.initial_metadata_dispatched() {
            // Frames parsed under the previous configuration go out first.
            self.flush_track();
            false
        } else {
            self.state.audio_initial_metadata_dispatched = true;
            true
        };

        let meta = self.state.metadata.get_or_insert_with(|| {
            AudioMetadata::provisional(asc.sampling_rate, asc.channel_config)
        });
        let changed = meta.apply_config(&asc);
        debug!(
            "Parsed AudioSpecificConfig: {} Hz, channel config {}, {}",
            meta.sample_rate,
            meta.channel_config,
            asc.codec()
        );

        self.state.dispatch = false;

        if !(notify || changed) {
            return Ok(());
        }

        if let Some(meta) = &self.state.metadata {
            self.listener.on_track_metadata(meta);
            self.state.media_info.update_audio(meta);
        }

        if self.state.media_info.is_complete() {
            self.listener.on_media_info(&self.state.media_info);
        }

        Ok(())
    }
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
