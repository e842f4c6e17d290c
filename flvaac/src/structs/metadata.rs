//! Audio track metadata and aggregate media information.

use crate::structs::asc::AudioSpecificConfig;
use crate::structs::track::AUDIO_TRACK_ID;

/// Samples decoded from one AAC frame.
pub const AAC_FRAME_SAMPLES: f64 = 1024.0;

/// Timescale of every timestamp the demuxer produces (milliseconds).
pub const TIMESCALE: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct AudioMetadata {
    pub id: u32,
    pub timescale: u32,
    pub duration: u64,
    pub sample_rate: u32,
    pub channel_count: u8,
    pub codec: Option<String>,
    pub original_codec: Option<String>,
    /// Object type after the decode policy has been applied.
    pub audio_object_type: u8,
    pub original_object_type: u8,
    pub sampling_frequency_index: u8,
    pub channel_config: u8,
    pub config: Vec<u8>,
    pub config_raw: Vec<u8>,
    /// Duration of one AAC frame in timescale units.
    pub ref_sample_duration: f64,
}

impl AudioMetadata {
    /// Metadata derived from the sound spec byte of the first audio tag,
    /// before any sequence header has been seen.
    pub fn provisional(sample_rate: u32, channel_count: u8) -> Self {
        Self {
            id: AUDIO_TRACK_ID,
            timescale: TIMESCALE,
            duration: 0,
            sample_rate,
            channel_count,
            codec: None,
            original_codec: None,
            audio_object_type: 0,
            original_object_type: 0,
            sampling_frequency_index: 0,
            channel_config: 0,
            config: Vec::new(),
            config_raw: Vec::new(),
            ref_sample_duration: 0.0,
        }
    }

    pub fn has_config(&self) -> bool {
        !self.config.is_empty()
    }

    /// Merges the fields of a parsed sequence header.
    ///
    /// Returns `true` when the stream shape (codec, rate, layout or config
    /// bytes) differs from what was stored before.
    pub fn apply_config(&mut self, asc: &AudioSpecificConfig) -> bool {
        let changed = self.config != asc.config
            || self.sample_rate != asc.sampling_rate
            || self.channel_config != asc.channel_config
            || self.audio_object_type != asc.audio_object_type;

        self.sample_rate = asc.sampling_rate;
        self.channel_count = asc.channel_config;
        self.codec = Some(asc.codec());
        self.original_codec = Some(asc.original_codec());
        self.config = asc.config.clone();
        self.config_raw = asc.config_raw.clone();
        self.audio_object_type = asc.audio_object_type;
        self.original_object_type = asc.original_object_type;
        self.sampling_frequency_index = asc.sampling_index;
        self.channel_config = asc.channel_config;
        self.ref_sample_duration =
            AAC_FRAME_SAMPLES / self.sample_rate as f64 * self.timescale as f64;

        changed
    }
}

/// Stream-level summary dispatched once it is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    pub mime_type: Option<String>,
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channel_count: Option<u8>,
}

impl MediaInfo {
    pub fn new(has_audio: bool, has_video: bool) -> Self {
        Self {
            has_audio,
            has_video,
            ..Default::default()
        }
    }

    pub fn update_audio(&mut self, meta: &AudioMetadata) {
        self.audio_codec = meta.original_codec.clone();
        self.audio_sample_rate = Some(meta.sample_rate);
        self.audio_channel_count = Some(meta.channel_count);

        // Video is never described, so only audio-only streams get a mime type.
        if !self.has_video {
            if let Some(codec) = &self.audio_codec {
                self.mime_type = Some(format!("video/x-flv; codecs=\"{codec}\""));
            }
        }
    }

    pub fn is_audio_complete(&self) -> bool {
        !self.has_audio
            || (self.audio_codec.is_some()
                && self.audio_sample_rate.is_some()
                && self.audio_channel_count.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.mime_type.is_some() && self.is_audio_complete() && !self.has_video
    }
}
