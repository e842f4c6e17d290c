//! ADTS framing for raw AAC access units.
//!
//! Decoders that read an elementary AAC stream need a 7-byte ADTS header in
//! front of every frame. The header written here has no CRC (protection
//! absent) and a buffer fullness of 0x7FF (variable rate).

use crate::structs::metadata::AudioMetadata;
use crate::structs::track::Sample;

pub const ADTS_HEADER_LEN: usize = 7;

/// Stream parameters copied into every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsParams {
    pub object_type: u8,
    pub sampling_index: u8,
    pub channel_config: u8,
}

impl From<&AudioMetadata> for AdtsParams {
    fn from(meta: &AudioMetadata) -> Self {
        Self {
            object_type: meta.audio_object_type,
            sampling_index: meta.sampling_frequency_index,
            channel_config: meta.channel_config,
        }
    }
}

impl AdtsParams {
    /// Header for a frame carrying `payload_len` bytes.
    ///
    /// The 13-bit frame length field wraps for payloads above 8184 bytes.
    pub fn header(&self, payload_len: usize) -> [u8; ADTS_HEADER_LEN] {
        let adts_len = payload_len + ADTS_HEADER_LEN;
        let profile = self.object_type.wrapping_sub(1);

        [
            0xFF,
            0xF0 | 1,
            profile << 6 | (self.sampling_index & 0x0F) << 2 | (self.channel_config & 0x04) >> 2,
            (self.channel_config & 0x03) << 6 | ((adts_len & 0x1800) >> 11) as u8,
            ((adts_len & 0x7F8) >> 3) as u8,
            ((adts_len & 0x7) << 5) as u8 | 0x1F,
            0xFC,
        ]
    }
}

/// Concatenates ADTS-framed samples into one decodable bitstream.
#[derive(Debug, Clone, Copy)]
pub struct AdtsFrameBuilder {
    params: AdtsParams,
}

impl AdtsFrameBuilder {
    pub fn new(params: AdtsParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> AdtsParams {
        self.params
    }

    /// Writes `[header, payload]` for every sample, in order.
    pub fn build<'a, I>(&self, samples: I) -> Vec<u8>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut out = Vec::new();
        for sample in samples {
            self.write_frame(sample.as_ref(), &mut out);
        }
        out
    }

    pub fn write_frame(&self, payload: &[u8], dst: &mut Vec<u8>) {
        dst.reserve(ADTS_HEADER_LEN + payload.len());
        dst.extend_from_slice(&self.params.header(payload.len()));
        dst.extend_from_slice(payload);
    }
}
