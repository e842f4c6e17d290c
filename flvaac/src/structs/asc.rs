//! AAC AudioSpecificConfig parsing and decode-profile selection.
//!
//! The sequence header of an AAC stream carries an AudioSpecificConfig:
//!
//! | field | bits |
//! |---|---|
//! | audio object type | 5 |
//! | sampling frequency index | 4 |
//! | channel configuration | 4 |
//! | extension sampling index (object type 5 only) | 4 |
//! | extension object type (object type 5 only) | 5 |
//!
//! Downstream decoders differ in which AAC profiles they accept, so the config
//! handed to them is rebuilt according to a [`RuntimeDecodePolicy`].

use std::fmt::{Debug, Display, Formatter};
use std::io;

use log::{debug, trace};

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DemuxError;

pub const MPEG_SAMPLING_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

pub const AOT_AAC_LC: u8 = 2;
pub const AOT_SBR: u8 = 5;

/// Object type and extension sampling index a policy settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileChoice {
    pub object_type: u8,
    pub extension_sampling_index: u8,
}

impl ProfileChoice {
    pub fn lc(sampling_index: u8) -> Self {
        Self {
            object_type: AOT_AAC_LC,
            extension_sampling_index: sampling_index,
        }
    }

    pub fn he(extension_sampling_index: u8) -> Self {
        Self {
            object_type: AOT_SBR,
            extension_sampling_index,
        }
    }

    /// HE-AAC configs carry the extension fields and are 4 bytes long.
    pub fn config_len(&self) -> usize {
        if self.object_type == AOT_SBR { 4 } else { 2 }
    }
}

/// Chooses the AAC profile announced to the decoder.
pub trait RuntimeDecodePolicy: Debug + Send + Sync {
    fn select(&self, sampling_index: u8, channel_config: u8) -> ProfileChoice;
}

/// Built-in policies keyed by the class of decoder runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RuntimeClass {
    /// SBR below 24 kHz, LC otherwise.
    LowRateSbr,
    /// Decoders that only handle LC.
    LcOnly,
    /// Announce HE-AAC so profile switches stay seamless, except for mono.
    #[default]
    PreferHe,
}

impl RuntimeDecodePolicy for RuntimeClass {
    fn select(&self, sampling_index: u8, channel_config: u8) -> ProfileChoice {
        match self {
            RuntimeClass::LowRateSbr => {
                if sampling_index >= 6 {
                    ProfileChoice::he(sampling_index - 3)
                } else {
                    ProfileChoice::lc(sampling_index)
                }
            }
            RuntimeClass::LcOnly => ProfileChoice::lc(sampling_index),
            RuntimeClass::PreferHe => {
                if sampling_index >= 6 {
                    ProfileChoice::he(sampling_index - 3)
                } else if channel_config == 1 {
                    ProfileChoice::lc(sampling_index)
                } else {
                    ProfileChoice::he(sampling_index)
                }
            }
        }
    }
}

impl Display for RuntimeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeClass::LowRateSbr => write!(f, "low-rate-sbr"),
            RuntimeClass::LcOnly => write!(f, "lc-only"),
            RuntimeClass::PreferHe => write!(f, "prefer-he"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Object type selected by the decode policy.
    pub audio_object_type: u8,
    /// Object type as signalled in the stream.
    pub original_object_type: u8,
    pub sampling_index: u8,
    pub sampling_rate: u32,
    pub channel_config: u8,
    pub extension_sampling_index: Option<u8>,
    pub extension_object_type: Option<u8>,
    /// Config bytes rebuilt for the decoder, 2 or 4 bytes.
    pub config: Vec<u8>,
    /// Config bytes as found in the sequence header.
    pub config_raw: Vec<u8>,
}

impl AudioSpecificConfig {
    pub fn parse(data: &[u8], policy: &dyn RuntimeDecodePolicy) -> Result<Self, DemuxError> {
        let reader = &mut BsIoSliceReader::from_slice(data);
        let truncated = |e: io::Error| DemuxError::ConfigTruncated(e.to_string());

        let original_object_type = reader.get_n::<u8>(5).map_err(truncated)?;

        let sampling_index = reader.get_n::<u8>(4).map_err(truncated)?;
        let Some(&sampling_rate) = MPEG_SAMPLING_RATES.get(sampling_index as usize) else {
            return Err(DemuxError::InvalidSamplingIndex(sampling_index));
        };

        let channel_config = reader.get_n::<u8>(4).map_err(truncated)?;
        if channel_config >= 8 {
            return Err(DemuxError::InvalidChannelConfig(channel_config));
        }

        let (extension_sampling_index, extension_object_type) =
            if original_object_type == AOT_SBR {
                (
                    Some(reader.get_n::<u8>(4).map_err(truncated)?),
                    Some(reader.get_n::<u8>(5).map_err(truncated)?),
                )
            } else {
                (None, None)
            };

        trace!(
            "AudioSpecificConfig: aot {original_object_type}, sampling index {sampling_index}, channel config {channel_config}"
        );

        let choice = policy.select(sampling_index, channel_config);
        let config = Self::build_config(choice, sampling_index, channel_config);

        debug!(
            "Decode policy {policy:?} selected object type {} ({} config bytes)",
            choice.object_type,
            config.len()
        );

        Ok(Self {
            audio_object_type: choice.object_type,
            original_object_type,
            sampling_index,
            sampling_rate,
            channel_config,
            extension_sampling_index,
            extension_object_type,
            config,
            config_raw: data.to_vec(),
        })
    }

    fn build_config(choice: ProfileChoice, sampling_index: u8, channel_config: u8) -> Vec<u8> {
        let mut config = vec![0u8; choice.config_len()];
        let ext = choice.extension_sampling_index;

        config[0] = choice.object_type << 3 | (sampling_index & 0x0F) >> 1;
        config[1] = (sampling_index & 0x0F) << 7 | (channel_config & 0x0F) << 3;
        if choice.object_type == AOT_SBR {
            config[1] |= (ext & 0x0F) >> 1;
            // Extension object type is always announced as LC.
            config[2] = (ext & 0x01) << 7 | AOT_AAC_LC << 2;
            config[3] = 0;
        }

        config
    }

    pub fn codec(&self) -> String {
        format!("mp4a.40.{}", self.audio_object_type)
    }

    pub fn original_codec(&self) -> String {
        format!("mp4a.40.{}", self.original_object_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asc_bytes(object_type: u8, sampling_index: u8, channel_config: u8) -> [u8; 2] {
        [
            object_type << 3 | sampling_index >> 1,
            (sampling_index & 1) << 7 | channel_config << 3,
        ]
    }

    #[test]
    fn lc_only_keeps_two_byte_config() -> anyhow::Result<()> {
        let asc = AudioSpecificConfig::parse(&asc_bytes(2, 4, 2), &RuntimeClass::LcOnly)?;

        assert_eq!(asc.config, vec![0x12, 0x10]);
        assert_eq!(asc.sampling_rate, 44100);
        assert_eq!(asc.channel_config, 2);
        assert_eq!(asc.codec(), "mp4a.40.2");
        assert_eq!(asc.config_raw, vec![0x12, 0x10]);
        Ok(())
    }

    #[test]
    fn prefer_he_announces_sbr() -> anyhow::Result<()> {
        let asc = AudioSpecificConfig::parse(&asc_bytes(2, 4, 2), &RuntimeClass::PreferHe)?;

        assert_eq!(asc.audio_object_type, 5);
        assert_eq!(asc.original_object_type, 2);
        assert_eq!(asc.config, vec![0x2A, 0x12, 0x08, 0x00]);
        assert_eq!(asc.codec(), "mp4a.40.5");
        assert_eq!(asc.original_codec(), "mp4a.40.2");

        // Mono falls back to LC.
        let mono = AudioSpecificConfig::parse(&asc_bytes(2, 4, 1), &RuntimeClass::PreferHe)?;
        assert_eq!(mono.audio_object_type, 2);
        assert_eq!(mono.config.len(), 2);

        // Low rates use the halved extension index even for mono.
        let low = AudioSpecificConfig::parse(&asc_bytes(2, 8, 1), &RuntimeClass::PreferHe)?;
        assert_eq!(low.audio_object_type, 5);
        assert_eq!(low.config, vec![0x2C, 0x0A, 0x88, 0x00]);
        Ok(())
    }

    #[test]
    fn low_rate_sbr_switches_at_24k() -> anyhow::Result<()> {
        let high = AudioSpecificConfig::parse(&asc_bytes(2, 5, 2), &RuntimeClass::LowRateSbr)?;
        assert_eq!(high.audio_object_type, 2);
        assert_eq!(high.config.len(), 2);

        let low = AudioSpecificConfig::parse(&asc_bytes(2, 6, 2), &RuntimeClass::LowRateSbr)?;
        assert_eq!(low.audio_object_type, 5);
        assert_eq!(low.config, vec![0x2B, 0x11, 0x88, 0x00]);
        Ok(())
    }

    #[test]
    fn sbr_source_reads_extension_fields() -> anyhow::Result<()> {
        // aot 5, index 6, channels 2, extension index 3, extension aot 2
        let asc =
            AudioSpecificConfig::parse(&[0x2B, 0x11, 0x88, 0x00], &RuntimeClass::LcOnly)?;

        assert_eq!(asc.original_object_type, 5);
        assert_eq!(asc.extension_sampling_index, Some(3));
        assert_eq!(asc.extension_object_type, Some(2));
        assert_eq!(asc.audio_object_type, 2);

        assert!(matches!(
            AudioSpecificConfig::parse(&[0x2B, 0x11], &RuntimeClass::LcOnly),
            Err(DemuxError::ConfigTruncated(_))
        ));
        Ok(())
    }

    #[test]
    fn every_sampling_index_maps_to_the_table() {
        for index in 0..16u8 {
            let result = AudioSpecificConfig::parse(&asc_bytes(2, index, 2), &RuntimeClass::LcOnly);
            match MPEG_SAMPLING_RATES.get(index as usize) {
                Some(&rate) => assert_eq!(result.map(|asc| asc.sampling_rate), Ok(rate)),
                None => assert_eq!(result, Err(DemuxError::InvalidSamplingIndex(index))),
            }
        }
    }

    #[test]
    fn rejects_short_input() {
        assert!(matches!(
            AudioSpecificConfig::parse(&[0x12], &RuntimeClass::PreferHe),
            Err(DemuxError::ConfigTruncated(_))
        ));
    }
}
