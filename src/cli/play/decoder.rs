use std::io::{self, Cursor};

use flvaac::process::dispatch::{DecodeBackend, PcmBuffer};
use flvaac::utils::errors::DecodeError;
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decodes each ADTS batch with symphonia's AAC reader and decoder.
///
/// Every batch is self-contained, so a fresh reader is opened per call.
#[derive(Debug, Default)]
pub struct SymphoniaBackend {
    batches: u64,
}

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn rejected(context: &str, e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Rejected(format!("{context}: {e}"))
}

impl DecodeBackend for SymphoniaBackend {
    fn decode(&mut self, adts: &[u8]) -> Result<PcmBuffer, DecodeError> {
        self.batches += 1;

        let mss = MediaSourceStream::new(Box::new(Cursor::new(adts.to_vec())), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("aac");

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| rejected("Failed to open ADTS stream", e))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Rejected("No AAC track in batch".to_string()))?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| rejected("Failed to create AAC decoder", e))?;

        let mut samples = Vec::new();
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(e) => return Err(rejected("Failed to read ADTS frame", e)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;

                    let needed = decoded.capacity();
                    if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
                        sample_buf = Some(SampleBuffer::new(needed as u64, spec));
                    }
                    if let Some(buf) = sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Batch {}: skipping corrupt AAC frame: {e}", self.batches);
                }
                Err(e) => return Err(rejected("AAC decode failed", e)),
            }
        }

        debug!(
            "Batch {}: {} bytes -> {} samples at {sample_rate} Hz, {channels} channels",
            self.batches,
            adts.len(),
            samples.len()
        );

        Ok(PcmBuffer::new(samples, sample_rate, channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_rejected() {
        let mut backend = SymphoniaBackend::new();
        let result = backend.decode(&[0x00, 0x11, 0x22, 0x33]);
        assert!(matches!(result, Err(DecodeError::Rejected(_))));
    }
}
