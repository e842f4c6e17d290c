use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use flvaacd_macros::{ToBytes, riff_chunk};

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const WAVE_ID: [u8; 4] = *b"WAVE";
pub const DATA_ID: [u8; 4] = *b"data";

const WAVE_FORMAT_PCM: u16 = 1;

/// A chunk with a four-character id and a little-endian body.
pub trait RiffChunk {
    fn chunk_id(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    fn write_all<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let data = self.chunk_data();
        writer.write_all(self.chunk_id())?;
        writer.write_all(&(data.len() as u32).to_le_bytes())?;
        writer.write_all(&data)?;
        if data.len() % 2 == 1 {
            writer.write_all(&[0])?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
#[riff_chunk(b"fmt ")]
pub struct FormatChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    pub fn pcm(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        let block_align = channels * (bits_per_sample / 8);
        Self {
            format_tag: WAVE_FORMAT_PCM,
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample,
        }
    }
}

/// RIFF/WAVE writer for 16-bit PCM.
///
/// The RIFF and data sizes are patched in by [`finish`](Self::finish), so the
/// target must be seekable.
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    format: Option<FormatChunk>,
    riff_size_position: u64,
    data_size_position: u64,
    data_written: u64,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format: None,
            riff_size_position: 0,
            data_size_position: 0,
            data_written: 0,
        }
    }

    /// Writes the RIFF, fmt and data headers. Must be called once before any
    /// samples.
    pub fn write_header(&mut self, sample_rate: u32, channels: u16) -> io::Result<()> {
        if self.format.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "WAV header already written",
            ));
        }

        let format = FormatChunk::pcm(sample_rate, channels, 16);

        self.writer.write_all(&RIFF_ID)?;
        self.riff_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?; // patched in finish()
        self.writer.write_all(&WAVE_ID)?;

        format.write_all(&mut self.writer)?;

        self.writer.write_all(&DATA_ID)?;
        self.data_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?; // patched in finish()

        self.format = Some(format);
        Ok(())
    }

    pub fn format(&self) -> Option<&FormatChunk> {
        self.format.as_ref()
    }

    /// Writes interleaved float samples scaled by `gain`, clipped to 16 bits.
    pub fn write_samples(&mut self, samples: &[f32], gain: f32) -> io::Result<()> {
        for &sample in samples {
            let scaled = (sample * gain).clamp(-1.0, 1.0);
            let value = (scaled * i16::MAX as f32).round() as i16;
            self.writer.write_all(&value.to_le_bytes())?;
        }
        self.data_written += samples.len() as u64 * 2;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        match self.format {
            Some(format) if format.block_align > 0 => self.data_written / format.block_align as u64,
            _ => 0,
        }
    }

    /// Patches the chunk sizes. The writer stays positioned at the end.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.format.is_none() {
            return Ok(());
        }

        if self.data_written % 2 == 1 {
            self.writer.write_all(&[0])?;
        }
        self.writer.flush()?;
        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer
            .write_all(&(self.data_written.min(u32::MAX as u64) as u32).to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(self.riff_size_position))?;
        let riff_size = end.saturating_sub(8).min(u32::MAX as u64) as u32;
        self.writer.write_all(&riff_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout() -> io::Result<()> {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()));
        writer.write_header(44100, 2)?;
        writer.write_samples(&[0.0, 1.0, -1.0, 0.5], 1.0)?;
        writer.finish()?;
        assert_eq!(writer.frames_written(), 2);

        let bytes = writer.into_inner()?.into_inner();
        assert_eq!(bytes.len(), 44 + 8);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[4..8], &(44u32 + 8 - 8).to_le_bytes());
        assert_eq!(&bytes[8..16], b"WAVEfmt ");
        assert_eq!(&bytes[16..20], &16u32.to_le_bytes());
        assert_eq!(&bytes[20..22], &1u16.to_le_bytes());
        assert_eq!(&bytes[22..24], &2u16.to_le_bytes());
        assert_eq!(&bytes[24..28], &44100u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &(44100u32 * 4).to_le_bytes());
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(&bytes[40..44], &8u32.to_le_bytes());

        let first = i16::from_le_bytes([bytes[46], bytes[47]]);
        let last = i16::from_le_bytes([bytes[50], bytes[51]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(last, 16384);
        Ok(())
    }

    #[test]
    fn gain_scales_and_clips() -> io::Result<()> {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()));
        writer.write_header(8000, 1)?;
        writer.write_samples(&[0.75, 0.75], 2.0)?;
        writer.write_samples(&[0.5], -1.0)?;
        writer.finish()?;

        let bytes = writer.into_inner()?.into_inner();
        let samples: Vec<i16> = bytes[44..50]
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![i16::MAX, i16::MAX, -16384]);
        Ok(())
    }

    #[test]
    fn header_is_written_once() -> io::Result<()> {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()));
        writer.write_header(8000, 1)?;
        assert!(writer.write_header(8000, 1).is_err());
        Ok(())
    }
}
