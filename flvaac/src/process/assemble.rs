use log::{debug, trace};

use crate::structs::header::{FLV_SIGNATURE_LEN, PREV_TAG_SIZE_LEN};

/// Chunk ready for [`TagParser::parse`](crate::process::demux::TagParser::parse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledChunk {
    pub data: Vec<u8>,
    /// Offset of the first tag byte; 0 when `data` starts with the FLV header.
    pub byte_start: usize,
}

impl AsRef<[u8]> for AssembledChunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Stitches arbitrary chunk boundaries back into parseable tag runs.
///
/// The parser consumes whole tags only. Whatever it leaves behind is kept and
/// placed in front of the next chunk, and every chunk after the first is
/// prefixed with the cached 9-byte FLV signature so tag parsing can resume at
/// a fixed offset.
///
/// # Example
///
/// ```rust,no_run
/// use flvaac::process::EXAMPLE_DATA;
/// use flvaac::process::assemble::ChunkAssembler;
///
/// let mut assembler = ChunkAssembler::default();
///
/// let (head, tail) = EXAMPLE_DATA.split_at(40);
/// let chunk = assembler.push_bytes(head).unwrap();
/// assert_eq!(chunk.byte_start, 0);
///
/// // Pretend the parser consumed the header and the first tag.
/// assembler.commit(chunk, 32);
///
/// let chunk = assembler.push_bytes(tail).unwrap();
/// assert_eq!(chunk.byte_start, 9);
/// assert_eq!(&chunk.data[..3], b"FLV");
/// assert_eq!(chunk.data.len(), 9 + EXAMPLE_DATA.len() - 32);
/// ```
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    signature: Option<[u8; FLV_SIGNATURE_LEN]>,
    pending: Vec<u8>,
    started: bool,
    chunks_pushed: usize,
    chunks_emitted: usize,
}

impl ChunkAssembler {
    /// Appends `data` to the unconsumed tail and returns the chunk to parse.
    ///
    /// Returns `None` while the stream is too short to hold the FLV header
    /// and `PrevTagSize0`.
    pub fn push_bytes(&mut self, data: &[u8]) -> Option<AssembledChunk> {
        self.chunks_pushed += 1;

        if !self.started {
            self.pending.extend_from_slice(data);
            if self.pending.len() <= FLV_SIGNATURE_LEN + PREV_TAG_SIZE_LEN {
                trace!("Waiting for FLV header, {} bytes buffered", self.pending.len());
                return None;
            }

            if self.signature.is_none() {
                let mut signature = [0u8; FLV_SIGNATURE_LEN];
                signature.copy_from_slice(&self.pending[..FLV_SIGNATURE_LEN]);
                self.signature = Some(signature);
            }

            self.chunks_emitted += 1;
            return Some(AssembledChunk {
                data: std::mem::take(&mut self.pending),
                byte_start: 0,
            });
        }

        let signature = self.signature.unwrap_or_default();
        let mut chunk = Vec::with_capacity(FLV_SIGNATURE_LEN + self.pending.len() + data.len());
        chunk.extend_from_slice(&signature);
        chunk.append(&mut self.pending);
        chunk.extend_from_slice(data);

        self.chunks_emitted += 1;
        Some(AssembledChunk {
            data: chunk,
            byte_start: FLV_SIGNATURE_LEN,
        })
    }

    /// Records how far the parser got into `chunk`.
    ///
    /// The bytes past `consumed` are carried into the next
    /// [`push_bytes`](Self::push_bytes).
    pub fn commit(&mut self, chunk: AssembledChunk, consumed: usize) {
        let AssembledChunk {
            mut data,
            byte_start,
        } = chunk;

        if !self.started {
            if consumed == 0 {
                // Header not parsed yet; keep everything and retry with more.
                self.pending = data;
                return;
            }
            self.started = true;
        }

        let consumed = consumed.max(byte_start).min(data.len());
        if consumed != data.len() {
            debug!(
                "Deferring {} bytes of a partial tag to the next chunk",
                data.len() - consumed
            );
        }
        self.pending = data.split_off(consumed);
    }

    /// Bytes waiting for the next chunk.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn signature(&self) -> Option<&[u8; FLV_SIGNATURE_LEN]> {
        self.signature.as_ref()
    }

    pub fn chunks_pushed(&self) -> usize {
        self.chunks_pushed
    }

    pub fn chunks_emitted(&self) -> usize {
        self.chunks_emitted
    }

    /// Forgets the tail and the signature. The next chunk must start with a
    /// new FLV header.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::demux::{DemuxListener, TagParser};
    use crate::structs::metadata::{AudioMetadata, MediaInfo};
    use crate::structs::track::AudioTrack;
    use crate::utils::errors::{DemuxError, ErrorKind};
    use crate::utils::synth::three_frame_stream;

    #[derive(Default)]
    struct Units(Vec<(i64, Vec<u8>)>);

    impl DemuxListener for Units {
        fn on_error(&mut self, _kind: ErrorKind, _error: &DemuxError) {}
        fn on_media_info(&mut self, _info: &MediaInfo) {}
        fn on_track_metadata(&mut self, _meta: &AudioMetadata) {}
        fn on_data_available(&mut self, track: &AudioTrack) {
            self.0
                .extend(track.samples.iter().map(|s| (s.dts, s.unit.to_vec())));
        }
    }

    fn demux_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<(i64, Vec<u8>)> {
        let mut assembler = ChunkAssembler::default();
        let mut parser = TagParser::new(Units::default());

        for data in chunks {
            let Some(chunk) = assembler.push_bytes(data) else {
                continue;
            };
            parser.begin_chunk_group();
            let consumed = parser.parse(&chunk.data, chunk.byte_start).unwrap();
            assembler.commit(chunk, consumed);
            parser.end_chunk_group();
        }

        parser.into_listener().0
    }

    #[test]
    fn any_two_way_split_yields_the_same_samples() {
        let (stream, frames) = three_frame_stream();
        let expected: Vec<(i64, Vec<u8>)> = frames
            .into_iter()
            .map(|(ts, payload)| (ts as i64, payload))
            .collect();

        assert_eq!(demux_chunks([stream.as_slice()]), expected);

        for cut in 0..=stream.len() {
            let (head, tail) = stream.split_at(cut);
            assert_eq!(demux_chunks([head, tail]), expected, "split at {cut}");
        }
    }

    #[test]
    fn byte_at_a_time_feed() {
        let (stream, frames) = three_frame_stream();
        let units = demux_chunks(stream.chunks(1));
        assert_eq!(units.len(), frames.len());
    }

    #[test]
    fn later_chunks_carry_the_signature() {
        let (stream, _) = three_frame_stream();
        let mut assembler = ChunkAssembler::default();

        assert!(assembler.push_bytes(&stream[..13]).is_none());
        assert!(assembler.signature().is_none());

        let first = assembler.push_bytes(&stream[13..30]).unwrap();
        assert_eq!(first.byte_start, 0);
        assert_eq!(first.data, stream[..30]);
        assembler.commit(first, 20);
        assert_eq!(assembler.pending_len(), 10);

        let second = assembler.push_bytes(&stream[30..40]).unwrap();
        assert_eq!(second.byte_start, FLV_SIGNATURE_LEN);
        assert_eq!(&second.data[..9], &stream[..9]);
        assert_eq!(&second.data[9..], &stream[20..40]);

        assert_eq!(assembler.chunks_pushed(), 3);
        assert_eq!(assembler.chunks_emitted(), 2);
    }

    #[test]
    fn unparsed_first_chunk_is_retried() {
        let (stream, _) = three_frame_stream();
        let mut assembler = ChunkAssembler::default();

        let first = assembler.push_bytes(&stream[..20]).unwrap();
        assembler.commit(first, 0);
        assert_eq!(assembler.pending_len(), 20);

        let again = assembler.push_bytes(&stream[20..25]).unwrap();
        assert_eq!(again.byte_start, 0);
        assert_eq!(again.data, stream[..25]);
    }
}
