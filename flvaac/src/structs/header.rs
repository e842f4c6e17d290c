//! FLV file header probing.

use log::trace;

use crate::utils::errors::DemuxError;

/// Length of the FLV file signature every chunk must start with.
pub const FLV_SIGNATURE_LEN: usize = 9;

/// `PreviousTagSize0` that follows the header.
pub const PREV_TAG_SIZE_LEN: usize = 4;

/// Largest declared header size accepted. Tag parsing waits until the whole
/// header has arrived, so this bounds what is buffered before the first tag.
pub const MAX_HEADER_SIZE: u32 = 64 * 1024;

const FLV_MAGIC: [u8; 4] = [b'F', b'L', b'V', 0x01];

/// Result of validating the 9-byte FLV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub matched: bool,
    pub consumed: usize,
    pub data_offset: usize,
    pub has_audio_track: bool,
    pub has_video_track: bool,
}

impl ProbeResult {
    /// Validates the signature and flags at the start of `bytes`.
    ///
    /// Fails with a format error when the magic or version does not match,
    /// when fewer than 9 bytes are available, or when the declared header size
    /// is below 9 or above [`MAX_HEADER_SIZE`].
    ///
    /// ```rust
    /// use flvaac::structs::header::ProbeResult;
    ///
    /// let probe = ProbeResult::probe(b"FLV\x01\x04\x00\x00\x00\x09")?;
    /// assert!(probe.matched && probe.has_audio_track && !probe.has_video_track);
    /// assert_eq!(probe.data_offset, 9);
    /// # Ok::<(), flvaac::utils::errors::DemuxError>(())
    /// ```
    pub fn probe(bytes: &[u8]) -> Result<Self, DemuxError> {
        if bytes.len() < FLV_SIGNATURE_LEN {
            return Err(DemuxError::HeaderTruncated(bytes.len()));
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != FLV_MAGIC {
            return Err(DemuxError::SignatureMismatch(magic));
        }

        let flags = bytes[4];
        let has_audio_track = (flags & 0x04) >> 2 != 0;
        let has_video_track = flags & 0x01 != 0;

        let header_size = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        if header_size < FLV_SIGNATURE_LEN as u32 {
            return Err(DemuxError::HeaderTooSmall(header_size));
        }
        if header_size > MAX_HEADER_SIZE {
            return Err(DemuxError::HeaderTooLarge(header_size));
        }

        trace!(
            "FLV header: size {header_size}, audio {has_audio_track}, video {has_video_track}"
        );

        Ok(Self {
            matched: true,
            consumed: header_size as usize,
            data_offset: header_size as usize,
            has_audio_track,
            has_video_track,
        })
    }
}

#[test]
fn probe_audio_only_header() -> Result<(), DemuxError> {
    let header = [0x46, 0x4C, 0x56, 0x01, 0x04, 0x00, 0x00, 0x00, 0x09];
    let probe = ProbeResult::probe(&header)?;

    assert_eq!(
        probe,
        ProbeResult {
            matched: true,
            consumed: 9,
            data_offset: 9,
            has_audio_track: true,
            has_video_track: false,
        }
    );

    // Probing is a pure function of the header bytes.
    assert_eq!(ProbeResult::probe(&header)?, probe);
    Ok(())
}

#[test]
fn probe_rejects_malformed_headers() {
    assert_eq!(
        ProbeResult::probe(b"FLV\x02\x05\x00\x00\x00\x09"),
        Err(DemuxError::SignatureMismatch([b'F', b'L', b'V', 0x02]))
    );
    assert_eq!(
        ProbeResult::probe(b"FLV\x01\x05\x00\x00\x00\x08"),
        Err(DemuxError::HeaderTooSmall(8))
    );
    assert_eq!(
        ProbeResult::probe(b"FLV\x01"),
        Err(DemuxError::HeaderTruncated(4))
    );

    assert_eq!(
        ProbeResult::probe(b"FLV\x01\x04\xFF\xFF\xFF\xFF"),
        Err(DemuxError::HeaderTooLarge(u32::MAX))
    );
    assert!(ProbeResult::probe(b"FLV\x01\x04\x00\x01\x00\x00").is_ok());

    let both = ProbeResult::probe(b"FLV\x01\x05\x00\x00\x00\x0D").unwrap();
    assert!(both.has_audio_track && both.has_video_track);
    assert_eq!(both.data_offset, 13);
}
