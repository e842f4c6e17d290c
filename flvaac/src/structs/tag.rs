//! FLV tag headers.

use std::fmt::{Display, Formatter};

use crate::utils::bitstream_io::BsIoSliceReader;

/// Tag header length: type, data size, timestamp, extended timestamp, stream id.
pub const TAG_HEADER_LEN: usize = 11;

/// Trailing `PreviousTagSize` after every tag body.
pub const TAG_TRAILER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Audio,
    Video,
    Script,
    Other(u8),
}

impl From<u8> for TagType {
    fn from(value: u8) -> Self {
        match value {
            8 => TagType::Audio,
            9 => TagType::Video,
            18 => TagType::Script,
            other => TagType::Other(other),
        }
    }
}

impl TagType {
    pub fn code(&self) -> u8 {
        match self {
            TagType::Audio => 8,
            TagType::Video => 9,
            TagType::Script => 18,
            TagType::Other(n) => *n,
        }
    }
}

impl Display for TagType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TagType::Audio => write!(f, "audio"),
            TagType::Video => write!(f, "video"),
            TagType::Script => write!(f, "script"),
            TagType::Other(n) => write!(f, "unknown ({n})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub tag_type: TagType,
    pub data_size: u32,
    /// Milliseconds, lower 24 bits plus the extended byte as bits 24..32.
    pub timestamp: u32,
    pub stream_id: u32,
}

impl TagHeader {
    /// Reads the 11-byte tag header at the start of `bytes`.
    ///
    /// Returns `None` when fewer than 11 bytes are available.
    pub fn read(bytes: &[u8]) -> Option<Self> {
        let reader = &mut BsIoSliceReader::from_slice(bytes);

        let tag_type = reader.get_n::<u8>(8).ok()?;
        let data_size = reader.get_n::<u32>(24).ok()?;

        let [ts2, ts1, ts0, ts3] = reader.get_bytes::<4>().ok()?;
        let timestamp =
            ts0 as u32 | (ts1 as u32) << 8 | (ts2 as u32) << 16 | (ts3 as u32) << 24;

        let stream_id = reader.get_n::<u32>(24).ok()?;

        Some(Self {
            tag_type: tag_type.into(),
            data_size,
            timestamp,
            stream_id,
        })
    }

    /// Header, body and trailing size field.
    pub fn total_len(&self) -> usize {
        TAG_HEADER_LEN + self.data_size as usize + TAG_TRAILER_LEN
    }

    /// Value the trailing `PreviousTagSize` must hold.
    pub fn expected_trailer(&self) -> u32 {
        TAG_HEADER_LEN as u32 + self.data_size
    }
}

#[test]
fn extended_timestamp_is_the_high_byte() {
    let bytes = [
        0x08, 0x00, 0x01, 0x02, // audio, 258 bytes
        0x12, 0x34, 0x56, 0x7F, // ts 0x123456, extended 0x7F
        0x00, 0x00, 0x00,
    ];
    let header = TagHeader::read(&bytes).unwrap();

    assert_eq!(header.tag_type, TagType::Audio);
    assert_eq!(header.data_size, 258);
    assert_eq!(header.timestamp, 0x7F12_3456);
    assert_eq!(header.stream_id, 0);
    assert_eq!(header.total_len(), 11 + 258 + 4);
    assert_eq!(header.expected_trailer(), 269);

    assert!(TagHeader::read(&bytes[..10]).is_none());
}

#[test]
fn classifies_tag_types() {
    assert_eq!(TagType::from(9), TagType::Video);
    assert_eq!(TagType::from(18), TagType::Script);
    assert_eq!(TagType::from(7), TagType::Other(7));
    assert_eq!(TagType::Other(7).to_string(), "unknown (7)");
}
