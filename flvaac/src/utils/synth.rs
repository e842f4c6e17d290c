//! Synthetic FLV streams for tests.

use crate::structs::tag::{TAG_HEADER_LEN, TagType};

/// Sound spec byte for AAC, 44.1 kHz, 16-bit, stereo.
pub const AAC_SOUND_SPEC: u8 = 0xAF;

pub struct FlvStreamBuilder {
    bytes: Vec<u8>,
}

impl FlvStreamBuilder {
    pub fn new(flags: u8) -> Self {
        let mut bytes = vec![b'F', b'L', b'V', 0x01, flags, 0, 0, 0, 9];
        bytes.extend_from_slice(&0u32.to_be_bytes());
        Self { bytes }
    }

    pub fn audio_only() -> Self {
        Self::new(0x04)
    }

    pub fn tag(self, tag_type: u8, timestamp: u32, body: &[u8]) -> Self {
        let trailer = TAG_HEADER_LEN as u32 + body.len() as u32;
        self.raw_tag(tag_type, timestamp, 0, body, trailer)
    }

    pub fn raw_tag(
        mut self,
        tag_type: u8,
        timestamp: u32,
        stream_id: u32,
        body: &[u8],
        trailer: u32,
    ) -> Self {
        let size = (body.len() as u32).to_be_bytes();
        let ts = timestamp.to_be_bytes();
        let sid = stream_id.to_be_bytes();

        self.bytes.push(tag_type);
        self.bytes.extend_from_slice(&size[1..]);
        self.bytes.extend_from_slice(&[ts[1], ts[2], ts[3], ts[0]]);
        self.bytes.extend_from_slice(&sid[1..]);
        self.bytes.extend_from_slice(body);
        self.bytes.extend_from_slice(&trailer.to_be_bytes());
        self
    }

    pub fn sequence_header(self, timestamp: u32, asc: &[u8]) -> Self {
        let mut body = vec![AAC_SOUND_SPEC, 0x00];
        body.extend_from_slice(asc);
        self.tag(8, timestamp, &body)
    }

    pub fn raw_frame(self, timestamp: u32, payload: &[u8]) -> Self {
        let mut body = vec![AAC_SOUND_SPEC, 0x01];
        body.extend_from_slice(payload);
        self.tag(8, timestamp, &body)
    }

    pub fn video(self, timestamp: u32, body: &[u8]) -> Self {
        self.tag(9, timestamp, body)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Three-frame LC stereo stream used across the demux tests.
pub fn three_frame_stream() -> (Vec<u8>, Vec<(u32, Vec<u8>)>) {
    let frames = vec![
        (0u32, vec![0x21, 0x10, 0x05, 0x00]),
        (23, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01]),
        (46, (0..40).collect::<Vec<u8>>()),
    ];

    let mut builder = FlvStreamBuilder::audio_only()
        .tag(18, 0, &[0x02, 0x00, 0x0A])
        .sequence_header(0, &[0x12, 0x10]);
    for (ts, payload) in &frames {
        builder = builder.raw_frame(*ts, payload);
    }

    (builder.build(), frames)
}

#[test]
fn builder_writes_tag_layout() {
    let stream = FlvStreamBuilder::audio_only()
        .tag(TagType::Audio.code(), 0x0102_0304, &[0xAF, 0x01, 0x55])
        .build();

    assert_eq!(&stream[..13], b"FLV\x01\x04\x00\x00\x00\x09\x00\x00\x00\x00");
    assert_eq!(&stream[13..17], &[0x08, 0x00, 0x00, 0x03]);
    assert_eq!(&stream[17..21], &[0x02, 0x03, 0x04, 0x01]);
    assert_eq!(&stream[stream.len() - 4..], &14u32.to_be_bytes());
}
