/// Chunk stitching ahead of the tag parser.
///
/// Provides the [`ChunkAssembler`](assemble::ChunkAssembler), which keeps the
/// unconsumed tail of each chunk and re-prefixes later chunks with the cached
/// FLV signature.
pub mod assemble;

/// FLV tag parsing.
///
/// Provides the [`TagParser`](demux::TagParser), which reports metadata and
/// AAC samples to a [`DemuxListener`](demux::DemuxListener).
pub mod demux;

/// Decode batching.
///
/// Provides the [`DecodeDispatcher`](dispatch::DecodeDispatcher), which frames
/// samples as ADTS and runs a [`DecodeBackend`](dispatch::DecodeBackend) on a
/// worker thread.
pub mod dispatch;

/// Gapless sequential playback of decoded buffers.
pub mod schedule;

/// End-to-end streaming session.
pub mod session;

/// Audio-only FLV stream: one AAC LC 44.1 kHz stereo sequence header and two
/// raw frames at 23 ms and 46 ms.
pub const EXAMPLE_DATA: &[u8] = &[
    0x46, 0x4C, 0x56, 0x01, 0x04, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00,
    0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xAF, 0x00, 0x12, 0x10, 0x00, 0x00, 0x00, 0x0F,
    0x08, 0x00, 0x00, 0x06, 0x00, 0x00, 0x17, 0x00, 0x00, 0x00, 0x00, 0xAF, 0x01, 0xDE, 0xAD, 0xBE,
    0xEF, 0x00, 0x00, 0x00, 0x11, 0x08, 0x00, 0x00, 0x05, 0x00, 0x00, 0x2E, 0x00, 0x00, 0x00, 0x00,
    0xAF, 0x01, 0x01, 0x02, 0x03, 0x00, 0x00, 0x00, 0x10,
];

#[test]
fn example_data_is_well_formed() -> anyhow::Result<()> {
    use crate::structs::header::ProbeResult;
    use crate::structs::tag::TagHeader;

    let probe = ProbeResult::probe(EXAMPLE_DATA)?;
    assert!(probe.has_audio_track);
    assert!(!probe.has_video_track);

    let mut offset = probe.data_offset + 4;
    let mut timestamps = Vec::new();
    while let Some(header) = TagHeader::read(&EXAMPLE_DATA[offset..]) {
        let trailer_at = offset + header.total_len() - 4;
        assert_eq!(
            &EXAMPLE_DATA[trailer_at..trailer_at + 4],
            &header.expected_trailer().to_be_bytes()
        );
        timestamps.push(header.timestamp);
        offset += header.total_len();
    }

    assert_eq!(offset, EXAMPLE_DATA.len());
    assert_eq!(timestamps, vec![0, 23, 46]);
    Ok(())
}
