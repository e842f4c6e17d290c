use anyhow::Result;
use flvaac::process::assemble::ChunkAssembler;
use flvaac::process::demux::{DemuxListener, TagParser};
use indicatif::ProgressBar;

use crate::input::InputReader;

/// Totals of one pass over the input.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemuxPass {
    pub chunks: u64,
    pub bytes: u64,
}

/// Feeds the whole input through a [`ChunkAssembler`] into `parser`.
///
/// `after_chunk` runs once per parsed chunk group and stops the pass by
/// returning `Ok(false)`.
pub fn demux_input<L, F>(
    reader: &mut InputReader,
    parser: &mut TagParser<L>,
    chunk_size: usize,
    pb: Option<&ProgressBar>,
    mut after_chunk: F,
) -> Result<DemuxPass>
where
    L: DemuxListener,
    F: FnMut(&mut TagParser<L>) -> Result<bool>,
{
    let mut assembler = ChunkAssembler::default();
    let mut pass = DemuxPass::default();

    reader.process_chunks(chunk_size, |bytes| {
        pass.chunks += 1;
        pass.bytes += bytes.len() as u64;
        if let Some(pb) = pb {
            pb.inc(bytes.len() as u64);
        }

        let Some(chunk) = assembler.push_bytes(bytes) else {
            return Ok(true);
        };

        parser.begin_chunk_group();
        let consumed = parser.parse(&chunk.data, chunk.byte_start)?;
        assembler.commit(chunk, consumed);
        parser.end_chunk_group();

        after_chunk(parser)
    })?;

    if assembler.pending_len() > 0 {
        log::warn!(
            "Unexpected end of stream, {} bytes of a partial tag discarded",
            assembler.pending_len()
        );
    }

    Ok(pass)
}
