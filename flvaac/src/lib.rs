//! Incremental FLV demuxer and playback pipeline for audio-only AAC streams.
//!
//! ## Technical Overview
//!
//! An FLV stream arrives as arbitrarily sized byte chunks. Each chunk is
//! stitched to the unconsumed tail of the previous one, the complete tags in
//! it are parsed, and the raw AAC access units are rewrapped as ADTS frames so
//! that an ordinary AAC decoder can turn them into PCM.
//!
//! ### Pipeline
//!
//! ```text
//! bytes -> ChunkAssembler -> TagParser -> DecodeDispatcher -> PlaybackScheduler
//!                              |  AudioSpecificConfig, policy
//!                              |  AdtsFrameBuilder
//! ```
//!
//! ### Decode Profiles
//!
//! The AudioSpecificConfig handed to the decoder is rebuilt by a
//! [`RuntimeDecodePolicy`](structs::asc::RuntimeDecodePolicy). Some decoders
//! only accept LC, others switch profiles more smoothly when told the stream
//! is HE-AAC from the start.
//!
//! ## Quick Start
//!
//! 1. Implement [`process::dispatch::DecodeBackend`] for your AAC decoder
//! 2. Implement [`process::schedule::PlaybackSink`] for your audio output
//! 3. Build a [`process::session::Session`] and feed it a byte source
//!
//! ```rust,no_run
//! use std::collections::VecDeque;
//! use std::time::Duration;
//!
//! use flvaac::process::EXAMPLE_DATA;
//! use flvaac::process::dispatch::{DecodeBackend, PcmBuffer};
//! use flvaac::process::schedule::{Completion, PlaybackSink, UnitId};
//! use flvaac::process::session::SessionBuilder;
//! use flvaac::utils::errors::{DecodeError, PlaybackError};
//!
//! struct Silence;
//!
//! impl DecodeBackend for Silence {
//!     fn decode(&mut self, _adts: &[u8]) -> Result<PcmBuffer, DecodeError> {
//!         Ok(PcmBuffer::new(vec![0.0; 2048], 44100, 2))
//!     }
//! }
//!
//! struct Discard;
//!
//! impl PlaybackSink for Discard {
//!     fn start(
//!         &mut self,
//!         _unit: UnitId,
//!         _buffer: PcmBuffer,
//!         _offset: Duration,
//!         _duration: Duration,
//!         done: Completion,
//!     ) -> Result<(), PlaybackError> {
//!         done.notify();
//!         Ok(())
//!     }
//!     fn stop(&mut self, _unit: UnitId) {}
//!     fn set_gain(&mut self, _gain: f32) {}
//! }
//!
//! let mut session = SessionBuilder::new()
//!     .decoder(Box::new(Silence))
//!     .sink(Box::new(Discard))
//!     .build()?;
//!
//! let mut source = VecDeque::from([EXAMPLE_DATA.to_vec()]);
//! let stats = session.run(&mut source)?;
//! println!("{} samples demuxed", stats.demux.samples);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Streaming stages.
///
/// 1. **Chunk Assembly** ([`process::assemble`]): Stitches incoming chunks to
///    the unconsumed tail of the previous one.
///
/// 2. **Demuxing** ([`process::demux`]): Parses FLV tags and extracts AAC
///    access units and configuration.
///
/// 3. **Dispatch** ([`process::dispatch`]): Batches access units into ADTS
///    bitstreams for an external decoder.
///
/// 4. **Scheduling** ([`process::schedule`]): Plays decoded buffers back to
///    back through a sink.
///
/// 5. **Session** ([`process::session`]): Wires the stages to a byte source.
pub mod process;

/// FLV and AAC data structures.
///
/// - **Header** ([`structs::header`]): FLV file header probing
/// - **Tags** ([`structs::tag`]): Tag headers
/// - **Tracks** ([`structs::track`]): Samples and the audio track
/// - **Metadata** ([`structs::metadata`]): Audio metadata and media info
/// - **AudioSpecificConfig** ([`structs::asc`]): Config parsing and decode policy
/// - **ADTS** ([`structs::adts`]): ADTS framing
pub mod structs;

/// Supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
