//! Data structures representing FLV and AAC format components.
//!
//! Contains the container header and tag layouts, the audio track and its
//! samples, stream metadata, the AudioSpecificConfig with its decode policy,
//! and ADTS framing.

pub mod adts;
pub mod asc;
pub mod header;
pub mod metadata;
pub mod tag;
pub mod track;
