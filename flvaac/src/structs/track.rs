//! Audio track and sample containers.

use std::sync::Arc;

/// Track id assigned to audio, matching the FLV convention of video=1, audio=2.
pub const AUDIO_TRACK_ID: u32 = 2;

/// One container-level AAC access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub unit: Arc<[u8]>,
    pub length: usize,
    /// Decode timestamp in milliseconds.
    pub dts: i64,
    /// Presentation timestamp in milliseconds. Equal to `dts` for audio.
    pub pts: i64,
}

impl Sample {
    pub fn new(payload: &[u8], dts: i64) -> Self {
        Self {
            unit: Arc::from(payload),
            length: payload.len(),
            dts,
            pts: dts,
        }
    }
}

impl AsRef<[u8]> for Sample {
    fn as_ref(&self) -> &[u8] {
        &self.unit
    }
}

/// Samples accumulated during the current chunk group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub id: u32,
    pub sequence_number: u64,
    pub samples: Vec<Sample>,
    /// Sum of the payload lengths in `samples`.
    pub length: usize,
}

impl Default for AudioTrack {
    fn default() -> Self {
        Self {
            id: AUDIO_TRACK_ID,
            sequence_number: 0,
            samples: Vec::new(),
            length: 0,
        }
    }
}

impl AudioTrack {
    pub fn push(&mut self, sample: Sample) {
        self.length += sample.length;
        self.samples.push(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.length == 0
    }

    /// Drops the accumulated samples. The id and sequence number are kept.
    pub fn clear_samples(&mut self) {
        self.samples.clear();
        self.length = 0;
    }
}

#[test]
fn track_accumulates_length() {
    let mut track = AudioTrack::default();
    assert!(track.is_empty());

    track.push(Sample::new(&[1, 2, 3], 10));
    track.push(Sample::new(&[4, 5], 33));
    assert_eq!(track.length, 5);
    assert_eq!(track.samples[1].pts, 33);
    assert_eq!(track.samples[1].as_ref(), &[4, 5]);

    track.sequence_number = 3;
    track.clear_samples();
    assert!(track.is_empty());
    assert_eq!(track.sequence_number, 3);
    assert_eq!(track.id, AUDIO_TRACK_ID);
}
