use std::io::{Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use flvaac::process::dispatch::PcmBuffer;
use flvaac::process::schedule::{Completion, PlaybackSink, UnitId};
use flvaac::utils::errors::PlaybackError;
use log::{debug, trace};

use crate::wav::WavWriter;

/// Frame index `at` falls on, rounded up.
fn frame_at(at: Duration, sample_rate: u32) -> usize {
    (at.as_nanos() * sample_rate as u128).div_ceil(1_000_000_000) as usize
}

/// Plays units by appending them to a WAV file.
///
/// A unit is written in full when it starts. With `realtime` its completion
/// is held back for the unit's duration, otherwise it completes at once.
pub struct WavSink<W: Write + Seek + Send + 'static> {
    writer: Arc<Mutex<WavWriter<W>>>,
    gain: f32,
    realtime: bool,
    active: Option<(UnitId, Arc<AtomicBool>)>,
}

/// Keeps access to the WAV file after the sink has been handed to a session.
pub struct WavOutput<W: Write + Seek + Send + 'static> {
    writer: Arc<Mutex<WavWriter<W>>>,
}

impl<W: Write + Seek + Send + 'static> WavSink<W> {
    pub fn new(writer: W, realtime: bool) -> (Self, WavOutput<W>) {
        let writer = Arc::new(Mutex::new(WavWriter::new(writer)));
        let sink = Self {
            writer: writer.clone(),
            gain: 1.0,
            realtime,
            active: None,
        };
        (sink, WavOutput { writer })
    }

    fn write_unit(
        &self,
        unit: UnitId,
        buffer: &PcmBuffer,
        offset: Duration,
        duration: Duration,
    ) -> Result<(), PlaybackError> {
        let failed = |reason: String| PlaybackError::StartFailed { unit, reason };

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| failed("WAV writer lock poisoned".to_string()))?;

        match writer.format() {
            Some(format) => {
                if format.channels != buffer.channels || format.sample_rate != buffer.sample_rate {
                    return Err(failed(format!(
                        "{} Hz, {} channels does not match the file's {} Hz, {} channels",
                        buffer.sample_rate, buffer.channels, format.sample_rate, format.channels
                    )));
                }
            }
            None => {
                debug!(
                    "Writing WAV header: {} Hz, {} channels",
                    buffer.sample_rate, buffer.channels
                );
                writer
                    .write_header(buffer.sample_rate, buffer.channels)
                    .map_err(|e| failed(e.to_string()))?;
            }
        }

        let frames = buffer.frames();
        let first = frame_at(offset, buffer.sample_rate).min(frames);
        let last = (first + frame_at(duration, buffer.sample_rate)).min(frames);
        let channels = buffer.channels as usize;

        writer
            .write_samples(&buffer.samples[first * channels..last * channels], self.gain)
            .map_err(|e| failed(e.to_string()))
    }
}

impl<W: Write + Seek + Send + 'static> PlaybackSink for WavSink<W> {
    fn start(
        &mut self,
        unit: UnitId,
        buffer: PcmBuffer,
        offset: Duration,
        duration: Duration,
        done: Completion,
    ) -> Result<(), PlaybackError> {
        self.write_unit(unit, &buffer, offset, duration)?;

        if !self.realtime {
            done.notify();
            return Ok(());
        }

        let stopped = Arc::new(AtomicBool::new(false));
        self.active = Some((unit, stopped.clone()));
        thread::spawn(move || {
            thread::sleep(duration);
            if !stopped.load(Ordering::Acquire) {
                done.notify();
            }
        });
        Ok(())
    }

    fn stop(&mut self, unit: UnitId) {
        if !self.active.as_ref().is_some_and(|(active, _)| *active == unit) {
            return;
        }
        if let Some((_, stopped)) = self.active.take() {
            trace!("Stopping unit {unit}");
            stopped.store(true, Ordering::Release);
        }
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl<W: Write + Seek + Send + 'static> WavOutput<W> {
    /// Patches the WAV sizes. Returns the number of frames written.
    pub fn finish(&self) -> Result<u64> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("WAV writer lock poisoned"))?;
        writer.finish()?;
        Ok(writer.frames_written())
    }
}

/// Completes every unit immediately without producing output.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl PlaybackSink for DiscardSink {
    fn start(
        &mut self,
        unit: UnitId,
        buffer: PcmBuffer,
        _offset: Duration,
        _duration: Duration,
        done: Completion,
    ) -> Result<(), PlaybackError> {
        trace!("Discarding unit {unit}: {} frames", buffer.frames());
        done.notify();
        Ok(())
    }

    fn stop(&mut self, _unit: UnitId) {}

    fn set_gain(&mut self, _gain: f32) {}
}
