use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use flvaac::process::demux::{DemuxListener, TagParser};
use flvaac::structs::metadata::{AudioMetadata, MediaInfo};
use flvaac::structs::track::AudioTrack;
use flvaac::utils::errors::{DemuxError, ErrorKind};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;
use serde::Serialize;

use super::command::{Cli, InfoArgs, ReportFormat};
use super::demux::demux_input;
use crate::input::{DEFAULT_CHUNK_SIZE, InputReader};
use crate::timestamp::{dts_str, time_str};

#[derive(Debug, Default)]
struct InfoCollector {
    media_info: Option<MediaInfo>,
    metadata: Option<AudioMetadata>,
    config_changes: u64,
    frames: u64,
    payload_bytes: u64,
    first_dts: Option<i64>,
    last_dts: Option<i64>,
    errors: BTreeMap<String, u64>,
}

impl DemuxListener for InfoCollector {
    fn on_error(&mut self, kind: ErrorKind, error: &DemuxError) {
        log::debug!("Tag dropped ({kind}): {error}");
        *self.errors.entry(kind.to_string()).or_default() += 1;
    }

    fn on_media_info(&mut self, info: &MediaInfo) {
        self.media_info = Some(info.clone());
    }

    fn on_track_metadata(&mut self, meta: &AudioMetadata) {
        if self.metadata.is_some() {
            self.config_changes += 1;
        }
        self.metadata = Some(meta.clone());
    }

    fn on_data_available(&mut self, track: &AudioTrack) {
        for sample in &track.samples {
            self.frames += 1;
            self.payload_bytes += sample.length as u64;
            self.first_dts.get_or_insert(sample.dts);
            self.last_dts = Some(sample.dts);
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StreamReport {
    pub has_audio: bool,
    pub has_video: bool,
    pub mime_type: Option<String>,
    pub audio: Option<AudioReport>,
    pub frames: u64,
    pub payload_bytes: u64,
    pub first_dts_ms: Option<i64>,
    pub last_dts_ms: Option<i64>,
    pub duration_ms: u64,
    pub bitrate_kbps: Option<f64>,
    pub tags: u64,
    pub skipped_tags: u64,
    pub dropped_tags: BTreeMap<String, u64>,
    pub input_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct AudioReport {
    pub codec: Option<String>,
    pub stream_codec: Option<String>,
    pub sample_rate: u32,
    pub channels: u8,
    pub config: String,
    pub stream_config: String,
    pub config_changes: u64,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

impl StreamReport {
    fn new(collector: InfoCollector, parser_info: &MediaInfo, input_bytes: u64) -> Self {
        let info = collector.media_info.as_ref().unwrap_or(parser_info);

        let frame_ms = collector
            .metadata
            .as_ref()
            .map_or(0.0, |meta| meta.ref_sample_duration);
        let duration_ms = match (collector.first_dts, collector.last_dts) {
            (Some(first), Some(last)) => (last - first).max(0) as u64 + frame_ms.round() as u64,
            _ => 0,
        };
        let bitrate_kbps = (duration_ms > 0)
            .then(|| collector.payload_bytes as f64 * 8.0 / duration_ms as f64);

        let audio = collector.metadata.as_ref().map(|meta| AudioReport {
            codec: meta.codec.clone(),
            stream_codec: meta.original_codec.clone(),
            sample_rate: meta.sample_rate,
            channels: meta.channel_count,
            config: hex(&meta.config),
            stream_config: hex(&meta.config_raw),
            config_changes: collector.config_changes,
        });

        Self {
            has_audio: info.has_audio,
            has_video: info.has_video,
            mime_type: info.mime_type.clone(),
            audio,
            frames: collector.frames,
            payload_bytes: collector.payload_bytes,
            first_dts_ms: collector.first_dts,
            last_dts_ms: collector.last_dts,
            duration_ms,
            bitrate_kbps,
            tags: 0,
            skipped_tags: 0,
            dropped_tags: collector.errors,
            input_bytes,
        }
    }

    fn print_text(&self) {
        println!("Stream:");
        println!("  Audio flag:      {}", self.has_audio);
        println!("  Video flag:      {}", self.has_video);
        if let Some(mime_type) = &self.mime_type {
            println!("  MIME type:       {mime_type}");
        }
        println!("  Tags:            {} ({} skipped)", self.tags, self.skipped_tags);
        println!("  Input bytes:     {}", self.input_bytes);

        match &self.audio {
            Some(audio) => {
                println!("Audio:");
                println!(
                    "  Codec:           {} (stream: {})",
                    audio.codec.as_deref().unwrap_or("unknown"),
                    audio.stream_codec.as_deref().unwrap_or("unknown")
                );
                println!("  Sample rate:     {} Hz", audio.sample_rate);
                println!("  Channels:        {}", audio.channels);
                println!("  Decoder config:  {}", audio.config);
                println!("  Stream config:   {}", audio.stream_config);
                if audio.config_changes > 0 {
                    println!("  Config changes:  {}", audio.config_changes);
                }
            }
            None => println!("No AAC sequence header found."),
        }

        println!("Frames:");
        println!("  Count:           {}", self.frames);
        println!("  Payload bytes:   {}", self.payload_bytes);
        if let (Some(first), Some(last)) = (self.first_dts_ms, self.last_dts_ms) {
            println!("  First DTS:       {}", dts_str(first));
            println!("  Last DTS:        {}", dts_str(last));
        }
        println!(
            "  Duration:        {}",
            time_str(Duration::from_millis(self.duration_ms))
        );
        if let Some(kbps) = self.bitrate_kbps {
            println!("  Bitrate:         {kbps:.1} kbps");
        }

        if !self.dropped_tags.is_empty() {
            println!("Dropped tags:");
            for (kind, count) in &self.dropped_tags {
                println!("  {kind}: {count}");
            }
        }
    }
}

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing FLV stream: {}", args.input.display());

    let mut reader = InputReader::new(&args.input)?;
    let mut parser = TagParser::new(InfoCollector::default());
    parser.set_fail_level(if cli.strict { Level::Warn } else { Level::Error });

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message("Analyzing tags...");
            Some(pb)
        }
        None => None,
    };

    let pass = demux_input(
        &mut reader,
        &mut parser,
        DEFAULT_CHUNK_SIZE,
        pb.as_ref(),
        |_| Ok(true),
    )?;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    log::debug!("Read {} bytes in {} chunks", pass.bytes, pass.chunks);

    let stats = parser.stats();
    let parser_info = parser.media_info().clone();
    let mut report = StreamReport::new(parser.into_listener(), &parser_info, pass.bytes);
    report.tags = stats.tags;
    report.skipped_tags = stats.skipped_tags;

    match args.format {
        ReportFormat::Text => report.print_text(),
        ReportFormat::Yaml => print!("{}", serde_yaml_ng::to_string(&report)?),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flvaac::structs::track::Sample;

    #[test]
    fn report_from_collected_frames() -> Result<()> {
        let mut meta = AudioMetadata::provisional(44100, 2);
        meta.codec = Some("mp4a.40.2".to_string());
        meta.config = vec![0x12, 0x10];
        meta.config_raw = vec![0x12, 0x10];
        meta.ref_sample_duration = 1024.0 * 1000.0 / 44100.0;

        let mut collector = InfoCollector::default();
        collector.on_track_metadata(&meta);

        let mut track = AudioTrack::default();
        for i in 0..10 {
            track.push(Sample::new(&[0u8; 100], i * 23));
        }
        collector.on_data_available(&track);
        collector.on_error(ErrorKind::CodecUnsupported, &DemuxError::UnsupportedCodec(7));

        let report = StreamReport::new(collector, &MediaInfo::new(true, false), 4096);
        assert_eq!(report.frames, 10);
        assert_eq!(report.payload_bytes, 1000);
        assert_eq!(report.duration_ms, 207 + 23);
        assert_eq!(report.dropped_tags.get("CodecUnsupported"), Some(&1));

        let audio = report.audio.as_ref().map(|a| a.config.as_str());
        assert_eq!(audio, Some("12 10"));

        let yaml = serde_yaml_ng::to_string(&report)?;
        assert!(yaml.contains("sample_rate: 44100"));
        assert!(yaml.contains("duration_ms: 230"));
        Ok(())
    }
}
