use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::Result;
use flvaac::process::demux::{DemuxListener, TagParser};
use flvaac::structs::adts::{AdtsFrameBuilder, AdtsParams};
use flvaac::structs::asc::RuntimeClass;
use flvaac::structs::metadata::{AudioMetadata, MediaInfo};
use flvaac::structs::track::AudioTrack;
use flvaac::utils::errors::{DemuxError, ErrorKind};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use super::command::{Cli, ExtractArgs};
use super::demux::demux_input;
use crate::input::{DEFAULT_CHUNK_SIZE, InputReader};

/// Writes every delivered sample as an ADTS frame.
struct AdtsWriter<W: Write> {
    out: W,
    builder: Option<AdtsFrameBuilder>,
    frames: u64,
    bytes: u64,
    errors: u64,
    io_error: Option<io::Error>,
}

impl<W: Write> AdtsWriter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            builder: None,
            frames: 0,
            bytes: 0,
            errors: 0,
            io_error: None,
        }
    }

    fn take_error(&mut self) -> Result<()> {
        match self.io_error.take() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl<W: Write> DemuxListener for AdtsWriter<W> {
    fn on_error(&mut self, kind: ErrorKind, error: &DemuxError) {
        self.errors += 1;
        log::debug!("Tag dropped ({kind}): {error}");
    }

    fn on_media_info(&mut self, _info: &MediaInfo) {}

    fn on_track_metadata(&mut self, meta: &AudioMetadata) {
        let params = AdtsParams::from(meta);
        if let Some(builder) = &self.builder {
            if builder.params() != params {
                log::warn!(
                    "Stream configuration changed mid-stream: {:?} -> {:?}",
                    builder.params(),
                    params
                );
            }
        }
        self.builder = Some(AdtsFrameBuilder::new(params));
    }

    fn on_data_available(&mut self, track: &AudioTrack) {
        let Some(builder) = self.builder else {
            return;
        };
        if self.io_error.is_some() {
            return;
        }

        let frames = builder.build(&track.samples);
        match self.out.write_all(&frames) {
            Ok(()) => {
                self.frames += track.samples.len() as u64;
                self.bytes += frames.len() as u64;
            }
            Err(e) => self.io_error = Some(e),
        }
    }
}

pub fn cmd_extract(args: &ExtractArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let policy = RuntimeClass::from(args.runtime_class);
    log::info!(
        "Extracting ADTS from {} (runtime class: {policy})",
        args.input.display()
    );

    let mut reader = InputReader::new(&args.input)?;

    let out: Box<dyn Write> = if args.output.to_string_lossy() == "-" {
        Box::new(io::stdout().lock())
    } else {
        log::info!("Output path specified: {}", args.output.display());
        Box::new(File::create(&args.output)?)
    };

    let mut parser =
        TagParser::new(AdtsWriter::new(BufWriter::new(out))).with_policy(Box::new(policy));
    parser.set_fail_level(if cli.strict { Level::Warn } else { Level::Error });

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} {bytes} read | {msg}",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
        None => None,
    };

    let pass = demux_input(
        &mut reader,
        &mut parser,
        DEFAULT_CHUNK_SIZE,
        pb.as_ref(),
        |parser| {
            let writer = parser.listener_mut();
            writer.take_error()?;
            if let Some(pb) = &pb {
                pb.set_message(format!("{} frames", writer.frames));
            }
            Ok(true)
        },
    )?;

    let mut writer = parser.into_listener();
    writer.take_error()?;
    writer.out.flush()?;

    if let Some(pb) = &pb {
        pb.finish_with_message(format!("{} frames", writer.frames));
    }

    if writer.builder.is_none() {
        log::warn!("No AAC sequence header found, nothing was extracted");
    }

    log::info!(
        "Extracted {} frames ({} bytes) from {} input bytes, {} tags dropped",
        writer.frames,
        writer.bytes,
        pass.bytes,
        writer.errors
    );

    Ok(())
}
