use std::fs::File;
use std::time::Instant;

use anyhow::Result;
use flvaac::process::schedule::PlaybackSink;
use flvaac::process::session::{Session, SessionStats};
use flvaac::structs::asc::RuntimeClass;
use indicatif::MultiProgress;
use log::Level;

use super::decoder::SymphoniaBackend;
use super::progress::{create_progress_bar, finalize_progress_bar};
use super::sink::{DiscardSink, WavOutput, WavSink};
use crate::cli::command::{Cli, PlayArgs};
use crate::cli::config::PlayerConfig;
use crate::input::InputReader;
use crate::timestamp::time_str;

pub fn cmd_play(args: &PlayArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = PlayerConfig::resolve(args)?;

    log::info!(
        "Playing FLV stream: {} (strict mode: {}, runtime class: {}, throttle: {})",
        args.input.display(),
        cli.strict,
        RuntimeClass::from(config.runtime_class),
        config.throttle
    );

    let reader = InputReader::new(&args.input)?;
    let total_bytes = if reader.is_pipe() {
        None
    } else {
        reader.file_size()
    };

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, total_bytes)?),
        None => None,
    };

    let (sink, wav_output): (Box<dyn PlaybackSink + Send>, Option<WavOutput<File>>) =
        match &args.output {
            Some(path) => {
                log::info!("Writing audio to {}", path.display());
                let (sink, output) = WavSink::new(File::create(path)?, args.realtime);
                (Box::new(sink), Some(output))
            }
            None => {
                log::info!("No output path specified, decoded audio is discarded");
                (Box::new(DiscardSink), None)
            }
        };

    let fail_level = if cli.strict { Level::Warn } else { Level::Error };

    let mut session = Session::builder()
        .decoder(Box::new(SymphoniaBackend::new()))
        .sink(sink)
        .policy(Box::new(RuntimeClass::from(config.runtime_class)))
        .throttle(config.throttle)
        .timestamp_base(config.timestamp_base)
        .volume(config.volume)
        .on_volume_change(Box::new(|volume| log::debug!("Volume set to {volume:.2}")))
        .fail_level(fail_level)
        .debug(config.debug)
        .build()?;

    let start_time = Instant::now();
    let mut source = reader.into_source(config.chunk_size, pb.clone());

    let stats = match session.run(&mut source) {
        Ok(stats) => stats,
        Err(e) => {
            if let Some(pb) = &pb {
                pb.finish_with_message("playback failed");
            }
            return Err(e.into());
        }
    };

    if let Some(output) = wav_output {
        let frames = output.finish()?;
        log::info!("Wrote {frames} frames");
    }

    finalize_progress_bar(&pb, &stats, start_time);
    log_summary(&stats);

    Ok(())
}

fn log_summary(stats: &SessionStats) {
    log::info!(
        "Read {} bytes in {} chunks: {} audio tags, {} skipped, {} dropped",
        stats.bytes,
        stats.chunks,
        stats.demux.audio_tags,
        stats.demux.skipped_tags,
        stats.demux.dropped_tags
    );
    log::info!(
        "Decoded {}/{} batches ({} failed, {} samples without metadata)",
        stats.dispatch.decoded,
        stats.dispatch.submitted,
        stats.dispatch.failed,
        stats.dispatch.dropped_samples
    );

    if stats.dispatch.failed > 0 {
        log::warn!("{} decode batches were dropped", stats.dispatch.failed);
    }

    log::info!(
        "Played {} in {} units ({} underruns)",
        time_str(stats.playback.played),
        stats.playback.started,
        stats.playback.underruns
    );
}
