use std::time::{Duration, Instant};

use anyhow::Result;
use flvaac::process::session::SessionStats;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::timestamp::time_str;

/// Byte progress over the input, or a spinner when the size is unknown.
pub fn create_progress_bar(multi: &MultiProgress, total_bytes: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_bytes {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bytes}\n{msg} | elapsed: {elapsed_precise}",
        )?);
        pb
    };

    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("waiting for audio");
    Ok(pb)
}

pub fn finalize_progress_bar(pb: &Option<ProgressBar>, stats: &SessionStats, start_time: Instant) {
    let Some(pb) = pb else {
        return;
    };

    let elapsed = start_time.elapsed().as_secs_f64();
    let played = stats.playback.played;
    let speed = if elapsed > 0.0 {
        played.as_secs_f64() / elapsed
    } else {
        0.0
    };

    pb.finish_with_message(format!(
        "speed: {speed:.1}x | played: {} | batches: {}/{} decoded",
        time_str(played),
        stats.dispatch.decoded,
        stats.dispatch.submitted
    ));
}
