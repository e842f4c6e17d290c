use std::time::Duration;

/// `HH:MM:SS.mmm`, with the hour field widening past 99 hours.
pub fn time_str(duration: Duration) -> String {
    let ms = duration.as_millis();
    let hours = ms / 3_600_000;
    let minutes = ms % 3_600_000 / 60_000;
    let seconds = ms % 60_000 / 1000;
    let milliseconds = ms % 1000;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
}

/// Formats a millisecond timestamp as produced by the demuxer.
pub fn dts_str(dts: i64) -> String {
    let sign = if dts < 0 { "-" } else { "" };
    format!("{sign}{}", time_str(Duration::from_millis(dts.unsigned_abs())))
}

#[test]
fn formats_hours_minutes_seconds() {
    assert_eq!(time_str(Duration::from_millis(0)), "00:00:00.000");
    assert_eq!(time_str(Duration::from_millis(3_723_045)), "01:02:03.045");
    assert_eq!(time_str(Duration::from_secs(100 * 3600)), "100:00:00.000");
    assert_eq!(dts_str(-1500), "-00:00:01.500");
}
