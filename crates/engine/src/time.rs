/// Timeline ticks per second: the engine keeps every timestamp in microseconds.
pub const TICKS_PER_SECOND: i64 = 1_000_000;

/// Converts seconds into timeline ticks with nearest rounding.
///
/// Returns `None` for NaN or infinite input.
///
/// # Example
/// ```
/// use splitter_engine::seconds_to_ticks;
///
/// assert_eq!(seconds_to_ticks(12.5), Some(12_500_000));
/// assert_eq!(seconds_to_ticks(f64::NAN), None);
/// ```
pub fn seconds_to_ticks(seconds: f64) -> Option<i64> {
    if !seconds.is_finite() {
        return None;
    }
    let ticks = (seconds * TICKS_PER_SECOND as f64).round();
    Some(ticks.clamp(i64::MIN as f64, i64::MAX as f64) as i64)
}

/// Converts timeline ticks into seconds.
///
/// # Example
/// ```
/// use splitter_engine::ticks_to_seconds;
///
/// assert_eq!(ticks_to_seconds(1_500_000), 1.5);
/// ```
pub fn ticks_to_seconds(t_tl: i64) -> f64 {
    t_tl as f64 / TICKS_PER_SECOND as f64
}

/// Formats ticks as `MM:SS.cc` for list labels and log lines.
///
/// Minutes are not wrapped into hours.
///
/// # Example
/// ```
/// use splitter_engine::format_clock;
///
/// assert_eq!(format_clock(75_250_000), "01:15.25");
/// ```
pub fn format_clock(t_tl: i64) -> String {
    let centis = t_tl.max(0) / (TICKS_PER_SECOND / 100);
    let minutes = centis / 6_000;
    let seconds = (centis / 100) % 60;
    let fraction = centis % 100;
    format!("{minutes:02}:{seconds:02}.{fraction:02}")
}
