//! Extracts progress and phase information from conversion log text.
//!
//! Every function here is total: arbitrary (including empty) input yields a
//! value, never an error.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

use super::types::{SubtitlePhase, TelemetrySample, DEFAULT_QUEUE_STATUS};

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2})").unwrap());

static POSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})").unwrap());

/// ffmpeg prints this in its summary once the output file is finalized.
pub const END_OF_RUN_MARKER: &str = "muxing overhead";

/// Subtitle markers in precedence order: a later matching entry overrides an earlier one.
pub const SUBTITLE_MARKERS: &[(&str, SubtitlePhase)] = &[
    ("Extracting subtitles", SubtitlePhase::InProgress),
    ("Extracted", SubtitlePhase::Completed),
    ("Converted", SubtitlePhase::Completed),
    ("No subtitles found", SubtitlePhase::NoSubtitles),
];

fn hms_seconds(caps: &Captures<'_>) -> u64 {
    let field = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    field(1) * 3600 + field(2) * 60 + field(3)
}

/// Conversion progress from an ffmpeg log: the last `time=` position over the
/// first `Duration:` total, floored to a whole percent and capped at 100.
pub fn parse_progress(log: &str) -> u8 {
    let total = match DURATION_RE.captures(log) {
        Some(caps) => hms_seconds(&caps),
        None => return 0,
    };
    if total == 0 {
        return 0;
    }

    let position = match POSITION_RE.captures_iter(log).last() {
        Some(caps) => hms_seconds(&caps),
        None => return 0,
    };

    (position.min(total) * 100 / total) as u8
}

/// Classify `text` against an ordered marker table. The last table entry whose
/// phrase occurs in `text` wins; `default` if none occur.
pub fn classify_phase<P: Copy>(text: &str, markers: &[(&str, P)], default: P) -> P {
    markers
        .iter()
        .filter(|(phrase, _)| text.contains(*phrase))
        .last()
        .map(|(_, phase)| *phase)
        .unwrap_or(default)
}

pub fn classify_subtitles(general_log: &str) -> SubtitlePhase {
    classify_phase(general_log, SUBTITLE_MARKERS, SubtitlePhase::Pending)
}

/// Whether an ffmpeg log reached its end-of-run summary.
pub fn log_finished(log: &str) -> bool {
    log.contains(END_OF_RUN_MARKER)
}

/// The last `n` lines of `text`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Queue status from the database query output.
pub fn parse_queue_status(output: Option<&str>) -> String {
    output
        .and_then(|o| o.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or(DEFAULT_QUEUE_STATUS)
        .to_string()
}

/// Build a sample from raw command outputs. `None` means the command produced no data.
pub fn assemble_sample(
    queue_output: Option<&str>,
    general_log: Option<&str>,
    conversion_log: Option<&str>,
    tail: usize,
) -> TelemetrySample {
    let general_log = general_log.unwrap_or_default();
    let conversion_log = conversion_log.unwrap_or_default();

    TelemetrySample {
        queue_status: parse_queue_status(queue_output),
        subtitle_phase: classify_subtitles(general_log),
        progress_percent: parse_progress(conversion_log),
        log_tail: tail_lines(conversion_log, tail),
        general_log: general_log.to_string(),
        log_finished: log_finished(conversion_log),
    }
}
