//! Types for conversion telemetry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Queue status reported when the conversion database has no row for the title.
pub const DEFAULT_QUEUE_STATUS: &str = "NOT STARTED";

/// Queue statuses (compared case-insensitively) that mean the conversion is over.
pub const TERMINAL_QUEUE_STATUSES: &[&str] = &["COMPLETED", "COMPLETE", "DONE", "FINISHED"];

/// Subtitle extraction phase derived from the general conversion log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitlePhase {
    #[default]
    Pending,
    InProgress,
    Completed,
    /// The source has no subtitles to extract.
    #[serde(rename = "none")]
    NoSubtitles,
}

impl SubtitlePhase {
    pub fn label(&self) -> &'static str {
        match self {
            SubtitlePhase::Pending => "Pending",
            SubtitlePhase::InProgress => "In Progress",
            SubtitlePhase::Completed => "Completed",
            SubtitlePhase::NoSubtitles => "None",
        }
    }
}

impl fmt::Display for SubtitlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One conversion telemetry reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub queue_status: String,
    pub subtitle_phase: SubtitlePhase,
    /// 0-100.
    pub progress_percent: u8,
    /// Last lines of the conversion log.
    pub log_tail: String,
    /// Full text of the general conversion log.
    #[serde(default)]
    pub general_log: String,
    /// The conversion log carries ffmpeg's end-of-run summary.
    #[serde(default)]
    pub log_finished: bool,
}

impl TelemetrySample {
    /// Sample used when the conversion host has nothing to report yet.
    pub fn unavailable() -> Self {
        Self {
            queue_status: DEFAULT_QUEUE_STATUS.to_string(),
            subtitle_phase: SubtitlePhase::Pending,
            progress_percent: 0,
            log_tail: String::new(),
            general_log: String::new(),
            log_finished: false,
        }
    }

    /// Whether the queue status names a finished conversion.
    pub fn has_terminal_status(&self) -> bool {
        let status = self.queue_status.trim();
        TERMINAL_QUEUE_STATUSES
            .iter()
            .any(|terminal| status.eq_ignore_ascii_case(terminal))
    }

    /// Progress floors fractional seconds, so a finished run may stop short of
    /// 100; the queue status or the end-of-run summary settle it then.
    pub fn is_complete(&self) -> bool {
        self.progress_percent >= 100 || self.log_finished || self.has_terminal_status()
    }
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self::unavailable()
    }
}
