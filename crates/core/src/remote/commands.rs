//! Fixed read-only command set used for conversion telemetry.

use crate::config::RemoteConfig;

/// Make a title safe to interpolate into shell commands, globs, and SQL string
/// literals. Keeps alphanumerics plus `.`, `-`, `_`; everything else becomes `_`.
/// A leading `.` or `-` is replaced too so the result can never read as an
/// option or a hidden path.
pub fn sanitize_title(title: &str) -> String {
    let mut leading = true;
    let sanitized: String = title
        .chars()
        .map(|c| {
            let allowed = c.is_alphanumeric() || matches!(c, '.' | '-' | '_');
            let keep = allowed && !(leading && matches!(c, '.' | '-'));
            if c != '.' && c != '-' {
                leading = false;
            }
            if keep {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

/// The commands one telemetry tick runs, built once per pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryQueries {
    title: String,
    pub queue_status: String,
    pub general_log: String,
    pub conversion_log: String,
}

impl TelemetryQueries {
    pub fn for_title(title: &str, config: &RemoteConfig) -> Self {
        let title = sanitize_title(title);

        let queue_status = format!(
            "sqlite3 {}/{} -column \"SELECT status FROM jobs WHERE path LIKE '%{}%' ORDER BY id DESC LIMIT 1;\"",
            config.app_dir.trim_end_matches('/'),
            config.database_file,
            title
        );

        Self {
            general_log: newest_log_command(&config.general_log_dir, &title),
            conversion_log: newest_log_command(&config.ffmpeg_log_dir, &title),
            queue_status,
            title,
        }
    }

    /// The sanitized title the commands were built from.
    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Print the most recently modified `*<title>*.log` in `dir`, or nothing.
fn newest_log_command(dir: &str, title: &str) -> String {
    format!(
        "LOG=$(ls -t {}/*{}*.log 2>/dev/null | head -n 1); if [ -n \"$LOG\" ]; then cat \"$LOG\"; fi",
        dir.trim_end_matches('/'),
        title
    )
}
