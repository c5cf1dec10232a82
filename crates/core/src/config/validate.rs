use super::{types::Config, ConfigError};

/// Upper bound for a single remote command, connect included.
const MAX_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Characters that must never appear in remote paths interpolated into shell commands.
const SHELL_METACHARACTERS: &[char] = &[
    '\'', '"', '`', '$', ';', '&', '|', '<', '>', '(', ')', '\\', '\n', '\r', ' ', '*', '?',
];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let url = config.engine.url.trim();
    if url.is_empty() {
        return Err(invalid("engine.url cannot be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid("engine.url must start with http:// or https://"));
    }

    let remote = &config.remote;
    if remote.host.trim().is_empty() {
        return Err(invalid("remote.host cannot be empty"));
    }
    if remote.user.trim().is_empty() {
        return Err(invalid("remote.user cannot be empty"));
    }
    if remote.connect_timeout_secs == 0 {
        return Err(invalid("remote.connect_timeout_secs must be greater than 0"));
    }
    if remote.connect_timeout_secs > remote.command_timeout_secs {
        return Err(invalid(
            "remote.connect_timeout_secs cannot exceed remote.command_timeout_secs",
        ));
    }
    if remote.command_timeout_secs > MAX_COMMAND_TIMEOUT_SECS {
        return Err(ConfigError::ValidationError(format!(
            "remote.command_timeout_secs cannot exceed {}",
            MAX_COMMAND_TIMEOUT_SECS
        )));
    }
    if remote.log_tail_lines == 0 {
        return Err(invalid("remote.log_tail_lines must be greater than 0"));
    }

    for (name, value) in [
        ("remote.app_dir", &remote.app_dir),
        ("remote.database_file", &remote.database_file),
        ("remote.general_log_dir", &remote.general_log_dir),
        ("remote.ffmpeg_log_dir", &remote.ffmpeg_log_dir),
    ] {
        if value.is_empty() {
            return Err(ConfigError::ValidationError(format!("{} cannot be empty", name)));
        }
        if value.contains(SHELL_METACHARACTERS) {
            return Err(ConfigError::ValidationError(format!(
                "{} contains shell metacharacters",
                name
            )));
        }
    }

    if config.pipeline.acquisition_poll_interval_ms == 0 {
        return Err(invalid("pipeline.acquisition_poll_interval_ms must be greater than 0"));
    }
    if config.pipeline.telemetry_poll_interval_ms == 0 {
        return Err(invalid("pipeline.telemetry_poll_interval_ms must be greater than 0"));
    }
    if config.pipeline.update_buffer == 0 {
        return Err(invalid("pipeline.update_buffer must be greater than 0"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
