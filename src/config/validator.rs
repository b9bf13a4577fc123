use crate::config::HarnessConfig;
use crate::error::{Error, Result};

/// Validates the values of a configuration without touching the filesystem.
pub fn validate_config(config: &HarnessConfig) -> Result<()> {
    if config.command.trim().is_empty() {
        return Err(Error::ConfigInvalid("Command is empty".to_string()));
    }

    if config.address.trim().is_empty() {
        return Err(Error::ConfigInvalid("Address is empty".to_string()));
    }

    if config.port == 0 {
        return Err(Error::ConfigInvalid("Port must not be 0".to_string()));
    }

    if config.startup_timeout_ms == 0 {
        return Err(Error::ConfigInvalid(
            "Startup timeout must be greater than 0".to_string(),
        ));
    }

    if config.connect_attempt_timeout_ms == 0 {
        return Err(Error::ConfigInvalid(
            "Connect attempt timeout must be greater than 0".to_string(),
        ));
    }

    if config.readiness_marker.is_empty() {
        return Err(Error::ConfigInvalid("Readiness marker is empty".to_string()));
    }

    if config.config_dir_env == config.include_file_env {
        return Err(Error::ConfigInvalid(format!(
            "Config dir and include file share the environment variable '{}'",
            config.config_dir_env
        )));
    }

    Ok(())
}

/// Checks that the config directory and include script prepared for the server exist.
pub fn validate_paths(config: &HarnessConfig) -> Result<()> {
    let config_dir = config.config_dir();
    if !config_dir.is_dir() {
        return Err(Error::ConfigInvalid(format!(
            "Config directory '{}' does not exist",
            config_dir.display()
        )));
    }

    let include_file = config.include_file();
    if !include_file.is_file() {
        return Err(Error::ConfigInvalid(format!(
            "Include file '{}' does not exist",
            include_file.display()
        )));
    }

    Ok(())
}
