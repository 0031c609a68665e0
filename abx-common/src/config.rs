//! Configuration loading and data directory resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Default HTTP listen port for abx-server
pub const DEFAULT_PORT: u16 = 5780;

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "abx.db";

/// Data directory resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_dir) = config.get("data_dir").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(data_dir));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_dir())
}

/// Resolve the listen port: CLI argument > environment variable > TOML
/// config file > compiled default.
pub fn resolve_port(cli_arg: Option<u16>, env_var_name: &str) -> u16 {
    if let Some(port) = cli_arg {
        return port;
    }

    if let Ok(value) = std::env::var(env_var_name) {
        if let Ok(port) = value.parse::<u16>() {
            return port;
        }
    }

    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(port) = config.get("port").and_then(|v| v.as_integer()) {
                    if (1..=65535).contains(&port) {
                        return port as u16;
                    }
                }
            }
        }
    }

    DEFAULT_PORT
}

/// Full path to the database file inside the resolved data directory,
/// creating the directory if it does not exist yet.
pub fn database_path(data_dir: &PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join(DATABASE_FILE))
}

/// Get configuration file path for the platform
fn locate_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("abx").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/abx/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("abx"))
        .unwrap_or_else(|| PathBuf::from("./abx_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_takes_priority() {
        let dir = resolve_data_dir(Some("/tmp/abx-cli"), "ABX_TEST_UNSET_VAR").unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/abx-cli"));
    }

    #[test]
    fn env_var_used_when_no_cli_arg() {
        std::env::set_var("ABX_TEST_DATA_DIR", "/tmp/abx-env");
        let dir = resolve_data_dir(None, "ABX_TEST_DATA_DIR").unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/abx-env"));
        std::env::remove_var("ABX_TEST_DATA_DIR");
    }

    #[test]
    fn port_falls_back_to_default() {
        assert_eq!(resolve_port(None, "ABX_TEST_UNSET_PORT"), DEFAULT_PORT);
    }

    #[test]
    fn port_cli_arg_wins() {
        assert_eq!(resolve_port(Some(8080), "ABX_TEST_UNSET_PORT"), 8080);
    }

    #[test]
    fn database_path_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().join("nested").join("abx");
        let path = database_path(&data_dir).unwrap();
        assert!(data_dir.exists());
        assert_eq!(path, data_dir.join(DATABASE_FILE));
    }
}
