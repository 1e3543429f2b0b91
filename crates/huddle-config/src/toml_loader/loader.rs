//! Reading `config.toml`, and writing the documented template when it is
//! missing.

use std::fs;
use std::path::{Path, PathBuf};

use huddle_common::ConfigError;
use tracing::{info, warn};

use super::template::default_config_toml;
use crate::schema::HuddleConfig;
use crate::validation;

/// Where `load_default` looks: `<os config dir>/huddle/config.toml`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("huddle").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("no OS config directory".into()))
}

/// Parse a TOML file. Missing fields take their defaults.
///
/// Out-of-range values are logged, not rejected; callers that need a
/// strict check run `validation::validate` themselves.
pub fn load_from_path(path: &Path) -> Result<HuddleConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!("{}: {e}", path.display())));
        }
    };

    let config: HuddleConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), error = %e, "Config has out-of-range values");
    }
    info!(path = %path.display(), "Config loaded");
    Ok(config)
}

/// Load `path`, first writing the commented template there if nothing
/// exists yet.
pub fn load_or_create(path: &Path) -> Result<HuddleConfig, ConfigError> {
    match load_from_path(path) {
        Err(ConfigError::FileNotFound(_)) => {
            write_template(path)?;
            Ok(HuddleConfig::default())
        }
        other => other,
    }
}

/// `load_or_create` at `config_path()`.
pub fn load_default() -> Result<HuddleConfig, ConfigError> {
    load_or_create(&config_path()?)
}

fn write_template(path: &Path) -> Result<(), ConfigError> {
    let io_err = |e: std::io::Error| ConfigError::ParseError(format!("{}: {e}", path.display()));
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    fs::write(path, default_config_toml()).map_err(io_err)?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}
