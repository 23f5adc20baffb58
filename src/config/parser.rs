use crate::config::types::Settings;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Settings)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use site_ingest::config::load_config;
///
/// let settings = load_config(Path::new("site-ingest.toml")).unwrap();
/// println!("Parallelism: {}", settings.crawler.parallelism);
/// ```
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(content)?;
    validate(&settings)?;
    Ok(settings)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged on load so a run can be traced back to the exact file it used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the settings and their hash
pub fn load_config_with_hash(path: &Path) -> Result<(Settings, String), ConfigError> {
    let settings = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((settings, hash))
}
