use crate::config::types::{ApiConfig, CrawlerSettings, ImportConfig, Settings, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    validate_crawler_settings(&settings.crawler)?;
    validate_import_config(&settings.import)?;
    validate_api_config(&settings.api)?;
    validate_storage_config(&settings.storage)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_settings(config: &CrawlerSettings) -> Result<(), ConfigError> {
    if !(1..=16).contains(&config.parallelism) {
        return Err(ConfigError::Validation(format!(
            "parallelism must be between 1 and 16, got {}",
            config.parallelism
        )));
    }

    if !(1..=32).contains(&config.max_depth) {
        return Err(ConfigError::Validation(format!(
            "max_depth must be between 1 and 32, got {}",
            config.max_depth
        )));
    }

    if !(1..=600).contains(&config.fetch_timeout_secs) {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_secs must be between 1 and 600, got {}",
            config.fetch_timeout_secs
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates import configuration
fn validate_import_config(config: &ImportConfig) -> Result<(), ConfigError> {
    if !(1..=16).contains(&config.concurrency) {
        return Err(ConfigError::Validation(format!(
            "import concurrency must be between 1 and 16, got {}",
            config.concurrency
        )));
    }

    Ok(())
}

/// Validates the remote API section
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    if let Some(api_url) = &config.url {
        let url = Url::parse(api_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api url '{}': {}", api_url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "api url '{}' must use http or https",
                api_url
            )));
        }
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "api timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
