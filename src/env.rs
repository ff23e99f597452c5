use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;

/// Core runtime configuration. `dedupe_checkins` opts into rejecting
/// repeated check-ins for the same student, class and calendar date; it
/// defaults to off to match the historical duplicate-tolerant behavior.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    pub dedupe_checkins: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            dedupe_checkins: false,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = dotenvy::var("DATABASE_URL")
            .map_err(|_| AppError::Validation("DATABASE_URL is not set".to_string()))?;

        let dedupe_checkins = dotenvy::var("DEDUPE_CHECKINS")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            dedupe_checkins,
        })
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe_checkins = dedupe;
        self
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("APP_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
