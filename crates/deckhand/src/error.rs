use std::path::PathBuf;
use thiserror::Error;

use crate::authoring::AuthoringError;

#[derive(Error, Debug)]
pub enum DeckhandError {
    #[error("Authoring error: {0}")]
    Authoring(#[from] AuthoringError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },

    #[error("Settings validation failed: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, DeckhandError>;
