use std::path::PathBuf;
use thiserror::Error;

use crate::tools::ToolId;

#[derive(Error, Debug)]
pub enum DocshiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job error: {0}")]
    Job(#[from] crate::job::JobError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Failures raised by a conversion strategy or the tool adapter it drives.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to decode source: {0}")]
    Decode(String),

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error("Failed to lay out page: {0}")]
    Layout(String),

    #[error("External tool '{tool}' failed: {reason}")]
    ExternalTool { tool: ToolId, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConversionError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn tool(tool: ToolId, reason: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Stored path escapes its artifact directory")]
    PathViolation,
}

pub type Result<T> = std::result::Result<T, DocshiftError>;
