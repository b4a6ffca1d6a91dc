pub mod capability;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod job;
pub mod sanitize;
pub mod storage;
pub mod strategy;
pub mod tools;

pub use capability::{resolve, StrategyId};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, ConversionError, DocshiftError, Result, StorageError};
pub use format::Format;
pub use job::{
    ConversionContext, ConversionJob, ConversionReceipt, ConversionResponse, DownloadTarget,
    ErrorKind, HistoryPage, JobError, JobManager, JobStatus,
};
pub use storage::ArtifactStore;
pub use strategy::{ConversionStrategy, StrategyRegistry};
pub use tools::{ProcessRunner, ToolId, ToolInvocation, ToolOutcome, ToolReport, ToolRunner};
