//! Conversion job lifecycle.
//!
//! [`JobManager`] is the only writer of job state after upload. Every
//! attempt goes through a compare-and-swap claim into `processing`, so two
//! concurrent requests for the same job can never interleave their writes.

pub mod error;
pub mod manager;
pub mod model;

pub use error::{ErrorKind, JobError};
pub use manager::{ConversionContext, JobManager, HISTORY_PAGE_SIZE};
pub use model::{
    ConversionJob, ConversionReceipt, ConversionResponse, ConvertedArtifact, DownloadTarget,
    HistoryPage, JobStatus,
};
