//! Uniform invocation of out-of-process converters.
//!
//! Strategies describe a call as a [`ToolInvocation`]: a tool id, a vector of
//! discrete arguments (never a shell string) and the output file the tool is
//! expected to produce. A [`ToolRunner`] executes it and reports a
//! [`ToolReport`] whose [`ToolOutcome`] already includes the post-condition
//! check on the expected output.

pub mod process;

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

pub use process::ProcessRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    /// Headless office suite (document -> PDF, PDF -> word processor).
    Office,
    /// PDF rasterizer.
    PdfRenderer,
    /// PDF -> presentation converter.
    Slides,
}

impl ToolId {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolId::Office => "office",
            ToolId::PdfRenderer => "pdf_renderer",
            ToolId::Slides => "slides",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single external tool call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: ToolId,
    pub args: Vec<OsString>,
    pub expected_output: PathBuf,
}

impl ToolInvocation {
    pub fn new(tool: ToolId, expected_output: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            args: Vec::new(),
            expected_output: expected_output.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends `prefix` immediately followed by `path` as one argument,
    /// e.g. `-sOutputFile=/work/page.png`.
    pub fn prefixed_path(mut self, prefix: &str, path: &Path) -> Self {
        let mut arg = OsString::from(prefix);
        arg.push(path.as_os_str());
        self.args.push(arg);
        self
    }
}

/// What happened to an invocation, including the output post-condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Exit code 0 and the expected output exists and is non-empty.
    Produced { path: PathBuf, size: u64 },
    NonZeroExit(Option<i32>),
    /// Exit code 0 but the expected output is absent or empty.
    MissingOutput,
    TimedOut(Duration),
}

impl ToolOutcome {
    /// Derives the outcome of a finished process from its exit code and the
    /// state of the expected output file.
    pub fn inspect(exit_code: Option<i32>, expected_output: &Path) -> Self {
        if exit_code != Some(0) {
            return ToolOutcome::NonZeroExit(exit_code);
        }
        match std::fs::metadata(expected_output) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => ToolOutcome::Produced {
                path: expected_output.to_path_buf(),
                size: meta.len(),
            },
            _ => ToolOutcome::MissingOutput,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolReport {
    pub tool: ToolId,
    pub outcome: ToolOutcome,
    /// Captured stderr, for internal logs only.
    pub stderr: String,
}

impl ToolReport {
    /// Returns the verified output, treating a non-zero exit, a timeout and a
    /// missing output identically as failures.
    pub fn into_output(self) -> Result<(PathBuf, u64), ConversionError> {
        match self.outcome {
            ToolOutcome::Produced { path, size } => Ok((path, size)),
            ToolOutcome::NonZeroExit(Some(code)) => Err(ConversionError::tool(
                self.tool,
                format!("exited with status {}", code),
            )),
            ToolOutcome::NonZeroExit(None) => {
                Err(ConversionError::tool(self.tool, "terminated by signal"))
            }
            ToolOutcome::MissingOutput => Err(ConversionError::tool(
                self.tool,
                "exited successfully but produced no output",
            )),
            ToolOutcome::TimedOut(limit) => Err(ConversionError::tool(
                self.tool,
                format!("timed out after {}s", limit.as_secs()),
            )),
        }
    }
}

/// Executes external tool invocations.
pub trait ToolRunner: Send + Sync {
    fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolReport, ConversionError>;
}

/// Program name or path for each tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPrograms {
    #[serde(default = "default_office")]
    pub office: String,
    #[serde(default = "default_pdf_renderer")]
    pub pdf_renderer: String,
    #[serde(default = "default_slides")]
    pub slides: String,
}

fn default_office() -> String {
    "soffice".to_string()
}

fn default_pdf_renderer() -> String {
    "gs".to_string()
}

fn default_slides() -> String {
    "soffice".to_string()
}

impl Default for ToolPrograms {
    fn default() -> Self {
        Self {
            office: default_office(),
            pdf_renderer: default_pdf_renderer(),
            slides: default_slides(),
        }
    }
}

impl ToolPrograms {
    pub fn program(&self, tool: ToolId) -> &str {
        match tool {
            ToolId::Office => &self.office,
            ToolId::PdfRenderer => &self.pdf_renderer,
            ToolId::Slides => &self.slides,
        }
    }
}
