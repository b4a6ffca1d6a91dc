pub mod image;
pub mod image_pdf;
pub mod office;
pub mod pdf_image;
pub mod pdf_office;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capability::StrategyId;
use crate::error::ConversionError;
use crate::format::Format;
use crate::tools::ToolRunner;

/// Inputs to one conversion attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub source: &'a Path,
    pub from: Format,
    pub to: Format,
    /// Isolated directory owned by the caller; the output must land here.
    pub work_dir: &'a Path,
}

/// A verified, non-empty output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutput {
    pub path: PathBuf,
    pub size: u64,
    /// The format actually produced, which may differ from the requested one
    /// (PDF -> `doc` always yields `docx`, for example).
    pub format: Format,
}

pub trait ConversionStrategy: Send + Sync {
    fn id(&self) -> StrategyId;
    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutput, ConversionError>;
}

/// Checks that `path` exists and is non-empty before reporting success.
pub(crate) fn verify_output(
    path: &Path,
    format: Format,
) -> Result<ConversionOutput, ConversionError> {
    let meta = std::fs::metadata(path).map_err(|e| ConversionError::io(path, e))?;
    if !meta.is_file() || meta.len() == 0 {
        return Err(ConversionError::Encode(format!(
            "output '{}' is empty",
            crate::sanitize::redact_path(path)
        )));
    }
    Ok(ConversionOutput {
        path: path.to_path_buf(),
        size: meta.len(),
        format,
    })
}

/// One strategy per capability class.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn ConversionStrategy>>,
}

impl StrategyRegistry {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        let strategies: Vec<Box<dyn ConversionStrategy>> = vec![
            Box::new(image::ImageToImage::new()),
            Box::new(image_pdf::ImageToPdf::new()),
            Box::new(office::OfficeToPdf::new(runner.clone())),
            Box::new(pdf_image::PdfToImage::new(runner.clone())),
            Box::new(pdf_office::PdfToWord::new(runner.clone())),
            Box::new(pdf_office::PdfToPpt::new(runner)),
        ];

        Self { strategies }
    }

    pub fn get(&self, id: StrategyId) -> Option<&dyn ConversionStrategy> {
        self.strategies
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.as_ref())
    }
}
