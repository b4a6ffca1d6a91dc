//! PDF import into the office suite.
//!
//! Both strategies always emit the XML-packaged variant (`docx`, `pptx`)
//! whatever legacy token was requested; callers read the produced format
//! from [`ConversionOutput::format`].

use std::sync::Arc;

use crate::capability::StrategyId;
use crate::error::ConversionError;
use crate::format::Format;
use crate::strategy::office::{office_output_path, profile_arg};
use crate::strategy::{verify_output, ConversionOutput, ConversionRequest, ConversionStrategy};
use crate::tools::{ToolId, ToolInvocation, ToolRunner};

struct PdfImport {
    tool: ToolId,
    input_filter: &'static str,
    convert_to: &'static str,
    produces: Format,
}

impl PdfImport {
    fn run(
        &self,
        runner: &dyn ToolRunner,
        request: &ConversionRequest<'_>,
    ) -> Result<ConversionOutput, ConversionError> {
        let expected = office_output_path(request.source, request.work_dir, self.produces.extension());
        let invocation = ToolInvocation::new(self.tool, &expected)
            .arg("--headless")
            .arg("--norestore")
            .arg(profile_arg(request.work_dir))
            .arg(format!("--infilter={}", self.input_filter))
            .arg("--convert-to")
            .arg(self.convert_to)
            .arg("--outdir")
            .arg(request.work_dir.as_os_str())
            .arg(request.source.as_os_str());

        let (path, _) = runner.invoke(&invocation)?.into_output()?;
        verify_output(&path, self.produces)
    }
}

const WORD_IMPORT: PdfImport = PdfImport {
    tool: ToolId::Office,
    input_filter: "writer_pdf_import",
    convert_to: "docx:MS Word 2007 XML",
    produces: Format::Docx,
};

const SLIDES_IMPORT: PdfImport = PdfImport {
    tool: ToolId::Slides,
    input_filter: "impress_pdf_import",
    convert_to: "pptx",
    produces: Format::Pptx,
};

/// PDF -> word processor document (always `docx`).
pub struct PdfToWord {
    runner: Arc<dyn ToolRunner>,
}

impl PdfToWord {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }
}

impl ConversionStrategy for PdfToWord {
    fn id(&self) -> StrategyId {
        StrategyId::PdfToWord
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutput, ConversionError> {
        let _span = tracing::info_span!("strategy.pdf_to_word", requested = %request.to).entered();
        WORD_IMPORT.run(self.runner.as_ref(), request)
    }
}

/// PDF -> presentation (always `pptx`).
pub struct PdfToPpt {
    runner: Arc<dyn ToolRunner>,
}

impl PdfToPpt {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }
}

impl ConversionStrategy for PdfToPpt {
    fn id(&self) -> StrategyId {
        StrategyId::PdfToPpt
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutput, ConversionError> {
        let _span = tracing::info_span!("strategy.pdf_to_ppt", requested = %request.to).entered();
        SLIDES_IMPORT.run(self.runner.as_ref(), request)
    }
}
