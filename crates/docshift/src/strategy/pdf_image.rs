use std::sync::Arc;

use crate::capability::StrategyId;
use crate::error::ConversionError;
use crate::format::Format;
use crate::strategy::image::{decode, encode};
use crate::strategy::{verify_output, ConversionOutput, ConversionRequest, ConversionStrategy};
use crate::tools::{ToolId, ToolInvocation, ToolRunner};

pub const RENDER_DPI: u32 = 150;

/// Renders the first page of a PDF to a raster image.
pub struct PdfToImage {
    runner: Arc<dyn ToolRunner>,
}

impl PdfToImage {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }
}

/// Output device and the format it writes. Targets the renderer cannot
/// write directly are rendered to PNG and transcoded afterwards.
fn render_device(target: Format) -> (&'static str, Format) {
    match target {
        Format::Jpg => ("jpeg", Format::Jpg),
        _ => ("png16m", Format::Png),
    }
}

impl ConversionStrategy for PdfToImage {
    fn id(&self) -> StrategyId {
        StrategyId::PdfToImage
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutput, ConversionError> {
        let _span = tracing::info_span!("strategy.pdf_to_image", to = %request.to).entered();

        if !request.to.is_raster() {
            return Err(ConversionError::Encode(format!(
                "{} is not a raster format",
                request.to
            )));
        }

        let (device, rendered_format) = render_device(request.to);
        let rendered = request
            .work_dir
            .join(format!("page-1.{}", rendered_format.extension()));

        let invocation = ToolInvocation::new(ToolId::PdfRenderer, &rendered)
            .arg("-dSAFER")
            .arg("-dBATCH")
            .arg("-dNOPAUSE")
            .arg("-dQUIET")
            .arg("-dFirstPage=1")
            .arg("-dLastPage=1")
            .arg(format!("-sDEVICE={}", device))
            .arg(format!("-r{}", RENDER_DPI))
            .prefixed_path("-sOutputFile=", &rendered)
            .arg(request.source.as_os_str());

        let (path, _) = self.runner.invoke(&invocation)?.into_output()?;

        if rendered_format == request.to {
            return verify_output(&path, request.to);
        }

        tracing::debug!(from = %rendered_format, to = %request.to, "Transcoding rendered page");
        let img = decode(&path, rendered_format)?;
        let dest = request
            .work_dir
            .join(format!("output.{}", request.to.extension()));
        encode(&img, request.to, &dest)?;
        verify_output(&dest, request.to)
    }
}
