use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::capability::StrategyId;
use crate::error::ConversionError;
use crate::format::Format;
use crate::strategy::{verify_output, ConversionOutput, ConversionRequest, ConversionStrategy};
use crate::tools::{ToolId, ToolInvocation, ToolRunner};

/// Word processor / presentation documents -> PDF via the headless office suite.
pub struct OfficeToPdf {
    runner: Arc<dyn ToolRunner>,
}

impl OfficeToPdf {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }
}

/// The office suite names its output after the source stem, in `out_dir`.
pub(crate) fn office_output_path(source: &Path, out_dir: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut name = stem;
    name.push(".");
    name.push(extension);
    out_dir.join(name)
}

/// Characters left unescaped in the path of a `file://` URL.
const FILE_URL_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b':');

/// Points the office suite at a user profile inside `work_dir`.
///
/// A running instance locks its profile, so concurrent conversions sharing
/// the default one fail or hand their documents to each other.
pub(crate) fn profile_arg(work_dir: &Path) -> OsString {
    let absolute = std::path::absolute(work_dir).unwrap_or_else(|_| work_dir.to_path_buf());
    let mut path = absolute.join("lo-profile").to_string_lossy().replace('\\', "/");
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    format!(
        "-env:UserInstallation=file://{}",
        utf8_percent_encode(&path, FILE_URL_PATH)
    )
    .into()
}

impl ConversionStrategy for OfficeToPdf {
    fn id(&self) -> StrategyId {
        StrategyId::OfficeToPdf
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutput, ConversionError> {
        let _span = tracing::info_span!("strategy.office_to_pdf", from = %request.from).entered();

        let expected = office_output_path(request.source, request.work_dir, "pdf");
        let invocation = ToolInvocation::new(ToolId::Office, &expected)
            .arg("--headless")
            .arg("--norestore")
            .arg(profile_arg(request.work_dir))
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(request.work_dir.as_os_str())
            .arg(request.source.as_os_str());

        let (path, _) = self.runner.invoke(&invocation)?.into_output()?;
        verify_output(&path, Format::Pdf)
    }
}
