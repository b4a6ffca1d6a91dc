//! Static table of supported (source, target) format pairs.

use std::fmt;

use serde::Serialize;

use crate::format::Format;

/// Identifies the conversion strategy for one class of format pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyId {
    ImageToImage,
    ImageToPdf,
    OfficeToPdf,
    PdfToImage,
    PdfToWord,
    PdfToPpt,
}

impl StrategyId {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyId::ImageToImage => "image-to-image",
            StrategyId::ImageToPdf => "image-to-pdf",
            StrategyId::OfficeToPdf => "office-to-pdf",
            StrategyId::PdfToImage => "pdf-to-image",
            StrategyId::PdfToWord => "pdf-to-word",
            StrategyId::PdfToPpt => "pdf-to-ppt",
        }
    }

    /// Client-facing message reported when this strategy fails.
    pub fn failure_message(self) -> &'static str {
        match self {
            StrategyId::ImageToImage => "Image conversion failed",
            StrategyId::ImageToPdf => "Failed to convert image to PDF",
            StrategyId::OfficeToPdf => "Office conversion failed",
            StrategyId::PdfToImage => "PDF to image conversion failed",
            StrategyId::PdfToWord => "PDF to Word conversion failed",
            StrategyId::PdfToPpt => "PDF to PPT conversion failed",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the strategy for a pair of raw format tokens.
///
/// Tokens are normalized first (lowercase, `jpeg` == `jpg`). Unknown tokens
/// and unlisted pairs return `None`.
pub fn resolve(source: &str, target: &str) -> Option<StrategyId> {
    let source = Format::parse(source)?;
    let target = Format::parse(target)?;
    resolve_formats(source, target)
}

pub fn resolve_formats(source: Format, target: Format) -> Option<StrategyId> {
    if source.is_raster() && target.is_raster() {
        return Some(StrategyId::ImageToImage);
    }
    match (source, target) {
        (s, Format::Pdf) if s.is_raster() => Some(StrategyId::ImageToPdf),
        (s, Format::Pdf) if s.is_office() => Some(StrategyId::OfficeToPdf),
        (Format::Pdf, t) if t.is_raster() => Some(StrategyId::PdfToImage),
        (Format::Pdf, t) if t.is_word() => Some(StrategyId::PdfToWord),
        (Format::Pdf, t) if t.is_slides() => Some(StrategyId::PdfToPpt),
        _ => None,
    }
}

/// Every supported pair, in table order.
pub fn supported_pairs() -> impl Iterator<Item = (Format, Format, StrategyId)> {
    Format::ALL.into_iter().flat_map(|source| {
        Format::ALL
            .into_iter()
            .filter_map(move |target| resolve_formats(source, target).map(|id| (source, target, id)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RASTER: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

    #[test]
    fn test_image_to_image_pairs() {
        for source in RASTER {
            for target in RASTER {
                assert_eq!(
                    resolve(source, target),
                    Some(StrategyId::ImageToImage),
                    "{source} -> {target}"
                );
            }
        }
    }

    #[test]
    fn test_image_to_pdf_pairs() {
        for source in RASTER {
            assert_eq!(resolve(source, "pdf"), Some(StrategyId::ImageToPdf));
        }
    }

    #[test]
    fn test_office_to_pdf_pairs() {
        for source in ["doc", "docx", "ppt", "pptx"] {
            assert_eq!(resolve(source, "pdf"), Some(StrategyId::OfficeToPdf));
        }
    }

    #[test]
    fn test_pdf_source_pairs() {
        for target in RASTER {
            assert_eq!(resolve("pdf", target), Some(StrategyId::PdfToImage));
        }
        assert_eq!(resolve("pdf", "doc"), Some(StrategyId::PdfToWord));
        assert_eq!(resolve("pdf", "docx"), Some(StrategyId::PdfToWord));
        assert_eq!(resolve("pdf", "ppt"), Some(StrategyId::PdfToPpt));
        assert_eq!(resolve("pdf", "pptx"), Some(StrategyId::PdfToPpt));
    }

    #[test]
    fn test_tokens_are_normalized() {
        assert_eq!(resolve("PNG", "JPEG"), Some(StrategyId::ImageToImage));
        assert_eq!(resolve("Docx", "PDF"), Some(StrategyId::OfficeToPdf));
    }

    #[test]
    fn test_unlisted_pairs_are_unsupported() {
        assert_eq!(resolve("docx", "gif"), None);
        assert_eq!(resolve("pdf", "pdf"), None);
        assert_eq!(resolve("docx", "pptx"), None);
        assert_eq!(resolve("png", "docx"), None);
        assert_eq!(resolve("pptx", "png"), None);
        assert_eq!(resolve("txt", "pdf"), None);
        assert_eq!(resolve("png", "bmp"), None);
    }

    #[test]
    fn test_every_pair_matches_table() {
        for source in Format::ALL {
            for target in Format::ALL {
                let expected = if source.is_raster() && target.is_raster() {
                    Some(StrategyId::ImageToImage)
                } else if source.is_raster() && target == Format::Pdf {
                    Some(StrategyId::ImageToPdf)
                } else if source.is_office() && target == Format::Pdf {
                    Some(StrategyId::OfficeToPdf)
                } else if source == Format::Pdf && target.is_raster() {
                    Some(StrategyId::PdfToImage)
                } else if source == Format::Pdf && target.is_word() {
                    Some(StrategyId::PdfToWord)
                } else if source == Format::Pdf && target.is_slides() {
                    Some(StrategyId::PdfToPpt)
                } else {
                    None
                };
                assert_eq!(resolve_formats(source, target), expected, "{source} -> {target}");
            }
        }
    }

    #[test]
    fn test_supported_pairs_count() {
        // 16 image->image, 4 image->pdf, 4 office->pdf, 4 pdf->image, 2 + 2 pdf->office
        assert_eq!(supported_pairs().count(), 32);
    }
}
