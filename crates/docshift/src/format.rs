//! File format tokens and the fixed download content-type table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized format token. `jpeg` is folded into [`Format::Jpg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpg,
    Png,
    Gif,
    Webp,
    Pdf,
    Doc,
    Docx,
    Ppt,
    Pptx,
}

impl Format {
    pub const ALL: [Format; 9] = [
        Format::Jpg,
        Format::Png,
        Format::Gif,
        Format::Webp,
        Format::Pdf,
        Format::Doc,
        Format::Docx,
        Format::Ppt,
        Format::Pptx,
    ];

    /// Parses a user or database token, case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        match normalize_token(token).as_str() {
            "jpg" => Some(Format::Jpg),
            "png" => Some(Format::Png),
            "gif" => Some(Format::Gif),
            "webp" => Some(Format::Webp),
            "pdf" => Some(Format::Pdf),
            "doc" => Some(Format::Doc),
            "docx" => Some(Format::Docx),
            "ppt" => Some(Format::Ppt),
            "pptx" => Some(Format::Pptx),
            _ => None,
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Jpg => "jpg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Webp => "webp",
            Format::Pdf => "pdf",
            Format::Doc => "doc",
            Format::Docx => "docx",
            Format::Ppt => "ppt",
            Format::Pptx => "pptx",
        }
    }

    pub fn is_raster(self) -> bool {
        matches!(self, Format::Jpg | Format::Png | Format::Gif | Format::Webp)
    }

    pub fn is_office(self) -> bool {
        matches!(self, Format::Doc | Format::Docx | Format::Ppt | Format::Pptx)
    }

    pub fn is_word(self) -> bool {
        matches!(self, Format::Doc | Format::Docx)
    }

    pub fn is_slides(self) -> bool {
        matches!(self, Format::Ppt | Format::Pptx)
    }

    /// Whether the raster format can carry transparency.
    pub fn supports_alpha(self) -> bool {
        matches!(self, Format::Png | Format::Webp | Format::Gif)
    }

    pub fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            Format::Jpg => Some(image::ImageFormat::Jpeg),
            Format::Png => Some(image::ImageFormat::Png),
            Format::Gif => Some(image::ImageFormat::Gif),
            Format::Webp => Some(image::ImageFormat::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lowercases and trims a format token and folds `jpeg` into `jpg`.
pub fn normalize_token(token: &str) -> String {
    let token = token.trim().trim_start_matches('.').to_ascii_lowercase();
    if token == "jpeg" {
        "jpg".to_string()
    } else {
        token
    }
}

/// Content type for a download, keyed by the final extension of `filename`.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}
