use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, Frame, ImageEncoder, ImageReader, Rgb, RgbImage};

use crate::capability::StrategyId;
use crate::error::ConversionError;
use crate::format::Format;
use crate::strategy::{verify_output, ConversionOutput, ConversionRequest, ConversionStrategy};

const JPEG_QUALITY: u8 = 90;
const WEBP_QUALITY: f32 = 85.0;
/// libwebp refuses anything wider or taller than this.
const WEBP_MAX_DIMENSION: u32 = 16383;

/// Raster -> raster re-encoding with the in-process image library.
pub struct ImageToImage;

impl ImageToImage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageToImage {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionStrategy for ImageToImage {
    fn id(&self) -> StrategyId {
        StrategyId::ImageToImage
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutput, ConversionError> {
        let _span = tracing::info_span!(
            "strategy.image_to_image",
            from = %request.from,
            to = %request.to,
        )
        .entered();

        let img = decode(request.source, request.from)?;
        let dest = request
            .work_dir
            .join(format!("output.{}", request.to.extension()));
        encode(&img, request.to, &dest)?;

        verify_output(&dest, request.to)
    }
}

/// Decodes `path` with the decoder for its declared format, not a sniffed one.
pub(crate) fn decode(path: &Path, format: Format) -> Result<DynamicImage, ConversionError> {
    let image_format = format
        .image_format()
        .ok_or_else(|| ConversionError::Decode(format!("{} is not a raster format", format)))?;

    let mut reader = ImageReader::open(path).map_err(|e| ConversionError::io(path, e))?;
    reader.set_format(image_format);
    reader
        .decode()
        .map_err(|e| ConversionError::Decode(e.to_string()))
}

/// Encodes `img` as `format` at `dest`.
///
/// Alpha-capable targets keep transparency (palettes are expanded to RGBA);
/// JPEG output is composited over opaque white first.
pub(crate) fn encode(img: &DynamicImage, format: Format, dest: &Path) -> Result<(), ConversionError> {
    let (width, height) = (img.width(), img.height());

    if format == Format::Webp {
        // The image crate only writes lossless WebP; libwebp gives us lossy at a fixed quality.
        if width > WEBP_MAX_DIMENSION || height > WEBP_MAX_DIMENSION {
            return Err(ConversionError::Encode(format!(
                "{}x{} exceeds the WebP limit of {} pixels per side",
                width, height, WEBP_MAX_DIMENSION
            )));
        }
        let rgba = img.to_rgba8();
        let encoded = webp::Encoder::from_rgba(&rgba, width, height)
            .encode_simple(false, WEBP_QUALITY)
            .map_err(|e| ConversionError::Encode(format!("webp encoder rejected image: {:?}", e)))?;
        return std::fs::write(dest, &*encoded).map_err(|e| ConversionError::io(dest, e));
    }

    let file = File::create(dest).map_err(|e| ConversionError::io(dest, e))?;
    let mut writer = BufWriter::new(file);

    match format {
        Format::Jpg => {
            let rgb = flatten_on_white(img);
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| ConversionError::Encode(e.to_string()))?;
        }
        Format::Png => {
            let rgba = img.to_rgba8();
            PngEncoder::new_with_quality(&mut writer, CompressionType::Default, FilterType::Adaptive)
                .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| ConversionError::Encode(e.to_string()))?;
        }
        Format::Gif => {
            let rgba = img.to_rgba8();
            // The trailer is written when the encoder drops.
            let mut encoder = GifEncoder::new(&mut writer);
            encoder
                .encode_frame(Frame::new(rgba))
                .map_err(|e| ConversionError::Encode(e.to_string()))?;
        }
        other => {
            return Err(ConversionError::Encode(format!(
                "{} is not a raster format",
                other
            )));
        }
    }

    writer.flush().map_err(|e| ConversionError::io(dest, e))
}

/// Composites the image over an opaque white background.
pub(crate) fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }

    out
}
