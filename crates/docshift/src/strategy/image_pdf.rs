use std::io::{BufWriter, Write};
use std::path::Path;

use image::{ColorType, ImageReader};
use lopdf::{dictionary, Document, Object, Stream};

use crate::capability::StrategyId;
use crate::error::ConversionError;
use crate::format::Format;
use crate::strategy::image::{decode, flatten_on_white};
use crate::strategy::{verify_output, ConversionOutput, ConversionRequest, ConversionStrategy};

/// Assumed source resolution when converting pixels to physical size.
pub const SOURCE_DPI: f64 = 96.0;
pub const PAGE_WIDTH_MM: f64 = 210.0;
pub const PAGE_HEIGHT_MM: f64 = 297.0;
pub const MARGIN_MM: f64 = 10.0;

const MM_PER_INCH: f64 = 25.4;
const POINTS_PER_INCH: f64 = 72.0;

/// Placement of an image on the A4 page, in millimetres from the top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Fits a `width_px` x `height_px` image inside the printable area.
///
/// Images are only ever scaled down, uniformly.
pub fn fit_on_page(width_px: u32, height_px: u32) -> Result<PageLayout, ConversionError> {
    if width_px == 0 || height_px == 0 {
        return Err(ConversionError::Layout(format!(
            "invalid image dimensions {}x{}",
            width_px, height_px
        )));
    }

    let mut width_mm = width_px as f64 * MM_PER_INCH / SOURCE_DPI;
    let mut height_mm = height_px as f64 * MM_PER_INCH / SOURCE_DPI;

    let max_width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
    let max_height = PAGE_HEIGHT_MM - 2.0 * MARGIN_MM;

    if width_mm > max_width || height_mm > max_height {
        let ratio = (max_width / width_mm).min(max_height / height_mm);
        width_mm *= ratio;
        height_mm *= ratio;
    }

    Ok(PageLayout {
        x_mm: MARGIN_MM,
        y_mm: MARGIN_MM,
        width_mm,
        height_mm,
    })
}

fn mm_to_pt(mm: f64) -> f32 {
    (mm * POINTS_PER_INCH / MM_PER_INCH) as f32
}

/// Raster -> single-page A4 PDF.
pub struct ImageToPdf;

impl ImageToPdf {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageToPdf {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionStrategy for ImageToPdf {
    fn id(&self) -> StrategyId {
        StrategyId::ImageToPdf
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutput, ConversionError> {
        let _span = tracing::info_span!("strategy.image_to_pdf", from = %request.from).entered();

        let (width, height) = read_dimensions(request.source, request.from)?;
        let layout = fit_on_page(width, height)?;
        tracing::debug!(
            width_px = width,
            height_px = height,
            width_mm = layout.width_mm,
            height_mm = layout.height_mm,
            "Computed page layout"
        );

        let image_stream = image_xobject(request.source, request.from)?;
        let mut doc = build_document(image_stream, &layout);

        let dest = request.work_dir.join("output.pdf");
        let file = std::fs::File::create(&dest).map_err(|e| ConversionError::io(&dest, e))?;
        let mut writer = BufWriter::new(file);
        doc.save_to(&mut writer)
            .map_err(|e| ConversionError::Encode(e.to_string()))?;
        writer.flush().map_err(|e| ConversionError::io(&dest, e))?;

        verify_output(&dest, Format::Pdf)
    }
}

fn read_dimensions(path: &Path, format: Format) -> Result<(u32, u32), ConversionError> {
    let image_format = format
        .image_format()
        .ok_or_else(|| ConversionError::Layout(format!("{} is not a raster format", format)))?;

    let mut reader = ImageReader::open(path).map_err(|e| ConversionError::io(path, e))?;
    reader.set_format(image_format);
    reader
        .into_dimensions()
        .map_err(|e| ConversionError::Layout(format!("cannot read image dimensions: {}", e)))
}

fn image_xobject(path: &Path, format: Format) -> Result<Stream, ConversionError> {
    let img = decode(path, format)?;
    let (width, height) = (img.width(), img.height());

    if format == Format::Jpg && img.color() == ColorType::Rgb8 {
        let jpeg = std::fs::read(path).map_err(|e| ConversionError::io(path, e))?;
        // The decoder reports CMYK and YCCK sources as RGB too, so only a
        // three-component frame may keep its original bytes under DeviceRGB.
        if !matches!(jpeg_frame(&jpeg), Some((SOF_BASELINE..=SOF_PROGRESSIVE, 3))) {
            return flate_xobject(&img, width, height);
        }
        return Ok(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));
    }

    flate_xobject(&img, width, height)
}

fn flate_xobject(img: &image::DynamicImage, width: u32, height: u32) -> Result<Stream, ConversionError> {
    let rgb = flatten_on_white(img);
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb.into_raw(),
    );
    stream
        .compress()
        .map_err(|e| ConversionError::Encode(e.to_string()))?;
    Ok(stream)
}

const SOF_BASELINE: u8 = 0xC0;
const SOF_PROGRESSIVE: u8 = 0xC2;

/// Start-of-frame marker and component count of a JPEG stream.
fn jpeg_frame(bytes: &[u8]) -> Option<(u8, u8)> {
    if bytes.get(..2)? != [0xFF, 0xD8] {
        return None;
    }

    let mut pos = 2;
    loop {
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        while *bytes.get(pos)? == 0xFF {
            pos += 1;
        }
        let marker = *bytes.get(pos)?;
        pos += 1;

        match marker {
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD7 => continue,
            // End of image or start of scan before any frame header.
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let length = usize::from(u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]));
        if length < 2 {
            return None;
        }
        // C4, C8 and CC share the range but are not frame headers.
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            // length(2) precision(1) height(2) width(2) components(1)
            return Some((marker, *bytes.get(pos + 7)?));
        }
        pos += length;
    }
}

fn build_document(image_stream: Stream, layout: &PageLayout) -> Document {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let resources_id = doc.new_object_id();
    let content_id = doc.new_object_id();
    let page_id = doc.new_object_id();
    let image_id = doc.new_object_id();

    doc.objects.insert(image_id, Object::Stream(image_stream));

    doc.objects.insert(
        resources_id,
        Object::Dictionary(dictionary! {
            "XObject" => dictionary! {
                "Im1" => image_id,
            },
        }),
    );

    let page_width = mm_to_pt(PAGE_WIDTH_MM);
    let page_height = mm_to_pt(PAGE_HEIGHT_MM);
    let img_width = mm_to_pt(layout.width_mm);
    let img_height = mm_to_pt(layout.height_mm);
    let x = mm_to_pt(layout.x_mm);
    // PDF space grows upwards; anchor the image's top edge at the top margin.
    let y = page_height - mm_to_pt(layout.y_mm) - img_height;

    let content = format!(
        "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/Im1 Do\nQ\n",
        img_width, img_height, x, y
    );
    doc.objects.insert(
        content_id,
        Object::Stream(Stream::new(dictionary! {}, content.into_bytes())),
    );

    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(page_width), Object::Real(page_height)],
            "Resources" => resources_id,
            "Contents" => content_id,
        }),
    );

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc
}
