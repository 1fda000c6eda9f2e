use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use log::debug;

use crate::error::{Error, Result};

/// Output formats the encoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Tiff,
}

/// Formats we know about but do not implement; asking for one is a 501,
/// anything else entirely is a 400.
const KNOWN_UNSUPPORTED: &[&str] = &["gif", "pdf", "jp2", "bmp", "svg"];

/// Input formats the decoder accepts.
const SUPPORTED_READ: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Tiff,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

impl OutputFormat {
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "tif" | "tiff" => Ok(OutputFormat::Tiff),
            other if KNOWN_UNSUPPORTED.contains(&other) => {
                Err(Error::FormatUnsupported(other.to_string()))
            }
            other => Err(Error::Format(other.to_string())),
        }
    }

    /// The original service advertised `image/jpg`; kept for compatibility.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Tiff => "image/tiff",
        }
    }

    pub fn is_save_supported(&self) -> bool {
        // All four variants map onto encoders the backend ships.
        true
    }
}

/// Crop gravity. The backend has no feature-detecting crop, so `Smart`
/// degrades to a centre crop instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gravity {
    #[default]
    Centre,
    Smart,
}

/// Region rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One fused backend pass: crop, resize, colorspace and the target format.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    /// `None` leaves the full extent.
    pub crop: Option<Rect>,
    pub gravity: Gravity,
    pub width: u32,
    pub height: u32,
    pub grayscale: bool,
    pub format: OutputFormat,
}

/// The separate rotation pass; skipped when it would be the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotateParams {
    pub flip: bool,
    /// Degrees clockwise, one of 0, 90, 180, 270.
    pub angle: i32,
}

impl RotateParams {
    pub fn is_identity(&self) -> bool {
        !self.flip && self.angle == 0
    }
}

/// Sniffs the input format and decodes, gating unsupported inputs with a
/// 501 before any pixel work happens.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes)
        .map_err(|_| Error::FormatReadUnsupported("unknown".to_string()))?;

    if !SUPPORTED_READ.contains(&format) {
        return Err(Error::FormatReadUnsupported(
            format!("{:?}", format).to_lowercase(),
        ));
    }

    image::load_from_memory(bytes).map_err(|e| Error::Internal(format!("decode failed: {}", e)))
}

pub fn dimensions(img: &DynamicImage) -> (u32, u32) {
    img.dimensions()
}

/// Applies the fused pass. The caller is responsible for target dimensions
/// that already honor aspect and maxima; the resize here is always exact.
pub fn process(img: DynamicImage, params: &TransformParams) -> DynamicImage {
    if params.gravity == Gravity::Smart {
        debug!("smart gravity requested, using centre crop");
    }

    let mut img = img;
    if let Some(rect) = params.crop {
        img = img.crop_imm(rect.x, rect.y, rect.w, rect.h);
    }

    if img.dimensions() != (params.width, params.height) {
        img = img.resize_exact(params.width, params.height, FilterType::Lanczos3);
    }

    if params.grayscale {
        img = img.grayscale();
    }

    img
}

/// Mirror on the vertical axis first, then rotate clockwise.
pub fn rotate(img: DynamicImage, params: &RotateParams) -> DynamicImage {
    let img = if params.flip { img.fliph() } else { img };

    match params.angle {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img,
    }
}

pub fn encode(img: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
    let img = sanitize_for(format, img);
    let mut output = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, 85);
            let result = match &img {
                DynamicImage::ImageLuma8(buf) => encoder.encode_image(buf),
                DynamicImage::ImageRgb8(buf) => encoder.encode_image(buf),
                other => encoder.encode_image(&other.to_rgb8()),
            };
            result.map_err(|e| Error::Internal(format!("JPEG encoding failed: {}", e)))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                .map_err(|e| Error::Internal(format!("PNG encoding failed: {}", e)))?;
        }
        OutputFormat::Webp => {
            img.write_to(&mut Cursor::new(&mut output), ImageFormat::WebP)
                .map_err(|e| Error::Internal(format!("WebP encoding failed: {}", e)))?;
        }
        OutputFormat::Tiff => {
            img.write_to(&mut Cursor::new(&mut output), ImageFormat::Tiff)
                .map_err(|e| Error::Internal(format!("TIFF encoding failed: {}", e)))?;
        }
    }

    Ok(output)
}

/// Reduces the pixel layout to something the target encoder accepts: JPEG
/// has no alpha and no 16-bit gray, the WebP encoder only takes RGB(A)8.
fn sanitize_for(format: OutputFormat, img: &DynamicImage) -> DynamicImage {
    match format {
        OutputFormat::Jpeg => match img {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
            DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        OutputFormat::Webp => match img {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img.clone(),
            _ if img.color().has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        OutputFormat::Png | OutputFormat::Tiff => img.clone(),
    }
}
