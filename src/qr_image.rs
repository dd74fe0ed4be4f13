//! QR code images: raster formats through `image`, SVG rasterized by `resvg`,
//! both scanned with `rqrr`.

use image::GrayImage;
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::{Options, Tree};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::context::ValidationContext;
use crate::error::{ErrorCode, Result, ValidationError};
use crate::file::{FileInfo, ImageKind};
use crate::jws::CompactToken;
use crate::log::{Log, ValidationResult};
use crate::qr;

/// Text and version of the QR code found in one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedQr {
    pub text: String,
    pub version: usize,
}

/// Scans every image for a QR code, then validates the numeric payloads
/// they carry as one, possibly split, token.
///
/// Images are decoded concurrently; the payloads are kept in input order.
#[instrument(skip_all, fields(images = files.len()))]
pub async fn validate(files: &[FileInfo], ctx: &ValidationContext) -> ValidationResult<CompactToken> {
    let mut log = Log::new("QR code (image)");

    if files.is_empty() {
        log.fatal("No QR code image given", ErrorCode::QrDecodeError);
        return ValidationResult::failed(log);
    }

    let raster_size = ctx.config.svg_raster_size;
    let handles: Vec<(String, JoinHandle<Result<DecodedQr>>)> = files
        .iter()
        .map(|file| {
            let name = file.name.clone();
            let buffer = file.buffer.clone();
            let kind = file.image;
            let handle =
                tokio::task::spawn_blocking(move || decode_image(&buffer, kind, raster_size));
            (name, handle)
        })
        .collect();

    let mut chunks = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let decoded = match handle.await {
            Ok(decoded) => decoded,
            Err(e) => Err(ValidationError::ImageDecodeError(e.to_string())),
        };
        match decoded {
            Ok(qr) => {
                if qr.version > ctx.config.max_qr_version {
                    log.error(
                        format!(
                            "QR code in {} has version {}, at most {} is allowed",
                            name, qr.version, ctx.config.max_qr_version
                        ),
                        ErrorCode::InvalidQrVersion,
                    );
                }
                log.info(format!("QR code version {} decoded from {}", qr.version, name));
                chunks.push(qr.text);
            }
            Err(ValidationError::ImageConversionError(reason)) => {
                warn!(file = %name, %reason, "SVG conversion failed");
                log.fatal(
                    format!("Failed to convert {} to a raster image: {}", name, reason),
                    ErrorCode::ImageConversionError,
                );
                return ValidationResult::failed(log);
            }
            Err(e) => {
                warn!(file = %name, error = %e, "QR decode failed");
                log.fatal(
                    format!("Failed to decode QR code from {}: {}", name, e),
                    ErrorCode::QrDecodeError,
                );
                return ValidationResult::failed(log);
            }
        }
    }

    let result = qr::validate(&chunks, ctx).await;
    log.add_child(result.log);
    ValidationResult::new(result.result, log)
}

/// Decodes the first QR code found in an encoded image.
pub fn decode_image(buffer: &[u8], kind: Option<ImageKind>, svg_raster_size: u32) -> Result<DecodedQr> {
    let grey = match kind {
        Some(ImageKind::Svg) => rasterize_svg(buffer, svg_raster_size)?,
        _ => image::load_from_memory(buffer)
            .map_err(|e| ValidationError::ImageDecodeError(e.to_string()))?
            .to_luma8(),
    };
    scan(&grey)
}

/// Scans a greyscale image for a QR code.
pub fn scan(grey: &GrayImage) -> Result<DecodedQr> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        grey.width() as usize,
        grey.height() as usize,
        |x, y| grey.get_pixel(x as u32, y as u32).0[0],
    );
    let grids = prepared.detect_grids();
    debug!(grids = grids.len(), "QR grids detected");

    let grid = grids
        .first()
        .ok_or_else(|| ValidationError::ImageDecodeError("no QR code found".to_string()))?;
    let (meta, text) = grid
        .decode()
        .map_err(|e| ValidationError::ImageDecodeError(e.to_string()))?;

    Ok(DecodedQr {
        text,
        version: meta.version.0,
    })
}

/// Renders an SVG onto a white canvas whose longest side is `size` pixels.
fn rasterize_svg(buffer: &[u8], size: u32) -> Result<GrayImage> {
    let tree = Tree::from_data(buffer, &Options::default())
        .map_err(|e| ValidationError::ImageConversionError(e.to_string()))?;

    let svg_size = tree.size();
    let longest = svg_size.width().max(svg_size.height());
    if longest <= 0.0 {
        return Err(ValidationError::ImageConversionError(
            "SVG has no size".to_string(),
        ));
    }
    let scale = size as f32 / longest;
    let width = (svg_size.width() * scale).ceil().max(1.0) as u32;
    let height = (svg_size.height() * scale).ceil().max(1.0) as u32;

    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        ValidationError::ImageConversionError(format!("cannot allocate {}x{} canvas", width, height))
    })?;
    pixmap.fill(Color::WHITE);
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    // opaque canvas, so premultiplied RGBA equals plain RGB
    let luma: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .map(|px| ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u8)
        .collect();

    GrayImage::from_raw(width, height, luma).ok_or_else(|| {
        ValidationError::ImageConversionError("raster buffer size mismatch".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::offline_context;

    fn blank_png() -> Vec<u8> {
        let img = GrayImage::from_pixel(64, 64, image::Luma([255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn blank_image_has_no_qr_code() {
        let err = decode_image(&blank_png(), Some(ImageKind::Png), 800).unwrap_err();
        assert!(err.to_string().contains("no QR code found"));
    }

    #[test]
    fn garbage_bytes_are_decode_errors() {
        let err = decode_image(b"not an image", None, 800).unwrap_err();
        assert!(matches!(err, ValidationError::ImageDecodeError(_)));
    }

    #[test]
    fn broken_svg_is_conversion_error() {
        let err = decode_image(b"<svg", Some(ImageKind::Svg), 800).unwrap_err();
        assert!(matches!(err, ValidationError::ImageConversionError(_)));
    }

    #[test]
    fn svg_is_rasterized_to_requested_size() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="10" height="10" fill="black"/></svg>"#;
        let grey = rasterize_svg(svg, 200).unwrap();
        assert_eq!((grey.width(), grey.height()), (200, 100));
        assert_eq!(grey.get_pixel(10, 10).0[0], 0);
        assert_eq!(grey.get_pixel(190, 10).0[0], 255);
    }

    #[tokio::test]
    async fn one_bad_image_fails_the_batch() {
        let files = vec![
            FileInfo::from_bytes("a.png", blank_png()),
            FileInfo::from_bytes("b.png", blank_png()),
        ];
        let result = validate(&files, &offline_context()).await;

        assert!(result.result.is_none());
        assert!(result.log.has_code(ErrorCode::QrDecodeError));
        assert!(result.log.is_fatal());
    }

    #[tokio::test]
    async fn bad_svg_is_fatal_conversion_error() {
        let files = vec![FileInfo::from_bytes("card.svg", b"<svg".to_vec())];
        let result = validate(&files, &offline_context()).await;

        assert!(result.result.is_none());
        assert!(result.log.has_code(ErrorCode::ImageConversionError));
    }
}
