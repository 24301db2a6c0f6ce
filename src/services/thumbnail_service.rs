use crate::error::AppError;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

const THUMBNAIL_SIZE: u32 = 320;
const THUMBNAIL_QUALITY: u8 = 75;

/// Downscale an uploaded bitmap and return it as JPEG bytes.
/// JPEG uploads get their EXIF orientation applied.
pub fn generate_thumbnail_bytes(
    original: &[u8],
    bitmap: &DynamicImage,
    format: ImageFormat,
) -> Result<Vec<u8>, AppError> {
    let orientation = if format == ImageFormat::Jpeg {
        read_orientation(original)
    } else {
        1
    };

    let mut img = if bitmap.width() > THUMBNAIL_SIZE || bitmap.height() > THUMBNAIL_SIZE {
        bitmap.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle)
    } else {
        bitmap.clone()
    };

    if orientation != 1 {
        img = apply_orientation(img, orientation);
    }

    encode_jpeg_thumbnail(&img)
}

/// Generate a thumbnail and return it as a base64 data URI.
pub fn generate_thumbnail(
    original: &[u8],
    bitmap: &DynamicImage,
    format: ImageFormat,
) -> Result<String, AppError> {
    let bytes = generate_thumbnail_bytes(original, bitmap, format)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:image/jpeg;base64,{}", b64))
}

fn encode_jpeg_thumbnail(img: &DynamicImage) -> Result<Vec<u8>, AppError> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, THUMBNAIL_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| AppError::Io(std::io::Error::other(format!("Failed to encode thumbnail: {}", e))))?;
    Ok(buffer.into_inner())
}

/// EXIF orientation tag, 1 when absent or unreadable.
fn read_orientation(bytes: &[u8]) -> u32 {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(e) => e,
        Err(_) => return 1,
    };

    match exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        Some(field) => match field.value {
            exif::Value::Short(ref v) => *v.first().unwrap_or(&1) as u32,
            exif::Value::Long(ref v) => *v.first().unwrap_or(&1),
            _ => 1,
        },
        None => 1,
    }
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate90(),
        6 => img.rotate90(),
        7 => img.fliph().rotate270(),
        8 => img.rotate270(),
        _ => img,
    }
}
