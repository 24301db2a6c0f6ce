use crate::error::AppError;
use crate::models::upload_types::UploadedImage;
use image::{DynamicImage, ImageFormat};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub fn is_accepted_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// A decoded upload plus the temp file holding it for the model.
/// Dropping this removes the file.
#[derive(Debug)]
pub struct IngestedImage {
    pub file_name: String,
    pub format: ImageFormat,
    pub bitmap: DynamicImage,
    temp: NamedTempFile,
}

impl IngestedImage {
    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}

pub fn check_batch_size(count: usize, max: usize) -> Result<(), AppError> {
    if count > max {
        return Err(AppError::BatchSizeExceeded { count, max });
    }
    Ok(())
}

pub fn ingest(upload: &UploadedImage, temp_dir: Option<&Path>) -> Result<IngestedImage, AppError> {
    let name = &upload.file_name;
    if !is_accepted_file_name(name) {
        return Err(AppError::UnsupportedFormat(format!(
            "{}: only .png, .jpg and .jpeg files are accepted",
            name
        )));
    }

    let format = image::guess_format(&upload.bytes)
        .map_err(|_| AppError::Decode(format!("{}: not a recognizable image", name)))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(AppError::UnsupportedFormat(format!(
            "{}: content is {:?}, expected PNG or JPEG",
            name, format
        )));
    }

    let bitmap = image::load_from_memory_with_format(&upload.bytes, format)
        .map_err(|e| AppError::Decode(format!("{}: {}", name, e)))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("upload-").suffix(".png");
    let mut temp = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    bitmap
        .write_to(temp.as_file_mut(), ImageFormat::Png)
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?;
    temp.as_file_mut().flush()?;

    debug!(
        file = %name,
        bytes = upload.bytes.len(),
        width = bitmap.width(),
        height = bitmap.height(),
        temp = %temp.path().display(),
        "upload ingested"
    );

    Ok(IngestedImage {
        file_name: name.clone(),
        format,
        bitmap,
        temp,
    })
}
