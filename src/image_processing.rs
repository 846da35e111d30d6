use std::io::Cursor;

use axum::body::Bytes;
use base64::Engine;
use image::{ImageFormat, ImageReader};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum UploadError {
    #[error("No image file provided")]
    Missing,
    #[error("Image file is empty")]
    Empty,
    #[error("Only image files are allowed (got {0})")]
    NotAnImage(String),
    #[error("Image exceeds the {max} byte limit ({size} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("Image could not be decoded: {0}")]
    Undecodable(String),
}

impl UploadedImage {
    pub fn new(bytes: Bytes, mime_type: String, file_name: Option<String>) -> Self {
        Self {
            bytes,
            mime_type,
            file_name,
        }
    }

    pub fn to_data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{encoded}", self.mime_type)
    }

    pub fn file_name_or_default(&self) -> String {
        match self.file_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("input.{}", get_extension_from_mime_type(&self.mime_type)),
        }
    }
}

/// The returned MIME type is the sniffed one, not the declared one.
pub fn validate_upload(
    bytes: Bytes,
    declared_content_type: Option<&str>,
    file_name: Option<String>,
    max_bytes: usize,
) -> Result<UploadedImage, UploadError> {
    let declared = declared_content_type
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !declared.starts_with("image/") {
        let shown = if declared.is_empty() { "no content type".to_string() } else { declared };
        return Err(UploadError::NotAnImage(shown));
    }
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    let mime_type = detect_mime_type(bytes.as_ref())
        .ok_or_else(|| UploadError::Undecodable("unrecognised image format".to_string()))?;
    get_dimensions(bytes.as_ref(), mime_type)?;
    Ok(UploadedImage::new(bytes, mime_type.to_string(), file_name))
}

pub fn get_dimensions(bytes: &[u8], mime_type: &str) -> Result<(u32, u32), UploadError> {
    let format = mime_to_format(mime_type)
        .ok_or_else(|| UploadError::Undecodable(format!("unsupported mime type: {mime_type}")))?;
    ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|err| UploadError::Undecodable(err.to_string()))
}

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

pub fn mime_to_format(mime_type: &str) -> Option<ImageFormat> {
    match mime_type {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        "image/bmp" => Some(ImageFormat::Bmp),
        _ => None,
    }
}

pub fn get_extension_from_mime_type(mime_type: &str) -> &'static str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
