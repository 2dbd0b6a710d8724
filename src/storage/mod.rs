use std::{
    fs,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageFormat;

use crate::{
    error::{AppError, AppResult},
    models::{slugify, GenerationResult, UploadedImage},
};

pub struct ParsedDataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Self-contained data URI for an upload. Used both as the API payload and
/// as the preview source, so the two are always byte-identical.
pub fn image_to_data_url(image: &UploadedImage) -> String {
    let mime = if image.is_image() {
        image.mime_type.as_str()
    } else {
        sniff_mime(&image.bytes).unwrap_or("application/octet-stream")
    };

    encode_data_url(mime, &image.bytes)
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let mime = match image::guess_format(bytes).ok()? {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Avif => "image/avif",
        _ => return None,
    };

    Some(mime)
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => return None,
    };

    Some(mime)
}

/// Reads a file from disk the way a file picker hands it over: name, bytes
/// and a declared media type (extension first, magic bytes second).
pub fn load_image_file(path: &Path) -> AppResult<UploadedImage> {
    if !path.exists() {
        return Err(AppError::msg(format!(
            "image path not found: {}",
            path.display()
        )));
    }

    let bytes = fs::read(path)?;
    let mime = mime_from_extension(path)
        .or_else(|| sniff_mime(&bytes))
        .unwrap_or("application/octet-stream");
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(UploadedImage::new(name, mime, bytes))
}

pub fn parse_data_url(data_url: &str) -> AppResult<ParsedDataUrl> {
    if !data_url.starts_with("data:") {
        return Err(AppError::msg("expected a data URL with image payload"));
    }

    let (metadata, payload) = data_url
        .split_once(',')
        .ok_or_else(|| AppError::msg("invalid data URL format"))?;

    if !metadata.contains(";base64") {
        return Err(AppError::msg("data URL must be base64 encoded"));
    }

    let mime = metadata
        .trim_start_matches("data:")
        .split(';')
        .next()
        .unwrap_or_default();
    if !mime.starts_with("image/") {
        return Err(AppError::msg(format!("unsupported mime type: {mime}")));
    }

    let bytes = STANDARD.decode(payload.trim())?;
    Ok(ParsedDataUrl {
        mime: mime.to_string(),
        bytes,
    })
}

/// `3d-{angle-slug}-{timestamp}.png`
pub fn download_file_name(angle: &str, timestamp_ms: i64) -> String {
    format!("3d-{}-{timestamp_ms}.png", slugify(angle))
}

/// Resolves a result image into downloadable bytes. Data URIs decode in
/// place, remote URLs are fetched.
pub async fn fetch_artifact(
    http_client: &reqwest::Client,
    result: &GenerationResult,
    label: &str,
    timestamp_ms: i64,
) -> AppResult<DownloadArtifact> {
    let bytes = if result.image_url.starts_with("data:") {
        parse_data_url(result.image_url.trim())?.bytes
    } else {
        let response = http_client.get(&result.image_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transport { status, body });
        }
        response.bytes().await?.to_vec()
    };

    Ok(DownloadArtifact {
        file_name: download_file_name(label, timestamp_ms),
        bytes,
    })
}

pub fn write_artifact(dir: &Path, artifact: &DownloadArtifact) -> AppResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&artifact.file_name);
    fs::write(&path, &artifact.bytes)?;
    Ok(path)
}
