use crate::constants::IMAGE_EXTENSIONS;

/// Lowercased extension of a simple file name, without the dot
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = super::split_extension(name);
    ext.strip_prefix('.')
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// MIME type for an inline image payload, JPEG when unknown
pub fn image_mime_type(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        _ => "image/jpeg",
    }
}

/// Best-effort content type for files that did not come with one
pub fn guess_content_type(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    if is_image_extension(&ext) {
        return Some(image_mime_type(&ext));
    }
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "rar" => "application/x-rar-compressed",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        _ => return None,
    };
    Some(mime)
}
