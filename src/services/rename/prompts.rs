/// Prompt sent along with the image bytes
pub fn image_prompt(extension: &str, max_len: usize) -> String {
    format!(
        "Create a specific, descriptive filename for this image.
Rules:
- Use 2-4 specific words describing the main subject or content
- Be specific about what's in the image (e.g. \"mountain-lake-sunset\" not just \"landscape\")
- Use hyphens between words
- No generic words like \"image\" or \"photo\"
- Keep extension \"{extension}\"
- Maximum length: {max_len} characters
Respond with ONLY the filename."
    )
}

/// Prompt built from what is known about the download, no file contents
pub fn metadata_prompt(
    is_image: bool,
    filename: &str,
    source_url: &str,
    extension: &str,
    max_len: usize,
) -> String {
    let kind = if is_image { "image" } else { "file" };
    let source_url = if source_url.is_empty() { "unknown" } else { source_url };
    format!(
        "Create a specific, descriptive filename for this {kind}.
Original filename: \"{filename}\"
Download URL: \"{source_url}\"
Rules:
- Use 2-5 specific words about the content or purpose
- Be more specific than the original name
- Use hyphens between words
- Keep extension \"{extension}\"
- Maximum length: {max_len} characters
Respond with ONLY the filename."
    )
}
