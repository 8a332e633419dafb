// Layout and animation constants - the rendering layer relies on the same values

// === Pod stack ===
/// Width of one collapsed pod
pub const POD_WIDTH: f32 = 56.0;
/// How much a pile pod overlaps the one in front of it
pub const POD_OVERLAP: f32 = 40.0;
/// Distance a pod travels when it slides in or out of the stack
pub const POD_SLIDE_DISTANCE: f32 = 80.0;

// === Animation timing ===
/// Detail panel fade-out before its pod is removed
pub const DETAIL_FADE_MS: u64 = 150;
/// Pod slide-out when it leaves the stack
pub const POD_EXIT_MS: u64 = 300;
/// Regular move/enter duration inside the stack
pub const POD_MOVE_MS: u64 = 250;

// === Renaming ===
/// `name-1.ext` .. `name-99.ext`
pub const MAX_COLLISION_ATTEMPTS: u32 = 99;
/// Characters the host filesystem refuses in a simple file name
pub const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
pub const INFERENCE_MAX_TOKENS: u32 = 100;
pub const INFERENCE_TEMPERATURE: f32 = 0.2;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "avif", "ico", "tif", "tiff", "jfif",
];

// === Previews ===
pub const TEXT_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "application/javascript",
    "text/javascript",
    "text/css",
    "text/html",
    "application/json",
    "application/xml",
    "text/xml",
];
pub const SNIPPET_MAX_LINES: usize = 5;
pub const SNIPPET_MAX_LINE_CHARS: usize = 80;
/// Text files above this size are not read for a snippet
pub const SNIPPET_MAX_FILE_BYTES: u64 = 1024 * 1024;

// === Event bus ===
pub const EVENT_BUS_CAPACITY: usize = 256;
