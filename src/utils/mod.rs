pub mod errors;
pub mod format;
pub mod mime;

pub use errors::{FsError, HostError, InferenceError, PodError, PrefError};
pub use format::{format_bytes, split_extension};
pub use mime::{extension_of, guess_content_type, image_mime_type, is_image_extension};
