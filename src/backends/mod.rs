pub mod local;
pub mod memory;
pub mod mistral;
pub mod traits;

// Re-export commonly used types
pub use local::{DirectoryHost, LocalFileSystem};
pub use memory::{HostAction, MemoryFileSystem, MemoryHost};
pub use mistral::MistralClient;
pub use traits::{
    DownloadHost, FileSystem, HostEvent, ImagePayload, InferenceApi, InferenceRequest,
};
