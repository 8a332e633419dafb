mod download;
mod identifiers;
mod pod;
mod preview;

pub use download::{DownloadRecord, DownloadState};
pub use identifiers::{HostId, PodKey};
pub use pod::{LifecyclePhase, PodSnapshot, PodState, PodTarget, RenameStatus};
pub use preview::{IconKind, Preview};
