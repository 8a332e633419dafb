// Download pods, file previews and AI renaming of finished downloads.
// The binary in src/main.rs drives the same session and pipeline.

pub mod backends;
pub mod config;
pub mod constants;
pub mod events;
pub mod models;
pub mod prefs;
pub mod services;
pub mod utils;
pub mod workers;

#[cfg(test)]
mod test_utils;

pub use config::Settings;
pub use services::{Session, SessionInput, SessionSnapshot};
pub use workers::{SessionHandle, SessionWorker};
