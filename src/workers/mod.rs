pub mod session_worker;

pub use session_worker::{SessionHandle, SessionWorker};
