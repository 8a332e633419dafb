pub mod naming;
pub mod pipeline;
pub mod prompts;

pub use pipeline::{
    RenameFailure, RenameOutcome, RenamePipeline, RenameRequest, RenameStage, RenameTicket,
};
