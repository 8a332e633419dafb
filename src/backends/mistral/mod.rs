mod client;
mod types;


pub use client::MistralClient;
pub use types::{ChatMessage, ChatRequest, ChatResponse, ContentPart, MessageContent};
