//! Conversational advisory: prompt assembly, request parsing and the
//! provider-to-browser stream translation.

pub mod message;
pub mod prompt;
pub mod stream;

pub use message::{ChatRequest, Role, UiMessage};
pub use prompt::{build_system_prompt, FarmerContext};
pub use stream::{ui_message_stream, UiStreamPart};
