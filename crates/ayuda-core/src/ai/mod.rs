pub mod error;
pub mod gemini;
pub mod operation;

pub use error::{AssistantError, ReplyExt};
pub use gemini::{strip_markup, ClientSettings, GeminiClient, SpeechClip};
pub use operation::Operation;
