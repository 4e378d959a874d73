pub mod ai;
pub mod audio;
pub mod config;
pub mod connectivity;
pub mod conversation;
pub mod directory;
pub mod guides;
pub mod keystore;
pub mod media;
pub mod state;
pub mod storage;

// Re-export main types for convenience
pub use ai::{AssistantError, ClientSettings, GeminiClient, Operation, SpeechClip};
pub use audio::AudioSlot;
pub use config::Config;
pub use connectivity::ConnectivityMonitor;
pub use conversation::{
    ActionOutcome, ActionResult, AuxAction, Conversation, ConversationError, QUICK_PROMPTS,
};
pub use directory::{Directory, EmergencyCategory, EmergencyServiceItem, IconType};
pub use guides::{Guide, GuideBook, Scenario};
pub use keystore::{CredentialProvider, CredentialSource, KeyStore, StoredCredentials};
pub use state::{ChatRole, Message};
pub use storage::{FileStorage, MemoryStorage, Storage};
