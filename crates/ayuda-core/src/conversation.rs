//! Assistant transcript and the request bookkeeping around it.
//!
//! A send or an auxiliary action is split into `begin_*`, which claims the slot
//! and returns a ticket, and `finish_*`, which records the result. The ticket
//! carries the conversation generation; results for an older generation (the
//! user started a new conversation meanwhile) are dropped.

use crate::ai::{AssistantError, GeminiClient, ReplyExt, SpeechClip};
use crate::audio::AudioSlot;
use crate::state::{ChatRole, Message};

pub const GREETING: &str = "¡Hola! Soy tu asistente de Ayuda Niños GT. 🇬🇹\n\n¿En qué puedo ayudarte hoy? Estoy aquí para darte información sobre emergencias, salud y seguridad.";

pub const VISUAL_GUIDE_TEXT: &str = "### Ayuda Visual:\nAquí tienes una imagen para guiarte:";

/// Canned questions offered on an empty conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickPrompt {
    pub label: &'static str,
    pub text: &'static str,
}

pub const QUICK_PROMPTS: [QuickPrompt; 3] = [
    QuickPrompt {
        label: "🩹 Heridas",
        text: "Primeros auxilios básicos",
    },
    QuickPrompt {
        label: "📞 Emergencias",
        text: "Números de emergencia en Guatemala",
    },
    QuickPrompt {
        label: "🔥 Quemaduras",
        text: "¿Cómo tratar una quemadura?",
    },
];

/// Follow-up actions available on an assistant reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxAction {
    ReadAloud,
    Translate,
    VisualGuide,
}

impl AuxAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuxAction::ReadAloud => "tts",
            AuxAction::Translate => "translate",
            AuxAction::VisualGuide => "image",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuxAction::ReadAloud => "Escuchar",
            AuxAction::Translate => "Traducir",
            AuxAction::VisualGuide => "Ver Guía",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("a message is already being sent")]
    Busy,
    #[error("action `{}` is already in progress", .0.as_str())]
    ActionInProgress(AuxAction),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("no message at index {0}")]
    NoSuchMessage(usize),
    #[error("message {0} does not offer actions")]
    NotActionable(usize),
    #[error("conversation was reset while the request was in flight")]
    Stale,
}

/// Claim on the send slot
#[derive(Debug)]
#[must_use = "a send ticket must be finished or the conversation stays busy"]
pub struct SendTicket {
    generation: u64,
    prompt: String,
    history: Vec<Message>,
}

impl SendTicket {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Transcript as it was before the prompt was appended
    pub fn history(&self) -> &[Message] {
        &self.history
    }
}

/// Claim on the auxiliary action slot
#[derive(Debug)]
#[must_use = "an action ticket must be finished or the action slot stays taken"]
pub struct ActionTicket {
    generation: u64,
    action: AuxAction,
    text: String,
}

impl ActionTicket {
    pub fn action(&self) -> AuxAction {
        self.action
    }

    /// Text of the message the action was started on
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Raw result of an auxiliary remote call
#[derive(Debug)]
pub enum ActionOutcome {
    Translated {
        language: String,
        result: Result<String, AssistantError>,
    },
    Image(Result<String, AssistantError>),
    Speech(Result<SpeechClip, AssistantError>),
}

/// What finishing an action did to the conversation
#[derive(Debug, PartialEq, Eq)]
pub enum ActionResult {
    /// A new message was appended
    Appended,
    /// Audio is ready; nothing was appended
    Play(SpeechClip),
    /// The call failed quietly; nothing to show
    NoResult,
    /// The conversation was reset before the result arrived
    Stale,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    busy: bool,
    action: Option<AuxAction>,
    generation: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// A conversation opened by the assistant's greeting
    pub fn new() -> Self {
        Self {
            messages: vec![Message::model(GREETING)],
            busy: false,
            action: None,
            generation: 0,
        }
    }

    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            ..Self::new()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// True from `begin_send` until the matching `finish_send`
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn processing_action(&self) -> Option<AuxAction> {
        self.action
    }

    /// Nothing has been asked yet
    pub fn is_fresh(&self) -> bool {
        !self.messages.iter().any(|m| m.role == ChatRole::User)
    }

    pub fn append(&mut self, message: Message) -> &[Message] {
        self.messages.push(message);
        &self.messages
    }

    /// Follow-up actions are offered on assistant replies, except the greeting
    /// and derived system entries
    pub fn can_act_on(&self, index: usize) -> bool {
        index > 0
            && self
                .messages
                .get(index)
                .is_some_and(|m| m.role == ChatRole::Model && !m.is_system)
    }

    /// Start over. In-flight requests from before the reset are ignored when they finish.
    pub fn reset(&mut self) {
        self.messages = vec![Message::model(GREETING)];
        self.busy = false;
        self.action = None;
        self.generation += 1;
        tracing::debug!(generation = self.generation, "conversation reset");
    }

    pub fn begin_send(&mut self, text: &str) -> Result<SendTicket, ConversationError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }
        if self.busy {
            return Err(ConversationError::Busy);
        }

        let history = self.messages.clone();
        self.messages.push(Message::user(prompt));
        self.busy = true;

        Ok(SendTicket {
            generation: self.generation,
            prompt: prompt.to_string(),
            history,
        })
    }

    /// Record the reply (or its fallback text). Returns `None` for a stale ticket.
    pub fn finish_send(
        &mut self,
        ticket: SendTicket,
        reply: Result<String, AssistantError>,
    ) -> Option<&Message> {
        if ticket.generation != self.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "dropping stale chat reply"
            );
            return None;
        }

        if let Err(e) = &reply {
            tracing::warn!(error = %e, "chat request failed");
        }
        self.messages.push(Message::model(reply.or_chat_reply()));
        self.busy = false;
        self.messages.last()
    }

    pub fn begin_action(
        &mut self,
        action: AuxAction,
        index: usize,
    ) -> Result<ActionTicket, ConversationError> {
        if let Some(current) = self.action {
            return Err(ConversationError::ActionInProgress(current));
        }
        let message = self
            .messages
            .get(index)
            .ok_or(ConversationError::NoSuchMessage(index))?;
        if !self.can_act_on(index) {
            return Err(ConversationError::NotActionable(index));
        }

        let text = message.text.clone();
        self.action = Some(action);
        Ok(ActionTicket {
            generation: self.generation,
            action,
            text,
        })
    }

    pub fn finish_action(&mut self, ticket: ActionTicket, outcome: ActionOutcome) -> ActionResult {
        if ticket.generation != self.generation {
            tracing::debug!(action = ticket.action.as_str(), "dropping stale action result");
            return ActionResult::Stale;
        }
        self.action = None;

        match outcome {
            ActionOutcome::Translated { language, result } => {
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "translation failed");
                }
                self.messages.push(Message::system(format!(
                    "### Traducción a {}:\n{}",
                    language,
                    result.or_translate_reply()
                )));
                ActionResult::Appended
            }
            ActionOutcome::Image(Ok(uri)) => {
                self.messages
                    .push(Message::model(VISUAL_GUIDE_TEXT).with_image(uri));
                ActionResult::Appended
            }
            ActionOutcome::Speech(Ok(clip)) => ActionResult::Play(clip),
            ActionOutcome::Image(Err(e)) | ActionOutcome::Speech(Err(e)) => {
                tracing::warn!(action = ticket.action.as_str(), error = %e, "action produced no result");
                ActionResult::NoResult
            }
        }
    }

    /// Append `text`, ask the assistant and append its reply
    pub async fn send(
        &mut self,
        client: &GeminiClient,
        text: &str,
    ) -> Result<Message, ConversationError> {
        let ticket = self.begin_send(text)?;
        let reply = client.send_chat(ticket.prompt(), ticket.history()).await;
        self.finish_send(ticket, reply)
            .cloned()
            .ok_or(ConversationError::Stale)
    }

    /// Translate message `index` and append the translation
    pub async fn translate_message(
        &mut self,
        client: &GeminiClient,
        index: usize,
        language: &str,
    ) -> Result<ActionResult, ConversationError> {
        let ticket = self.begin_action(AuxAction::Translate, index)?;
        let result = client.translate(ticket.text(), language).await;
        Ok(self.finish_action(
            ticket,
            ActionOutcome::Translated {
                language: language.to_string(),
                result,
            },
        ))
    }

    /// Generate an illustration for message `index` and append it
    pub async fn show_visual_guide(
        &mut self,
        client: &GeminiClient,
        index: usize,
    ) -> Result<ActionResult, ConversationError> {
        let ticket = self.begin_action(AuxAction::VisualGuide, index)?;
        let result = client.generate_image(ticket.text()).await;
        Ok(self.finish_action(ticket, ActionOutcome::Image(result)))
    }

    /// Speak message `index` through the shared audio slot
    pub async fn read_aloud(
        &mut self,
        client: &GeminiClient,
        index: usize,
        audio: &mut AudioSlot,
    ) -> Result<ActionResult, ConversationError> {
        let ticket = self.begin_action(AuxAction::ReadAloud, index)?;
        let result = client.generate_speech(ticket.text()).await;
        let outcome = self.finish_action(ticket, ActionOutcome::Speech(result));
        if let ActionResult::Play(clip) = &outcome {
            if let Err(e) = audio.play(clip) {
                tracing::error!(error = %e, "speech playback failed");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answered() -> Conversation {
        let mut convo = Conversation::new();
        let ticket = convo.begin_send("¿Qué hago en un incendio?").unwrap();
        convo.finish_send(ticket, Ok("Mantén la calma".to_string()));
        convo
    }

    #[test]
    fn test_append_preserves_order_and_length() {
        let mut convo = Conversation::empty();
        for i in 0..25 {
            let message = if i % 2 == 0 {
                Message::user(format!("u{}", i))
            } else {
                Message::model(format!("m{}", i))
            };
            assert_eq!(convo.append(message).len(), i + 1);
        }
        let texts: Vec<&str> = convo.messages().iter().map(|m| &m.text[1..]).collect();
        let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_starts_with_greeting() {
        let convo = Conversation::new();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo.messages()[0].role, ChatRole::Model);
        assert!(convo.is_fresh());
        assert!(!convo.can_act_on(0));
    }

    #[test]
    fn test_send_flow_sets_and_clears_busy() {
        let mut convo = Conversation::new();
        let ticket = convo.begin_send("  hola  ").unwrap();

        assert!(convo.is_busy());
        assert_eq!(ticket.prompt(), "hola");
        assert_eq!(ticket.history().len(), 1);
        assert_eq!(convo.messages().last().unwrap(), &Message::user("hola"));

        let reply = convo.finish_send(ticket, Ok("¿En qué te ayudo?".to_string())).unwrap();
        assert_eq!(reply, &Message::model("¿En qué te ayudo?"));
        assert!(!convo.is_busy());
        assert_eq!(convo.len(), 3);
    }

    #[test]
    fn test_concurrent_send_is_rejected() {
        let mut convo = Conversation::new();
        let ticket = convo.begin_send("uno").unwrap();

        assert_eq!(convo.begin_send("dos").unwrap_err(), ConversationError::Busy);
        assert_eq!(convo.len(), 2);

        convo.finish_send(ticket, Ok("ok".to_string()));
        assert!(convo.begin_send("dos").is_ok());
    }

    #[test]
    fn test_empty_message_rejected() {
        let mut convo = Conversation::new();
        assert_eq!(convo.begin_send("   ").unwrap_err(), ConversationError::EmptyMessage);
        assert!(!convo.is_busy());
    }

    #[test]
    fn test_failed_send_appends_fallback() {
        let mut convo = Conversation::new();
        let ticket = convo.begin_send("hola").unwrap();
        let reply = convo
            .finish_send(ticket, Err(AssistantError::NotConfigured))
            .unwrap();
        assert_eq!(reply.text, crate::ai::error::CHAT_NOT_CONFIGURED);
        assert!(!convo.is_busy());
    }

    #[test]
    fn test_reply_after_reset_is_dropped() {
        let mut convo = Conversation::new();
        let ticket = convo.begin_send("hola").unwrap();
        convo.reset();

        assert!(convo.finish_send(ticket, Ok("tarde".to_string())).is_none());
        assert_eq!(convo.len(), 1);
        assert!(!convo.is_busy());
    }

    #[test]
    fn test_stale_reply_does_not_release_new_send() {
        let mut convo = Conversation::new();
        let old = convo.begin_send("viejo").unwrap();
        convo.reset();
        let _new = convo.begin_send("nuevo").unwrap();

        assert!(convo.finish_send(old, Ok("tarde".to_string())).is_none());
        assert!(convo.is_busy());
    }

    #[test]
    fn test_actions_only_on_replies() {
        let mut convo = answered();
        assert!(!convo.can_act_on(1));
        assert!(convo.can_act_on(2));
        assert_eq!(
            convo.begin_action(AuxAction::Translate, 1).unwrap_err(),
            ConversationError::NotActionable(1)
        );
        assert_eq!(
            convo.begin_action(AuxAction::Translate, 9).unwrap_err(),
            ConversationError::NoSuchMessage(9)
        );
        assert_eq!(convo.processing_action(), None);
    }

    #[test]
    fn test_one_action_at_a_time() {
        let mut convo = answered();
        let ticket = convo.begin_action(AuxAction::ReadAloud, 2).unwrap();
        assert_eq!(convo.processing_action(), Some(AuxAction::ReadAloud));
        assert_eq!(
            convo.begin_action(AuxAction::VisualGuide, 2).unwrap_err(),
            ConversationError::ActionInProgress(AuxAction::ReadAloud)
        );

        let clip = SpeechClip {
            data: "QUJD".to_string(),
            mime_type: None,
        };
        let result = convo.finish_action(ticket, ActionOutcome::Speech(Ok(clip.clone())));
        assert_eq!(result, ActionResult::Play(clip));
        assert_eq!(convo.processing_action(), None);
        assert_eq!(convo.len(), 3);
    }

    #[test]
    fn test_translation_appends_system_message() {
        let mut convo = answered();
        let ticket = convo.begin_action(AuxAction::Translate, 2).unwrap();
        assert_eq!(ticket.text(), "Mantén la calma");

        let result = convo.finish_action(
            ticket,
            ActionOutcome::Translated {
                language: "K'iche'".to_string(),
                result: Ok("Chak'ama".to_string()),
            },
        );
        assert_eq!(result, ActionResult::Appended);

        let last = convo.messages().last().unwrap();
        assert_eq!(last.text, "### Traducción a K'iche':\nChak'ama");
        assert!(last.is_system);
        assert!(!convo.can_act_on(convo.len() - 1));
    }

    #[test]
    fn test_image_appends_on_success_only() {
        let mut convo = answered();

        let ticket = convo.begin_action(AuxAction::VisualGuide, 2).unwrap();
        let result = convo.finish_action(ticket, ActionOutcome::Image(Err(AssistantError::EmptyResponse)));
        assert_eq!(result, ActionResult::NoResult);
        assert_eq!(convo.len(), 3);

        let ticket = convo.begin_action(AuxAction::VisualGuide, 2).unwrap();
        let uri = "data:image/png;base64,QUJD".to_string();
        convo.finish_action(ticket, ActionOutcome::Image(Ok(uri.clone())));
        let last = convo.messages().last().unwrap();
        assert_eq!(last.text, VISUAL_GUIDE_TEXT);
        assert_eq!(last.image.as_deref(), Some(uri.as_str()));
        assert!(convo.can_act_on(convo.len() - 1));
    }

    #[test]
    fn test_action_after_reset_is_stale() {
        let mut convo = answered();
        let ticket = convo.begin_action(AuxAction::Translate, 2).unwrap();
        convo.reset();
        let result = convo.finish_action(
            ticket,
            ActionOutcome::Translated {
                language: "K'iche'".to_string(),
                result: Ok("x".to_string()),
            },
        );
        assert_eq!(result, ActionResult::Stale);
        assert_eq!(convo.len(), 1);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConversationError::ActionInProgress(AuxAction::VisualGuide).to_string(),
            "action `image` is already in progress"
        );
    }
}
