//! Failure reasons shared by every assistant operation, and the user-facing
//! fallback text each one maps to.

/// Why a remote assistant call produced no usable result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssistantError {
    /// No API key available; no request was sent
    #[error("no API key configured")]
    NotConfigured,
    /// The request never completed (DNS, TLS, connection reset, ...)
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered with something that isn't the expected JSON
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The service answered with an error object or a non-success status
    #[error("service error ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Service { status: u16, message: Option<String> },
    /// Well-formed answer without any candidate, prediction or audio part
    #[error("response contained no result")]
    EmptyResponse,
}

pub const CHAT_NOT_CONFIGURED: &str =
    "⚠️ No hay API Key configurada. Ve a Ajustes para agregar tu clave de Gemini.";
pub const CHAT_SERVICE_DEFAULT_DETAIL: &str = "Verifica tu API Key en Ajustes.";
pub const CHAT_EMPTY: &str = "No pude procesar eso. Intenta de nuevo.";
pub const CHAT_CONNECTION: &str = "Lo siento, hubo un error de conexión. Verifica tu internet.";

pub const TRANSLATE_NOT_CONFIGURED: &str = "⚠️ API Key no configurada.";
pub const TRANSLATE_FAILED: &str = "No se pudo traducir.";
pub const TRANSLATE_CONNECTION: &str = "Error al traducir.";

impl AssistantError {
    /// Text shown as the assistant's reply when a chat request fails.
    ///
    /// Only this flow surfaces the service's own error message.
    pub fn chat_reply(&self) -> String {
        match self {
            AssistantError::NotConfigured => CHAT_NOT_CONFIGURED.to_string(),
            AssistantError::Service { message, .. } => format!(
                "⚠️ Error de API: {}",
                message
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .unwrap_or(CHAT_SERVICE_DEFAULT_DETAIL)
            ),
            AssistantError::EmptyResponse => CHAT_EMPTY.to_string(),
            AssistantError::Transport(_) | AssistantError::Malformed(_) => {
                CHAT_CONNECTION.to_string()
            }
        }
    }

    /// Text shown in place of a translation when the request fails
    pub fn translate_reply(&self) -> String {
        match self {
            AssistantError::NotConfigured => TRANSLATE_NOT_CONFIGURED,
            AssistantError::Service { .. } | AssistantError::EmptyResponse => TRANSLATE_FAILED,
            AssistantError::Transport(_) | AssistantError::Malformed(_) => TRANSLATE_CONNECTION,
        }
        .to_string()
    }
}

/// Collapse an operation result into display text
pub trait ReplyExt {
    fn or_chat_reply(self) -> String;
    fn or_translate_reply(self) -> String;
}

impl ReplyExt for Result<String, AssistantError> {
    fn or_chat_reply(self) -> String {
        self.unwrap_or_else(|e| e.chat_reply())
    }

    fn or_translate_reply(self) -> String {
        self.unwrap_or_else(|e| e.translate_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_reply_embeds_service_message() {
        let err = AssistantError::Service {
            status: 400,
            message: Some("API key not valid. Please pass a valid API key.".to_string()),
        };
        assert_eq!(
            err.chat_reply(),
            "⚠️ Error de API: API key not valid. Please pass a valid API key."
        );
    }

    #[test]
    fn test_chat_reply_service_without_message_uses_hint() {
        let err = AssistantError::Service {
            status: 500,
            message: None,
        };
        assert_eq!(err.chat_reply(), "⚠️ Error de API: Verifica tu API Key en Ajustes.");
    }

    #[test]
    fn test_chat_reply_sentinels() {
        assert_eq!(AssistantError::NotConfigured.chat_reply(), CHAT_NOT_CONFIGURED);
        assert_eq!(AssistantError::EmptyResponse.chat_reply(), CHAT_EMPTY);
        assert_eq!(
            AssistantError::Transport("reset".to_string()).chat_reply(),
            CHAT_CONNECTION
        );
        assert_eq!(
            AssistantError::Malformed("eof".to_string()).chat_reply(),
            CHAT_CONNECTION
        );
    }

    #[test]
    fn test_translate_reply_never_leaks_service_text() {
        let err = AssistantError::Service {
            status: 403,
            message: Some("secret detail".to_string()),
        };
        assert_eq!(err.translate_reply(), TRANSLATE_FAILED);
        assert_eq!(AssistantError::NotConfigured.translate_reply(), TRANSLATE_NOT_CONFIGURED);
        assert_eq!(
            AssistantError::Transport("timeout".to_string()).translate_reply(),
            TRANSLATE_CONNECTION
        );
    }

    #[test]
    fn test_reply_ext_passes_success_through() {
        let ok: Result<String, AssistantError> = Ok("Mantén la calma".to_string());
        assert_eq!(ok.or_chat_reply(), "Mantén la calma");

        let err: Result<String, AssistantError> = Err(AssistantError::EmptyResponse);
        assert_eq!(err.or_translate_reply(), TRANSLATE_FAILED);
    }

    #[test]
    fn test_display() {
        let err = AssistantError::Service {
            status: 429,
            message: None,
        };
        assert_eq!(err.to_string(), "service error (429): no details");
        assert_eq!(AssistantError::NotConfigured.to_string(), "no API key configured");
    }
}
