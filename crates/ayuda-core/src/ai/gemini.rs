use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::AssistantError;
use super::operation::Operation;
use crate::keystore::CredentialProvider;
use crate::state::Message;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_VOICE: &str = "Aoede";

/// Instruction preamble sent as the first user turn of every chat request
const SYSTEM_PROMPT: &str = r####"Eres un asistente de Ayuda Niños GT. Tu objetivo es ayudar a niños y personas en Guatemala. 
Solo debes responder preguntas relacionadas con servicios de emergencia, ayuda, salud, seguridad o información general DENTRO de Guatemala. 
Si te preguntan algo fuera de este contexto o de otro país, declina amablemente diciendo que tu propósito es ayudar específicamente en Guatemala.
Mantén un tono calmado, empático y directo.

REGLAS DE FORMATO ESTRICTAS:
1. Usa "###" para títulos de secciones.
2. Cada elemento de una lista (1., 2., o *) DEBE ir en una LÍNEA NUEVA separada.
3. Usa negritas (**texto**) solo para palabras clave o números de teléfono.
4. NUNCA escribas una lista seguida en la misma línea (ej. NO hagas: "1. A 2. B")."####;

/// Remove the markdown markers (`*`, `#`) the chat model emits
pub fn strip_markup(text: &str) -> String {
    text.chars().filter(|c| *c != '*' && *c != '#').collect()
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn turn(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![GeminiPart { text: text.into() }],
        }
    }

    fn single(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![GeminiPart { text: text.into() }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
}

impl GenerateResponse {
    fn first_part(&self) -> Option<&ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
    }

    fn first_text(&self) -> Option<String> {
        self.first_part()
            .and_then(|p| p.text.clone())
            .filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Endpoint and model selection for [`GeminiClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub chat_model: String,
    pub speech_model: String,
    pub image_model: String,
    pub voice: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

/// Synthesized speech as returned by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechClip {
    /// Base64-encoded audio bytes
    pub data: String,
    /// e.g. `audio/L16;codec=pcm;rate=24000`
    pub mime_type: Option<String>,
}

/// Client for the Gemini chat, translation, image and speech endpoints.
///
/// Every call resolves the API key first; without one it fails with
/// [`AssistantError::NotConfigured`] and sends nothing. Calls are single shot:
/// no retries, no queueing, no client-side timeout.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    settings: ClientSettings,
    credentials: Arc<dyn CredentialProvider>,
}

impl GeminiClient {
    pub fn new(settings: ClientSettings, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http: Client::new(),
            settings,
            credentials,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.credential().is_some()
    }

    fn api_key(&self) -> Result<String, AssistantError> {
        self.credentials
            .credential()
            .ok_or(AssistantError::NotConfigured)
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.settings.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    /// POST a JSON body and decode the JSON answer.
    ///
    /// A body that fails to decode is malformed whatever the status; only a
    /// decoded `error` object makes a service error.
    async fn post<B, R>(
        &self,
        op: Operation,
        url: &str,
        api_key: &str,
        body: &B,
    ) -> Result<(u16, R), AssistantError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!(operation = op.as_str(), "sending assistant request");

        let response = self
            .http
            .post(url)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation = op.as_str(), error = %e, "assistant request failed");
                AssistantError::Transport(e.without_url().to_string())
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            tracing::error!(operation = op.as_str(), error = %e, "failed to read assistant response");
            AssistantError::Transport(e.without_url().to_string())
        })?;

        match serde_json::from_str::<R>(&text) {
            Ok(parsed) => Ok((status.as_u16(), parsed)),
            Err(e) => {
                tracing::error!(
                    operation = op.as_str(),
                    status = status.as_u16(),
                    error = %e,
                    "malformed assistant response"
                );
                Err(AssistantError::Malformed(e.to_string()))
            }
        }
    }

    fn check_service(
        op: Operation,
        status: u16,
        error: Option<ApiErrorBody>,
    ) -> Result<(), AssistantError> {
        let Some(error) = error else {
            return Ok(());
        };
        let message = error.message;
        tracing::warn!(
            operation = op.as_str(),
            status,
            message = message.as_deref().unwrap_or(""),
            "assistant service returned an error"
        );
        Err(AssistantError::Service { status, message })
    }

    /// Ask the assistant, with the prior transcript as context
    pub async fn send_chat(
        &self,
        prompt: &str,
        history: &[Message],
    ) -> Result<String, AssistantError> {
        let api_key = self.api_key()?;

        let mut contents = Vec::with_capacity(history.len() + 2);
        contents.push(GeminiContent::turn("user", SYSTEM_PROMPT));
        contents.extend(
            history
                .iter()
                .map(|m| GeminiContent::turn(m.role.as_str(), m.text.clone())),
        );
        contents.push(GeminiContent::turn("user", prompt));

        let request = GenerateRequest {
            contents,
            generation_config: None,
        };
        let url = self.endpoint(&self.settings.chat_model, "generateContent");
        let (status, mut response): (u16, GenerateResponse) =
            self.post(Operation::Chat, &url, &api_key, &request).await?;
        Self::check_service(Operation::Chat, status, response.error.take())?;

        response.first_text().ok_or(AssistantError::EmptyResponse)
    }

    /// Translate the key instructions of `text` into `language`
    pub async fn translate(&self, text: &str, language: &str) -> Result<String, AssistantError> {
        let api_key = self.api_key()?;
        let clean_text = strip_markup(text);

        let request = GenerateRequest {
            contents: vec![GeminiContent::single(format!(
                "Traduce solo las instrucciones clave de este texto al idioma {} de Guatemala. Usa formato limpio y listas: {}",
                language, clean_text
            ))],
            generation_config: None,
        };
        let url = self.endpoint(&self.settings.chat_model, "generateContent");
        let (status, mut response): (u16, GenerateResponse) =
            self.post(Operation::Translate, &url, &api_key, &request).await?;
        Self::check_service(Operation::Translate, status, response.error.take())?;

        response.first_text().ok_or(AssistantError::EmptyResponse)
    }

    /// Generate a child-friendly illustration; returns a `data:image/png;base64,` URI
    pub async fn generate_image(&self, context: &str) -> Result<String, AssistantError> {
        let api_key = self.api_key()?;
        let clean_context = strip_markup(context);

        let request = PredictRequest {
            instances: vec![PredictInstance {
                prompt: format!(
                    "Simple educational medical illustration for children: {}. Clean, safe, non-scary, white background, minimal vector style.",
                    clean_context
                ),
            }],
            parameters: PredictParameters { sample_count: 1 },
        };
        let url = self.endpoint(&self.settings.image_model, "predict");
        let (status, response): (u16, PredictResponse) =
            self.post(Operation::Image, &url, &api_key, &request).await?;
        Self::check_service(Operation::Image, status, response.error)?;

        response
            .predictions
            .into_iter()
            .next()
            .and_then(|p| p.bytes_base64_encoded)
            .filter(|b| !b.is_empty())
            .map(|b| format!("data:image/png;base64,{}", b))
            .ok_or(AssistantError::EmptyResponse)
    }

    /// Synthesize `text` as calm Spanish speech with the configured voice
    pub async fn generate_speech(&self, text: &str) -> Result<SpeechClip, AssistantError> {
        let api_key = self.api_key()?;
        let clean_text = strip_markup(text);

        let request = GenerateRequest {
            contents: vec![GeminiContent::single(format!(
                "Say calmly and supportively in Spanish: {}",
                clean_text
            ))],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.settings.voice.clone(),
                        },
                    },
                },
            }),
        };
        let url = self.endpoint(&self.settings.speech_model, "generateContent");
        let (status, mut response): (u16, GenerateResponse) =
            self.post(Operation::Speech, &url, &api_key, &request).await?;
        Self::check_service(Operation::Speech, status, response.error.take())?;

        response
            .first_part()
            .and_then(|p| p.inline_data.as_ref())
            .and_then(|d| {
                d.data.as_ref().filter(|data| !data.is_empty()).map(|data| SpeechClip {
                    data: data.clone(),
                    mime_type: d.mime_type.clone(),
                })
            })
            .ok_or(AssistantError::EmptyResponse)
    }
}
