//! Gemini client and conversation flows against a local stub of the API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ayuda_core::ai::error::{CHAT_CONNECTION, CHAT_NOT_CONFIGURED, TRANSLATE_CONNECTION, TRANSLATE_NOT_CONFIGURED};
use ayuda_core::audio::AudioSlot;
use ayuda_core::{
    ActionResult, AssistantError, ClientSettings, Conversation, GeminiClient, Message,
};

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    body: Arc<String>,
    hits: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<(String, Value)>>>,
}

async fn respond(State(stub): State<Stub>, uri: Uri, body: String) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    let parsed = serde_json::from_str(&body).unwrap_or(Value::Null);
    *stub.last_request.lock().unwrap() = Some((uri.to_string(), parsed));
    (
        stub.status,
        [(header::CONTENT_TYPE, "application/json")],
        stub.body.as_ref().clone(),
    )
}

/// Serve `body` with `status` for every request; returns the base URL and the stub
async fn start_stub(status: StatusCode, body: Value) -> (String, Stub) {
    start_raw_stub(status, &body.to_string()).await
}

async fn start_raw_stub(status: StatusCode, body: &str) -> (String, Stub) {
    let stub = Stub {
        status,
        body: Arc::new(body.to_string()),
        hits: Arc::new(AtomicUsize::new(0)),
        last_request: Arc::new(Mutex::new(None)),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(respond).with_state(stub.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v1beta", addr), stub)
}

fn client(base_url: &str, key: Option<&str>) -> GeminiClient {
    GeminiClient::new(
        ClientSettings {
            base_url: base_url.to_string(),
            ..ClientSettings::default()
        },
        Arc::new(key.map(str::to_string)),
    )
}

fn text_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

#[tokio::test]
async fn test_chat_returns_first_candidate_text() {
    let (url, stub) = start_stub(StatusCode::OK, text_reply("Mantén la calma")).await;
    let client = client(&url, Some("AIzaTest123"));

    let history = [Message::model("Hola"), Message::user("Hay humo")];
    let reply = client.send_chat("¿Qué hago?", &history).await;

    assert_eq!(reply.unwrap(), "Mantén la calma");
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);

    let (uri, body) = stub.last_request.lock().unwrap().clone().unwrap();
    assert!(uri.starts_with("/v1beta/models/gemini-2.5-flash-preview-09-2025:generateContent"));
    assert!(uri.contains("key=AIzaTest123"));
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 4);
    assert_eq!(contents[3]["parts"][0]["text"], "¿Qué hago?");
}

#[tokio::test]
async fn test_image_returns_data_uri() {
    let (url, stub) = start_stub(
        StatusCode::OK,
        json!({ "predictions": [{ "bytesBase64Encoded": "QUJD" }] }),
    )
    .await;
    let client = client(&url, Some("AIzaTest123"));

    let uri = client.generate_image("### Venda la **herida**").await.unwrap();
    assert_eq!(uri, "data:image/png;base64,QUJD");

    let (path, body) = stub.last_request.lock().unwrap().clone().unwrap();
    assert!(path.contains("imagen-4.0-generate-001:predict"));
    let prompt = body["instances"][0]["prompt"].as_str().unwrap();
    assert!(prompt.contains(" Venda la herida"));
    assert!(!prompt.contains('*'));
    assert_eq!(body["parameters"]["sampleCount"], 1);
}

#[tokio::test]
async fn test_speech_returns_inline_audio() {
    let (url, stub) = start_stub(
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [{
            "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AAAB" }
        }] } }] }),
    )
    .await;
    let client = client(&url, Some("AIzaTest123"));

    let clip = client.generate_speech("**Llama al 122**").await.unwrap();
    assert_eq!(clip.data, "AAAB");
    assert_eq!(clip.mime_type.as_deref(), Some("audio/L16;codec=pcm;rate=24000"));

    let (_, body) = stub.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(
        body["contents"][0]["parts"][0]["text"],
        "Say calmly and supportively in Spanish: Llama al 122"
    );
    assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
}

#[tokio::test]
async fn test_missing_key_sends_nothing() {
    let (url, stub) = start_stub(StatusCode::OK, text_reply("no debería llegar")).await;
    let client = client(&url, None);

    assert_eq!(
        client.send_chat("hola", &[]).await.unwrap_err(),
        AssistantError::NotConfigured
    );
    assert_eq!(
        client.translate("hola", "K'iche'").await.unwrap_err().translate_reply(),
        TRANSLATE_NOT_CONFIGURED
    );
    assert!(client.generate_image("hola").await.is_err());
    assert!(client.generate_speech("hola").await.is_err());

    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_service_error_message_reaches_chat_reply() {
    let (url, _stub) = start_stub(
        StatusCode::BAD_REQUEST,
        json!({ "error": { "code": 400, "message": "API key not valid" } }),
    )
    .await;
    let client = client(&url, Some("bad"));

    let err = client.send_chat("hola", &[]).await.unwrap_err();
    assert_eq!(err.chat_reply(), "⚠️ Error de API: API key not valid");
}

#[tokio::test]
async fn test_server_error_without_body() {
    let (url, stub) = start_stub(StatusCode::INTERNAL_SERVER_ERROR, Value::Null).await;
    let client = client(&url, Some("AIzaTest123"));

    let err = client.generate_image("hola").await.unwrap_err();
    assert!(matches!(err, AssistantError::Malformed(_)));
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gateway_html_maps_to_connection_text() {
    let (url, stub) = start_raw_stub(StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>").await;
    let client = client(&url, Some("AIzaTest123"));

    let chat = client.send_chat("hola", &[]).await.unwrap_err();
    assert!(matches!(chat, AssistantError::Malformed(_)));
    assert_eq!(chat.chat_reply(), CHAT_CONNECTION);

    let translate = client.translate("hola", "Q'eqchi'").await.unwrap_err();
    assert_eq!(translate.translate_reply(), TRANSLATE_CONNECTION);
    assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_error_status_without_error_object_is_empty() {
    let (url, _stub) = start_stub(StatusCode::SERVICE_UNAVAILABLE, json!({})).await;
    let client = client(&url, Some("AIzaTest123"));

    let err = client.send_chat("hola", &[]).await.unwrap_err();
    assert_eq!(err, AssistantError::EmptyResponse);
}

#[tokio::test]
async fn test_fire_question_with_empty_history() {
    let (url, stub) = start_stub(StatusCode::OK, text_reply("Mantén la calma")).await;
    let client = client(&url, Some("AIzaTest123"));

    let reply = client.send_chat("¿Qué hago en un incendio?", &[]).await.unwrap();
    assert_eq!(reply, "Mantén la calma");

    let (_, body) = stub.last_request.lock().unwrap().clone().unwrap();
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0]["role"], "user");
    assert!(contents[0]["parts"][0]["text"].as_str().unwrap().contains("REGLAS DE FORMATO"));
    assert_eq!(contents[1]["parts"][0]["text"], "¿Qué hago en un incendio?");
}

#[tokio::test]
async fn test_unreachable_host_maps_to_connection_text() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{}/v1beta", addr), Some("AIzaTest123"));

    let chat = client.send_chat("hola", &[]).await.unwrap_err();
    assert!(matches!(chat, AssistantError::Transport(_)));
    assert_eq!(chat.chat_reply(), CHAT_CONNECTION);
    // The key must not leak through the error text
    assert!(!chat.to_string().contains("AIzaTest123"));

    let translate = client.translate("hola", "K'iche'").await.unwrap_err();
    assert_eq!(translate.translate_reply(), TRANSLATE_CONNECTION);
}

#[tokio::test]
async fn test_conversation_send_end_to_end() {
    let (url, stub) = start_stub(StatusCode::OK, text_reply("Llama al **122**")).await;
    let client = client(&url, Some("AIzaTest123"));
    let mut convo = Conversation::new();

    let reply = convo.send(&client, "Hay un incendio").await.unwrap();
    assert_eq!(reply.text, "Llama al **122**");
    assert_eq!(convo.len(), 3);
    assert!(!convo.is_busy());

    // History sent was the greeting only, followed by the prompt
    let (_, body) = stub.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(body["contents"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_conversation_without_key_shows_notice() {
    let client = client("http://127.0.0.1:9/v1beta", None);
    let mut convo = Conversation::new();

    let reply = convo.send(&client, "hola").await.unwrap();
    assert_eq!(reply.text, CHAT_NOT_CONFIGURED);
}

#[tokio::test]
async fn test_conversation_translate_and_read_aloud() {
    let (url, _stub) = start_stub(StatusCode::OK, text_reply("Chak'ama")).await;
    let client = client(&url, Some("AIzaTest123"));
    let mut convo = Conversation::new();
    convo.send(&client, "Me perdí").await.unwrap();

    let result = convo.translate_message(&client, 2, "K'iche'").await.unwrap();
    assert_eq!(result, ActionResult::Appended);
    let last = convo.messages().last().unwrap();
    assert_eq!(last.text, "### Traducción a K'iche':\nChak'ama");
    assert!(last.is_system);

    // A text-only answer carries no audio: nothing is played or appended
    let dir = tempfile::tempdir().unwrap();
    let mut audio = AudioSlot::new(dir.path(), None);
    let result = convo.read_aloud(&client, 2, &mut audio).await.unwrap();
    assert_eq!(result, ActionResult::NoResult);
    assert!(!audio.is_loaded());
    assert_eq!(convo.processing_action(), None);
}

#[tokio::test]
async fn test_conversation_visual_guide_appends_image() {
    let (url, stub) = start_stub(
        StatusCode::OK,
        json!({
            "candidates": [{ "content": { "parts": [{ "text": "Presiona la **herida**" }] } }],
            "predictions": [{ "bytesBase64Encoded": "QUJD" }]
        }),
    )
    .await;
    let client = client(&url, Some("AIzaTest123"));
    let mut convo = Conversation::new();
    convo.send(&client, "Me corté").await.unwrap();

    let result = convo.show_visual_guide(&client, 2).await.unwrap();
    assert_eq!(result, ActionResult::Appended);
    let last = convo.messages().last().unwrap();
    assert_eq!(last.image.as_deref(), Some("data:image/png;base64,QUJD"));
    assert!(last.text.starts_with("### Ayuda Visual:"));

    let (path, body) = stub.last_request.lock().unwrap().clone().unwrap();
    assert!(path.contains(":predict"));
    assert!(body["instances"][0]["prompt"].as_str().unwrap().contains("Presiona la herida"));
}
