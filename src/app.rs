use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

use ayuda_core::ai::AssistantError;
use ayuda_core::conversation::{ActionOutcome, ActionResult, ActionTicket, SendTicket};
use ayuda_core::keystore::mask_key;
use ayuda_core::{
    media, AudioSlot, AuxAction, Config, Conversation, CredentialSource, Directory,
    EmergencyCategory, EmergencyServiceItem, FileStorage, GeminiClient, Guide, GuideBook,
    KeyStore, Scenario, Storage, StoredCredentials,
};

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Inicio,
    Explorar,
    Asistente,
    Ajustes,
}

impl Screen {
    pub fn all() -> [Screen; 4] {
        [Screen::Inicio, Screen::Explorar, Screen::Asistente, Screen::Ajustes]
    }

    pub fn title(&self) -> &'static str {
        match self {
            Screen::Inicio => "Inicio",
            Screen::Explorar => "Explorar",
            Screen::Asistente => "Asistente",
            Screen::Ajustes => "Ajustes",
        }
    }

    pub fn next(&self) -> Screen {
        match self {
            Screen::Inicio => Screen::Explorar,
            Screen::Explorar => Screen::Asistente,
            Screen::Asistente => Screen::Ajustes,
            Screen::Ajustes => Screen::Inicio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Modal dialogs, drawn over the current screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popup {
    Dial { name: String, phone: String },
    Guide(Guide),
    Notice { title: String, body: String },
    ApiKeyInput,
    ConfirmRemoveKey,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub popup: Option<Popup>,
    pub status: Option<String>,
    pub connected: bool,

    // Inicio
    pub home_state: ListState,

    // Explorar
    pub explore_search: String,
    pub explore_state: ListState,

    // Asistente
    pub conversation: Conversation,
    pub chat_input: String,
    pub chat_cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub selected_message: Option<usize>,
    pub animation_frame: u8,

    // Ajustes
    pub show_key: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,

    // Panel areas for mouse hit-testing (updated during render)
    pub list_area: Option<Rect>,
    pub chat_area: Option<Rect>,

    // Data and services
    pub config: Config,
    pub directory: Directory,
    pub guides: GuideBook,
    pub storage: Arc<dyn Storage>,
    pub credentials: Arc<StoredCredentials>,
    pub client: GeminiClient,
    pub audio: AudioSlot,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub async fn new(config: Config, events: UnboundedSender<AppEvent>) -> Result<Self> {
        let directory = match &config.directory_path {
            Some(path) => Directory::load_from_json(path).await?,
            None => Directory::builtin(),
        };
        let guides = match &config.guides_path {
            Some(path) => GuideBook::load_from_json(path).await?,
            None => GuideBook::builtin(),
        };

        let storage: Arc<dyn Storage> = Arc::new(FileStorage::default_location()?);
        let credentials = Arc::new(StoredCredentials::new(KeyStore::new(storage.clone())));
        let client = GeminiClient::new(config.client_settings(), credentials.clone());

        Ok(Self::with_services(config, directory, guides, storage, credentials, client, events))
    }

    /// Assemble an app from already-built services
    pub fn with_services(
        config: Config,
        directory: Directory,
        guides: GuideBook,
        storage: Arc<dyn Storage>,
        credentials: Arc<StoredCredentials>,
        client: GeminiClient,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        if !GuideBook::offline_copy_present(storage.as_ref()) {
            if let Err(e) = guides.store_offline(storage.as_ref()) {
                tracing::warn!(error = %e, "could not store guides for offline use");
            }
        }

        let player = config.audio_player.clone().or_else(AudioSlot::detect_player);
        if player.is_none() {
            tracing::warn!("no audio player found, speech will be saved but not played");
        }
        let audio = AudioSlot::new(Config::get_cache_dir(), player);

        let mut home_state = ListState::default();
        home_state.select(Some(0));
        let mut explore_state = ListState::default();
        explore_state.select(Some(0));

        Self {
            should_quit: false,
            screen: Screen::Inicio,
            input_mode: InputMode::Normal,
            popup: None,
            status: None,
            connected: true,

            home_state,

            explore_search: String::new(),
            explore_state,

            conversation: Conversation::new(),
            chat_input: String::new(),
            chat_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            selected_message: None,
            animation_frame: 0,

            show_key: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,

            list_area: None,
            chat_area: None,

            config,
            directory,
            guides,
            storage,
            credentials,
            client,
            audio,
            events,
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    fn notice(&mut self, title: &str, body: impl Into<String>) {
        self.popup = Some(Popup::Notice {
            title: title.to_string(),
            body: body.into(),
        });
    }

    // ---------------------------------------------------------------------
    // Inicio
    // ---------------------------------------------------------------------

    /// Home entries in display order, with the category each belongs to
    pub fn home_items(&self) -> Vec<(&EmergencyCategory, &EmergencyServiceItem)> {
        self.directory
            .home_categories()
            .iter()
            .flat_map(|c| c.items.iter().map(move |i| (c, i)))
            .collect()
    }

    pub fn home_nav(&mut self, delta: isize) {
        let len = self.home_items().len();
        move_selection(&mut self.home_state, len, delta);
    }

    /// Dial prompt for a phone entry, guide popup for a scenario entry
    pub fn activate_home_item(&mut self) {
        let Some(i) = self.home_state.selected() else { return };
        let Some((_, item)) = self.home_items().get(i).copied() else { return };
        let item = item.clone();

        if let Some(phone) = item.phone {
            self.popup = Some(Popup::Dial {
                name: item.name,
                phone,
            });
        } else if let Some(id) = item.scenario.as_deref() {
            self.open_guide(id);
        }
    }

    pub fn open_guide(&mut self, id: &str) {
        let guide = Scenario::from_id(id)
            .and_then(|s| self.guides.load_offline(self.storage.as_ref(), s));
        match guide {
            Some(guide) => self.popup = Some(Popup::Guide(guide)),
            None => {
                tracing::warn!(scenario = id, "unknown scenario guide");
                self.notice(
                    "Información no disponible",
                    "No se pudo cargar la guía de emergencia. Por favor, intenta más tarde.",
                );
            }
        }
    }

    /// Hand a `tel:` URI to the platform opener
    pub fn dial(&mut self, phone: &str) {
        match open_external(&tel_uri(phone)) {
            Ok(()) => {
                tracing::info!(phone, "dialing");
                self.set_status(format!("Llamando al {}...", phone));
                self.popup = None;
            }
            Err(e) => {
                tracing::warn!(phone, error = %e, "could not open dialer");
                self.notice("Error", "No se puede llamar desde este dispositivo");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Explorar
    // ---------------------------------------------------------------------

    pub fn explore_results(&self) -> Vec<(&EmergencyCategory, &EmergencyServiceItem)> {
        self.directory.search(&self.explore_search, usize::MAX)
    }

    pub fn explore_nav(&mut self, delta: isize) {
        let len = self.explore_results().len();
        move_selection(&mut self.explore_state, len, delta);
    }

    /// Re-run the search and keep the selection in range
    pub fn refresh_explore(&mut self) {
        let len = self.explore_results().len();
        self.explore_state.select(if len == 0 { None } else { Some(0) });
    }

    pub fn activate_explore_item(&mut self) {
        let Some(i) = self.explore_state.selected() else { return };
        let Some((_, item)) = self.explore_results().get(i).copied() else { return };
        if let Some(phone) = item.phone.clone() {
            self.popup = Some(Popup::Dial {
                name: item.name.clone(),
                phone,
            });
        }
    }

    // ---------------------------------------------------------------------
    // Asistente
    // ---------------------------------------------------------------------

    /// Append the prompt and ask the assistant on a background task
    pub fn send_message(&mut self, text: &str) {
        let ticket = match self.conversation.begin_send(text) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::debug!(error = %e, "send rejected");
                return;
            }
        };

        self.animation_frame = 0;
        self.selected_message = None;
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let reply = client.send_chat(ticket.prompt(), ticket.history()).await;
            let _ = events.send(AppEvent::ChatReply(ticket, reply));
        });
    }

    pub fn finish_send(&mut self, ticket: SendTicket, reply: Result<String, AssistantError>) {
        if self.conversation.finish_send(ticket, reply).is_some() {
            self.scroll_chat_to_bottom();
        }
    }

    /// Start `action` on the selected reply
    pub fn start_action(&mut self, action: AuxAction) {
        let Some(index) = self.selected_message else {
            self.set_status("Selecciona una respuesta con j/k");
            return;
        };
        let ticket = match self.conversation.begin_action(action, index) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::debug!(error = %e, "action rejected");
                self.set_status(e.to_string());
                return;
            }
        };

        let client = self.client.clone();
        let events = self.events.clone();
        let language = self.config.translate_language().to_string();
        tokio::spawn(async move {
            let outcome = match ticket.action() {
                AuxAction::ReadAloud => ActionOutcome::Speech(client.generate_speech(ticket.text()).await),
                AuxAction::Translate => {
                    let result = client.translate(ticket.text(), &language).await;
                    ActionOutcome::Translated { language, result }
                }
                AuxAction::VisualGuide => ActionOutcome::Image(client.generate_image(ticket.text()).await),
            };
            let _ = events.send(AppEvent::ActionDone(ticket, outcome));
        });
    }

    pub fn finish_action(&mut self, ticket: ActionTicket, outcome: ActionOutcome) {
        let action = ticket.action();
        match self.conversation.finish_action(ticket, outcome) {
            ActionResult::Appended => self.scroll_chat_to_bottom(),
            ActionResult::Play(clip) => match self.audio.play(&clip) {
                Ok(path) => tracing::debug!(path = %path.display(), "playing speech"),
                Err(e) => {
                    tracing::error!(error = %e, "speech playback failed");
                    self.set_status("No se pudo reproducir el audio");
                }
            },
            ActionResult::NoResult => {
                self.set_status(format!("{}: sin resultado", action.label()));
            }
            ActionResult::Stale => {}
        }
    }

    /// Write the selected message's image to the cache directory and open it
    pub fn open_selected_image(&mut self) {
        let Some(uri) = self
            .selected_message
            .and_then(|i| self.conversation.messages().get(i))
            .and_then(|m| m.image.clone())
        else {
            self.set_status("La respuesta seleccionada no tiene imagen");
            return;
        };

        match save_image(&uri, Config::get_cache_dir()) {
            Ok(path) => {
                if let Err(e) = open_external(&path.to_string_lossy()) {
                    tracing::warn!(error = %e, "could not open image viewer");
                }
                self.set_status(format!("Imagen guardada en {}", path.display()));
            }
            Err(e) => {
                tracing::error!(error = %e, "could not save generated image");
                self.set_status("No se pudo guardar la imagen");
            }
        }
    }

    pub fn new_conversation(&mut self) {
        self.conversation.reset();
        self.audio.release();
        self.selected_message = None;
        self.chat_scroll = 0;
    }

    /// Move the selection to the previous/next reply that offers actions
    pub fn select_reply(&mut self, forward: bool) {
        let candidates: Vec<usize> = (0..self.conversation.len())
            .filter(|&i| self.conversation.can_act_on(i))
            .collect();
        if candidates.is_empty() {
            return;
        }

        self.selected_message = Some(match (self.selected_message, forward) {
            (None, _) => candidates[candidates.len() - 1],
            (Some(cur), true) => candidates
                .iter()
                .copied()
                .find(|&i| i > cur)
                .unwrap_or(cur),
            (Some(cur), false) => candidates
                .iter()
                .rev()
                .copied()
                .find(|&i| i < cur)
                .unwrap_or(cur),
        });
    }

    pub fn tick_animation(&mut self) {
        if self.conversation.is_busy() || self.conversation.processing_action().is_some() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat to bottom so the latest reply (or "Pensando...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.conversation.messages() {
            // role line, blank separator, optional image hint
            let mut msg_lines: usize = 2 + usize::from(msg.image.is_some());
            for line in msg.text.lines() {
                msg_lines = msg_lines.saturating_add(line.chars().count() / wrap_width + 1);
            }
            total_lines = total_lines.saturating_add(u16::try_from(msg_lines).unwrap_or(u16::MAX));
        }
        if self.conversation.is_busy() {
            total_lines = total_lines.saturating_add(2);
        }

        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    // ---------------------------------------------------------------------
    // Ajustes
    // ---------------------------------------------------------------------

    /// Key as shown in settings: masked unless revealed
    pub fn key_display(&self) -> Option<(String, CredentialSource)> {
        self.credentials.resolve().map(|(key, source)| {
            let shown = if self.show_key { key } else { mask_key(&key) };
            (shown, source)
        })
    }

    pub fn save_api_key(&mut self) {
        let key = self.api_key_input.trim().to_string();
        if key.is_empty() {
            self.notice("Error", "Ingresa una API Key válida.");
            return;
        }
        match self.credentials.store().save(&key) {
            Ok(()) => {
                tracing::info!("API key saved");
                self.api_key_input.clear();
                self.api_key_input_cursor = 0;
                self.notice(
                    "✅ Guardado",
                    "Tu API Key fue guardada correctamente. El asistente IA ya está listo.",
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "could not save API key");
                self.notice("Error", "No se pudo guardar la API Key.");
            }
        }
    }

    pub fn remove_api_key(&mut self) {
        self.popup = None;
        match self.credentials.store().remove() {
            Ok(()) => {
                tracing::info!("API key removed");
                self.show_key = false;
                self.set_status("API Key eliminada");
            }
            Err(e) => {
                tracing::error!(error = %e, "could not remove API key");
                self.notice("Error", "No se pudo eliminar la API Key.");
            }
        }
    }
}

fn move_selection(state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).clamp(0, len as isize - 1);
    state.select(Some(next as usize));
}

/// Decode a `data:` image URI into `<dir>/guia_visual.<ext>`
pub fn save_image(uri: &str, dir: PathBuf) -> Result<PathBuf> {
    let (mime, bytes) = media::decode_data_uri(uri)?;
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("guia_visual.{}", media::image_extension(&mime)));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Open a URI or file with the platform's default handler
pub fn open_external(target: &str) -> Result<()> {
    open::that(target).map_err(|e| anyhow!("Failed to open {}: {}", target, e))
}

/// `tel:` URI for a directory phone number such as `1500` or `2230-5432`
pub fn tel_uri(phone: &str) -> String {
    format!("tel:{}", phone.replace(['-', ' '], ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayuda_core::{ClientSettings, MemoryStorage};
    use tokio::sync::mpsc;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let credentials = Arc::new(StoredCredentials::without_env(KeyStore::new(storage.clone())));
        let client = GeminiClient::new(
            ClientSettings {
                base_url: "http://127.0.0.1:9/v1beta".to_string(),
                ..ClientSettings::default()
            },
            credentials.clone(),
        );
        let config = Config {
            audio_player: Some("true".to_string()),
            ..Config::new()
        };
        let app = App::with_services(
            config,
            Directory::builtin(),
            GuideBook::builtin(),
            storage,
            credentials,
            client,
            tx,
        );
        (app, rx)
    }

    #[tokio::test]
    async fn test_guides_stored_on_startup() {
        let (app, _rx) = test_app();
        assert!(GuideBook::offline_copy_present(app.storage.as_ref()));
    }

    #[tokio::test]
    async fn test_home_entry_opens_dial_or_guide() {
        let (mut app, _rx) = test_app();

        app.home_state.select(Some(0));
        app.activate_home_item();
        assert!(matches!(app.popup, Some(Popup::Dial { ref phone, .. }) if phone == "110"));

        let guide_index = app
            .home_items()
            .iter()
            .position(|(_, i)| i.scenario.as_deref() == Some("earthquake"))
            .unwrap();
        app.home_state.select(Some(guide_index));
        app.activate_home_item();
        match &app.popup {
            Some(Popup::Guide(guide)) => assert!(!guide.steps.is_empty()),
            other => panic!("expected guide popup, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_explore_filter_resets_selection() {
        let (mut app, _rx) = test_app();
        app.explore_search = "zzz".to_string();
        app.refresh_explore();
        assert_eq!(app.explore_state.selected(), None);

        app.explore_search = "bomberos".to_string();
        app.refresh_explore();
        assert_eq!(app.explore_state.selected(), Some(0));
        app.explore_nav(10);
        assert_eq!(app.explore_state.selected(), Some(app.explore_results().len() - 1));
    }

    #[tokio::test]
    async fn test_send_without_key_reports_back_through_channel() {
        let (mut app, mut rx) = test_app();
        app.send_message("hola");
        assert!(app.conversation.is_busy());

        match rx.recv().await.unwrap() {
            AppEvent::ChatReply(ticket, reply) => app.finish_send(ticket, reply),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!app.conversation.is_busy());
        assert_eq!(
            app.conversation.messages().last().unwrap().text,
            ayuda_core::ai::error::CHAT_NOT_CONFIGURED
        );
    }

    #[tokio::test]
    async fn test_reply_selection_skips_user_messages() {
        let (mut app, _rx) = test_app();
        app.select_reply(true);
        assert_eq!(app.selected_message, None);

        for text in ["a", "b"] {
            let ticket = app.conversation.begin_send(text).unwrap();
            app.conversation.finish_send(ticket, Ok(format!("r-{}", text)));
        }
        app.select_reply(false);
        assert_eq!(app.selected_message, Some(4));
        app.select_reply(false);
        assert_eq!(app.selected_message, Some(2));
        app.select_reply(false);
        assert_eq!(app.selected_message, Some(2));
    }

    #[tokio::test]
    async fn test_api_key_save_and_remove() {
        let (mut app, _rx) = test_app();
        app.api_key_input = "  ".to_string();
        app.save_api_key();
        assert!(app.key_display().is_none());

        app.api_key_input = " AIzaSyExample1234 ".to_string();
        app.save_api_key();
        let (shown, source) = app.key_display().unwrap();
        assert_eq!(shown, "AIza••••••••••••1234");
        assert_eq!(source, CredentialSource::Stored);

        app.show_key = true;
        assert_eq!(app.key_display().unwrap().0, "AIzaSyExample1234");

        app.remove_api_key();
        assert!(app.key_display().is_none());
        assert!(!app.client.has_credential());
    }

    #[tokio::test]
    async fn test_scroll_saturates_on_long_transcript() {
        let (mut app, _rx) = test_app();
        app.chat_width = 1;
        app.chat_height = 10;
        let long = "a".repeat(400);
        for _ in 0..500 {
            app.conversation.append(ayuda_core::Message::model(long.clone()));
        }

        app.scroll_chat_to_bottom();
        assert_eq!(app.chat_scroll, u16::MAX - 10);
    }

    #[test]
    fn test_tel_uri_strips_separators() {
        assert_eq!(tel_uri("110"), "tel:110");
        assert_eq!(tel_uri("2230-5432"), "tel:22305432");
        assert_eq!(tel_uri("1 500"), "tel:1500");
    }

    #[test]
    fn test_save_image_writes_decoded_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_image("data:image/png;base64,QUJD", dir.path().to_path_buf()).unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(std::fs::read(path).unwrap(), b"ABC");
    }
}
