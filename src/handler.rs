use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use ayuda_core::{AuxAction, QUICK_PROMPTS};

use crate::app::{App, InputMode, Popup, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::ChatReply(ticket, reply) => app.finish_send(ticket, reply),
        AppEvent::ActionDone(ticket, outcome) => app.finish_action(ticket, outcome),
        AppEvent::Connectivity(connected) => {
            app.connected = connected;
            if !connected {
                app.set_status("Sin conexión: las guías y números siguen disponibles");
            }
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Any key dismisses the last status line
    app.status = None;

    if app.popup.is_some() {
        handle_popup(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_popup(app: &mut App, key: KeyEvent) {
    let Some(popup) = app.popup.clone() else { return };

    match popup {
        Popup::Dial { phone, .. } => match key.code {
            KeyCode::Enter | KeyCode::Char('s') | KeyCode::Char('y') => app.dial(&phone),
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('q') => app.popup = None,
            _ => {}
        },
        Popup::Guide(_) | Popup::Notice { .. } => {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q')) {
                app.popup = None;
            }
        }
        Popup::ConfirmRemoveKey => match key.code {
            KeyCode::Enter | KeyCode::Char('s') | KeyCode::Char('y') => app.remove_api_key(),
            KeyCode::Esc | KeyCode::Char('n') => app.popup = None,
            _ => {}
        },
        Popup::ApiKeyInput => handle_api_key_input(app, key),
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.popup = None;
            app.api_key_input.clear();
            app.api_key_input_cursor = 0;
        }
        KeyCode::Enter => {
            app.popup = None;
            app.save_api_key();
        }
        KeyCode::Backspace => {
            if app.api_key_input_cursor > 0 {
                app.api_key_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
                app.api_key_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.api_key_input_cursor = app.api_key_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.api_key_input.chars().count();
            app.api_key_input_cursor = (app.api_key_input_cursor + 1).min(char_count);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
            app.api_key_input.insert(byte_pos, c);
            app.api_key_input_cursor += 1;
        }
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    // Screen switching
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Tab => {
            app.screen = app.screen.next();
            return;
        }
        KeyCode::F(n @ 1..=4) => {
            app.screen = Screen::all()[usize::from(n) - 1];
            return;
        }
        _ => {}
    }

    match app.screen {
        Screen::Inicio => handle_home(app, key),
        Screen::Explorar => handle_explore(app, key),
        Screen::Asistente => handle_assistant(app, key),
        Screen::Ajustes => handle_settings(app, key),
    }
}

fn handle_home(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.home_nav(1),
        KeyCode::Char('k') | KeyCode::Up => app.home_nav(-1),
        KeyCode::Char('g') => app.home_state.select(Some(0)),
        KeyCode::Enter => app.activate_home_item(),
        _ => {}
    }
}

fn handle_explore(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.explore_nav(1),
        KeyCode::Char('k') | KeyCode::Up => app.explore_nav(-1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => app.explore_nav(10),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => app.explore_nav(-10),
        KeyCode::Enter => app.activate_explore_item(),
        KeyCode::Char('/') | KeyCode::Char('i') => app.input_mode = InputMode::Editing,
        KeyCode::Esc => {
            app.explore_search.clear();
            app.refresh_explore();
        }
        _ => {}
    }
}

fn handle_assistant(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.chat_cursor = app.chat_input.chars().count();
        }

        // Reply selection
        KeyCode::Char('j') | KeyCode::Down => app.select_reply(true),
        KeyCode::Char('k') | KeyCode::Up => app.select_reply(false),
        KeyCode::Esc => app.selected_message = None,

        // Chat scrolling
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.chat_scroll = app.chat_scroll.saturating_add(app.chat_height / 2);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.chat_scroll = app.chat_scroll.saturating_sub(app.chat_height / 2);
        }
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        KeyCode::Char('g') => app.chat_scroll = 0,

        // Actions on the selected reply
        KeyCode::Char('l') => app.start_action(AuxAction::ReadAloud),
        KeyCode::Char('t') => app.start_action(AuxAction::Translate),
        KeyCode::Char('v') => app.start_action(AuxAction::VisualGuide),
        KeyCode::Char('o') => app.open_selected_image(),
        KeyCode::Char('s') => {
            app.audio.release();
        }

        KeyCode::Char('n') => app.new_conversation(),

        // Quick prompts, only before the first question
        KeyCode::Char(c @ '1'..='3') if app.conversation.is_fresh() => {
            let prompt = QUICK_PROMPTS[(c as u8 - b'1') as usize];
            app.send_message(prompt.text);
        }
        _ => {}
    }
}

fn handle_settings(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('e') | KeyCode::Enter => {
            app.api_key_input.clear();
            app.api_key_input_cursor = 0;
            app.popup = Some(Popup::ApiKeyInput);
        }
        KeyCode::Char('m') => app.show_key = !app.show_key,
        KeyCode::Char('x') | KeyCode::Delete => {
            if matches!(app.credentials.store().load(), Ok(Some(_))) {
                app.popup = Some(Popup::ConfirmRemoveKey);
            }
        }
        KeyCode::Char('a') => {
            if let Err(e) = crate::app::open_external("https://aistudio.google.com/apikey") {
                tracing::warn!(error = %e, "could not open browser");
            }
        }
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Explorar => handle_search_editing(app, key),
        Screen::Asistente => handle_chat_editing(app, key),
        _ => app.input_mode = InputMode::Normal,
    }
}

fn handle_search_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Backspace => {
            app.explore_search.pop();
            app.refresh_explore();
        }
        KeyCode::Char(c) => {
            app.explore_search.push(c);
            app.refresh_explore();
        }
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if !app.chat_input.trim().is_empty() && !app.conversation.is_busy() {
                let text = std::mem::take(&mut app.chat_input);
                app.chat_cursor = 0;
                app.send_message(&text);
            }
        }
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.chat_cursor = 0;
        }
        KeyCode::End => {
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let (x, y) = (mouse.column, mouse.row);
    let in_list = app.list_area.is_some_and(|r| point_in_rect(x, y, r));
    let in_chat = app.chat_area.is_some_and(|r| point_in_rect(x, y, r));

    let delta: isize = match mouse.kind {
        MouseEventKind::ScrollDown => 1,
        MouseEventKind::ScrollUp => -1,
        _ => return,
    };

    match app.screen {
        Screen::Inicio if in_list => app.home_nav(delta),
        Screen::Explorar if in_list => app.explore_nav(delta),
        Screen::Asistente if in_chat => {
            app.chat_scroll = if delta > 0 {
                app.chat_scroll.saturating_add(3)
            } else {
                app.chat_scroll.saturating_sub(3)
            };
        }
        _ => {}
    }
}
