use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
};

use ayuda_core::directory::parse_hex_color;
use ayuda_core::{ChatRole, QUICK_PROMPTS};

use crate::app::{App, InputMode, Popup, Screen};

/// Parse a line of text and convert **bold** markdown and `###` headings to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    if let Some(heading) = text.trim_start().strip_prefix("###") {
        return Line::from(Span::styled(
            heading.trim().to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn hex_color(color: &str) -> Color {
    parse_hex_color(color)
        .map(|(r, g, b)| Color::Rgb(r, g, b))
        .unwrap_or(Color::White)
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, tabs_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_tabs(app, frame, tabs_area);

    match app.screen {
        Screen::Inicio => render_home_screen(app, frame, body_area),
        Screen::Explorar => render_explore_screen(app, frame, body_area),
        Screen::Asistente => render_assistant_screen(app, frame, body_area),
        Screen::Ajustes => render_settings_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if let Some(popup) = app.popup.clone() {
        render_popup(app, &popup, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" Ayuda Niños GT 🇬🇹 ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ];
    if !app.connected {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            " SIN CONEXIÓN ",
            Style::default().bg(Color::Red).fg(Color::White).bold(),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_tabs(app: &App, frame: &mut Frame, area: Rect) {
    let titles: Vec<Line> = Screen::all()
        .iter()
        .enumerate()
        .map(|(i, s)| Line::from(format!(" F{} {} ", i + 1, s.title())))
        .collect();
    let selected = Screen::all().iter().position(|s| *s == app.screen).unwrap_or(0);

    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan).bold())
        .divider("│");
    frame.render_widget(tabs, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    if let Some(status) = &app.status {
        let footer = Paragraph::new(Span::styled(format!(" {} ", status), Style::default().fg(Color::Yellow)))
            .style(Style::default().bg(Color::Black));
        frame.render_widget(footer, area);
        return;
    }

    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let pairs: Vec<[Span; 2]> = match (app.screen, app.input_mode) {
        (_, _) if app.popup == Some(Popup::ApiKeyInput) => {
            vec![hint("Enter", "guardar"), hint("Esc", "cancelar")]
        }
        (_, _) if app.popup.is_some() => vec![hint("Enter", "aceptar"), hint("Esc", "cerrar")],
        (Screen::Inicio, _) => vec![
            hint("j/k", "mover"),
            hint("Enter", "llamar / ver guía"),
            hint("Tab", "pantalla"),
            hint("q", "salir"),
        ],
        (Screen::Explorar, InputMode::Normal) => vec![
            hint("j/k", "mover"),
            hint("Enter", "llamar"),
            hint("/", "buscar"),
            hint("Esc", "limpiar"),
            hint("Tab", "pantalla"),
        ],
        (Screen::Explorar, InputMode::Editing) => vec![hint("Enter", "listo"), hint("Esc", "listo")],
        (Screen::Asistente, InputMode::Normal) => vec![
            hint("i", "escribir"),
            hint("j/k", "respuesta"),
            hint("l", "escuchar"),
            hint("t", "traducir"),
            hint("v", "ver guía"),
            hint("o", "abrir imagen"),
            hint("n", "nueva"),
            hint("Tab", "pantalla"),
        ],
        (Screen::Asistente, InputMode::Editing) => vec![hint("Enter", "enviar"), hint("Esc", "dejar de escribir")],
        (Screen::Ajustes, _) => vec![
            hint("e", "editar clave"),
            hint("m", "mostrar/ocultar"),
            hint("x", "eliminar"),
            hint("a", "AI Studio"),
            hint("Tab", "pantalla"),
        ],
    };

    let footer = Paragraph::new(Line::from(pairs.into_iter().flatten().collect::<Vec<_>>()))
        .style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_home_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, numbers_area] = Layout::horizontal([
        Constraint::Percentage(60),
        Constraint::Percentage(40),
    ])
    .areas(area);
    app.list_area = Some(list_area);

    let items: Vec<ListItem> = app
        .home_items()
        .into_iter()
        .map(|(category, item)| {
            let action = match (&item.phone, &item.scenario) {
                (Some(phone), _) => Span::styled(format!("  ☎ {}", phone), Style::default().fg(Color::Yellow)),
                (None, Some(_)) => Span::styled("  → guía", Style::default().fg(Color::Green)),
                _ => Span::raw(""),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {} ", category.title), Style::default().fg(hex_color(&category.color))),
                Span::styled(item.name.clone(), Style::default().fg(hex_color(&item.color)).bold()),
                action,
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" ¿Qué necesitas? "),
        )
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.home_state);

    let numbers = app.directory.numbers();
    let lines = vec![
        Line::from(vec![Span::raw(" Policía: "), Span::styled(numbers.police.clone(), Style::default().bold())]),
        Line::from(vec![Span::raw(" Bomberos Voluntarios: "), Span::styled(numbers.firefighters.clone(), Style::default().bold())]),
        Line::from(vec![Span::raw(" Bomberos Municipales: "), Span::styled(numbers.firefighters_municipal.clone(), Style::default().bold())]),
        Line::from(vec![Span::raw(" Cruz Roja: "), Span::styled(numbers.ambulance.clone(), Style::default().bold())]),
        Line::from(vec![Span::raw(" Protección de la niñez: "), Span::styled(numbers.child_protection.clone(), Style::default().bold())]),
        Line::default(),
        Line::from(Span::styled(
            " Estos números y las guías funcionan sin internet.",
            Style::default().fg(Color::Gray),
        )),
    ];
    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Números de emergencia "));
    frame.render_widget(panel, numbers_area);
}

fn render_explore_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [search_area, list_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);
    app.list_area = Some(list_area);

    let editing = app.input_mode == InputMode::Editing;
    let search_text = if app.explore_search.is_empty() && !editing {
        Span::styled("Buscar servicio o número...", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(app.explore_search.clone(), Style::default().fg(Color::Cyan))
    };
    let search = Paragraph::new(search_text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
            .title(" Directorio de Ayuda "),
    );
    frame.render_widget(search, search_area);
    if editing {
        let cursor_x = app.explore_search.chars().count() as u16;
        frame.set_cursor_position((search_area.x + cursor_x + 1, search_area.y + 1));
    }

    let results = app.explore_results();
    let title = format!(" {} servicios ", results.len());

    if results.is_empty() {
        let empty = Paragraph::new("No se encontraron servicios")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, list_area);
        return;
    }

    let items: Vec<ListItem> = results
        .iter()
        .map(|(category, item)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {:<24}", category.title), Style::default().fg(hex_color(&category.color))),
                Span::styled(item.name.clone(), Style::default().bold()),
                Span::styled(
                    item.phone.as_deref().map(|p| format!("  ☎ {}", p)).unwrap_or_default(),
                    Style::default().fg(Color::Yellow),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.explore_state);
}

fn render_assistant_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let prompts_height = if app.conversation.is_fresh() { 3 } else { 0 };
    let [chat_area, prompts_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(prompts_height),
        Constraint::Length(3),
    ])
    .areas(area);

    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let mut title = String::from(" Asistente IA ");
    if let Some(action) = app.conversation.processing_action() {
        let dots = ".".repeat(app.animation_frame as usize + 1);
        title = format!(" Asistente IA · {}{} ", action.label(), dots);
    }
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    let mut lines: Vec<Line> = Vec::new();
    for (idx, msg) in app.conversation.messages().iter().enumerate() {
        let selected = app.selected_message == Some(idx);
        let marker = if selected { "▶ " } else { "" };
        let (label, color) = match (msg.role, msg.is_system) {
            (ChatRole::User, _) => ("Tú:", Color::Cyan),
            (ChatRole::Model, true) => ("Sistema:", Color::Magenta),
            (ChatRole::Model, false) => ("Asistente:", Color::Yellow),
        };
        let mut label_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
        if selected {
            label_style = label_style.bg(Color::DarkGray);
        }
        lines.push(Line::from(Span::styled(format!("{}{}", marker, label), label_style)));

        for line in msg.text.lines() {
            lines.push(match msg.role {
                ChatRole::User => Line::from(line.to_string()),
                ChatRole::Model => parse_markdown_line(line),
            });
        }
        if msg.image.is_some() {
            lines.push(Line::from(Span::styled(
                "[imagen generada: selecciona y pulsa o para abrirla]",
                Style::default().fg(Color::Green).add_modifier(Modifier::ITALIC),
            )));
        }
        lines.push(Line::default());
    }

    if app.conversation.is_busy() {
        lines.push(Line::from(Span::styled(
            "Asistente:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        let dots = ".".repeat(app.animation_frame as usize + 1);
        lines.push(Line::from(Span::styled(
            format!("Pensando{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    if prompts_height > 0 {
        let spans: Vec<Span> = QUICK_PROMPTS
            .iter()
            .enumerate()
            .flat_map(|(i, p)| {
                [
                    Span::styled(format!(" {} ", i + 1), Style::default().bg(Color::DarkGray).fg(Color::White)),
                    Span::raw(format!(" {}  ", p.label)),
                ]
            })
            .collect();
        let prompts = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL).title(" Preguntas rápidas "));
        frame.render_widget(prompts, prompts_area);
    }

    let editing = app.input_mode == InputMode::Editing;
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Escribe tu pregunta... ");

    // Horizontal scrolling keeps the cursor visible
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && app.chat_cursor >= inner_width {
        app.chat_cursor - inner_width + 1
    } else {
        0
    };
    let visible_text: String = app.chat_input.chars().skip(scroll_offset).take(inner_width).collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, input_area);

    if editing {
        let cursor_x = (app.chat_cursor - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_settings_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [status_area, help_area, about_area] = Layout::vertical([
        Constraint::Length(5),
        Constraint::Min(0),
        Constraint::Length(5),
    ])
    .areas(area);

    let status_lines = match app.key_display() {
        Some((shown, source)) => vec![
            Line::from(Span::styled("Asistente IA — Activo", Style::default().fg(Color::Green).bold())),
            Line::from(format!("Tu clave está configurada: {}", shown)),
            Line::from(Span::styled(
                match source.as_str() {
                    "env" => "Origen: variable de entorno GEMINI_API_KEY",
                    _ => "Origen: guardada en este equipo",
                },
                Style::default().fg(Color::Gray),
            )),
        ],
        None => vec![
            Line::from(Span::styled("Asistente IA — Inactivo", Style::default().fg(Color::Red).bold())),
            Line::from("Necesitas una API Key de Google para usar el asistente de IA."),
        ],
    };
    let status = Paragraph::new(status_lines)
        .block(Block::default().borders(Borders::ALL).title(" API Key "));
    frame.render_widget(status, status_area);

    let steps = [
        "Abre Google AI Studio en tu navegador (pulsa a): aistudio.google.com/apikey",
        "Inicia sesión con tu cuenta de Google",
        "Haz clic en \"Create API Key\" (Crear clave de API)",
        "Copia la clave generada (empieza con AIza...)",
        "Pulsa e, pégala y presiona Enter para guardar",
    ];
    let mut help_lines = vec![
        Line::from("Sigue estos pasos para obtener tu clave gratuita de Google AI:"),
        Line::default(),
    ];
    help_lines.extend(steps.iter().enumerate().map(|(i, step)| {
        Line::from(vec![
            Span::styled(format!(" {} ", i + 1), Style::default().bg(Color::Blue).fg(Color::White)),
            Span::raw(format!(" {}", step)),
        ])
    }));
    help_lines.push(Line::default());
    help_lines.push(Line::from(Span::styled(
        "La API Key es gratuita y se guarda solo en tu dispositivo. Nunca se comparte.",
        Style::default().fg(Color::Gray),
    )));
    let help = Paragraph::new(help_lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" ¿Cómo obtener tu API Key? "));
    frame.render_widget(help, help_area);

    let about = Paragraph::new(vec![
        Line::from(format!("Ayuda Niños GT v{}", env!("CARGO_PKG_VERSION"))),
        Line::from("Aplicación de asistencia para emergencias en Guatemala."),
        Line::from("Desarrollado con ❤️ para los niños de Guatemala."),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Acerca de "));
    frame.render_widget(about, about_area);
}

fn render_popup(app: &App, popup: &Popup, frame: &mut Frame, area: Rect) {
    match popup {
        Popup::Dial { name, phone } => render_message_popup(
            frame,
            area,
            &format!("Llamar a {}", name),
            Text::from(vec![
                Line::from(format!("¿Estás seguro que quieres llamar al {}?", phone)),
                Line::default(),
                Line::from(Span::styled("Enter llamar · Esc cancelar", Style::default().fg(Color::DarkGray))),
            ]),
            Color::Red,
        ),
        Popup::Guide(guide) => {
            let mut lines: Vec<Line> = Vec::new();
            for step in guide.numbered_steps() {
                lines.push(Line::from(step));
                lines.push(Line::default());
            }
            lines.push(Line::from(Span::styled("Enter: Entendido", Style::default().fg(Color::DarkGray))));
            render_message_popup(frame, area, &guide.title, Text::from(lines), Color::Green);
        }
        Popup::Notice { title, body } => render_message_popup(
            frame,
            area,
            title,
            Text::from(body.as_str()),
            Color::Yellow,
        ),
        Popup::ConfirmRemoveKey => render_message_popup(
            frame,
            area,
            "Eliminar API Key",
            Text::from(vec![
                Line::from("¿Estás seguro? El asistente IA dejará de funcionar."),
                Line::default(),
                Line::from(Span::styled("Enter eliminar · Esc cancelar", Style::default().fg(Color::DarkGray))),
            ]),
            Color::Red,
        ),
        Popup::ApiKeyInput => render_api_key_input(app, frame, area),
    }
}

fn render_message_popup(frame: &mut Frame, area: Rect, title: &str, body: Text<'_>, color: Color) {
    let height = (body.lines.len() as u16 + 4).max(7);
    let popup_area = centered_popup(area, 64, height);
    frame.render_widget(Clear, popup_area);

    let paragraph = Paragraph::new(body)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(format!(" {} ", title)),
        );
    frame.render_widget(paragraph, popup_area);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, 60, 7);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" API Key de Gemini ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Pega tu API Key. Enter para guardar, Esc para cancelar.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let display_text = if app.api_key_input.is_empty() {
        Span::styled("AIzaSy...", Style::default().fg(Color::DarkGray))
    } else if app.show_key {
        Span::styled(app.api_key_input.clone(), Style::default().fg(Color::Cyan))
    } else {
        Span::styled("•".repeat(app.api_key_input.chars().count()), Style::default().fg(Color::Cyan))
    };
    frame.render_widget(Paragraph::new(display_text), input_area);

    let cursor_x = app.api_key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let status = Paragraph::new(format!("{} caracteres", app.api_key_input.chars().count()))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}
