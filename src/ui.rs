use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::app::{App, Sender};
use crate::weather::ResolverStatus;

/// Convert **bold** markdown in bot replies to styled spans; everything else
/// stays literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            chars.next(); // consume the second *

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
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

/// Rough glyph for an OpenWeatherMap icon id.
fn weather_glyph(icon_id: &str) -> &'static str {
    match icon_id.get(..2).unwrap_or("") {
        "01" => "☀",
        "02" | "03" | "04" => "☁",
        "09" | "10" => "🌧",
        "11" => "⛈",
        "13" => "❄",
        "50" => "🌫",
        _ => "·",
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, weather_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_weather(app, frame, weather_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mode = if app.offline_mode {
        Span::styled(" [Offline] ", Style::default().fg(Color::Yellow).bold())
    } else {
        Span::styled(" [Online] ", Style::default().fg(Color::Green).bold())
    };

    let title = Line::from(vec![
        Span::styled(" KrishiMitr ", Style::default().fg(Color::Cyan).bold()),
        Span::styled("Your AI Farming Assistant", Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        mode,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    frame.render_widget(Paragraph::new(title), area);
}

fn render_weather(app: &App, frame: &mut Frame, area: Rect) {
    let line = match &app.weather {
        ResolverStatus::Loading => Line::from(Span::styled(
            " Loading Weather...",
            Style::default().fg(Color::DarkGray),
        )),
        ResolverStatus::Error(message) => Line::from(Span::styled(
            format!(" {message}"),
            Style::default().fg(Color::Red),
        )),
        ResolverStatus::Ready(reading) => {
            let mut spans = vec![
                Span::raw(format!(" {} ", weather_glyph(&reading.icon_id))),
                Span::styled(
                    reading.location_label.clone(),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(format!(
                    "  {}  {} ({})",
                    reading.display_temperature(),
                    reading.condition_main,
                    reading.condition_description
                )),
            ];
            if reading.degraded {
                spans.push(Span::styled(
                    "  approx.",
                    Style::default().fg(Color::DarkGray),
                ));
            }
            Line::from(spans)
        }
    };

    frame.render_widget(Paragraph::new(line), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Chat ");
    let inner = block.inner(area);

    // Dimensions feed the wrap arithmetic used for bottom-scrolling.
    app.transcript_width = inner.width;
    app.transcript_height = inner.height;

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.messages {
        match msg.sender {
            Sender::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Green).bold(),
                )));
                for line in msg.text.lines() {
                    lines.push(Line::raw(line.to_string()));
                }
            }
            Sender::Bot => {
                lines.push(Line::from(Span::styled(
                    "KrishiMitr:",
                    Style::default().fg(Color::Cyan).bold(),
                )));
                for line in msg.text.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.is_thinking() {
        lines.push(Line::from(Span::styled(
            "KrishiMitr:",
            Style::default().fg(Color::Cyan).bold(),
        )));
        let dots = ".".repeat(app.animation_frame as usize + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{dots}"),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .wrap(ratatui::widgets::Wrap { trim: false })
        .scroll((app.transcript_scroll, 0));

    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let title = if app.is_listening() {
        " Listening... "
    } else {
        " Ask a question "
    };

    let style = if app.is_thinking() {
        Style::default().fg(Color::DarkGray)
    } else if app.is_listening() {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };

    let content = if app.input.is_empty() && !app.is_listening() {
        let hint = if app.voice_available() {
            "Type or press Ctrl+R to speak..."
        } else {
            "Type your question..."
        };
        Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray)))
    } else {
        Line::raw(app.input.clone())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title);
    let inner = block.inner(area);

    frame.render_widget(Paragraph::new(content).block(block), area);

    if !app.is_thinking() {
        let cursor_x = inner.x + app.input_cursor.min(inner.width as usize) as u16;
        frame.set_cursor_position(Position::new(cursor_x, inner.y));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mic_hint = if app.voice_available() {
        "Ctrl+R mic | "
    } else {
        ""
    };
    let hints = format!(" Enter send | Tab mode | {mic_hint}Up/Down scroll | Ctrl+C quit");
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            hints,
            Style::default().fg(Color::DarkGray),
        ))),
        area,
    );
}
