//! Chat panel rendering (message list + input box).

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use super::theme;
use crate::app::App;

/// Render the chat panel (messages + input box).
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    render_messages(frame, chunks[0], app);
    render_input(frame, chunks[1], app);
}

/// Render the message list, newest at the bottom.
fn render_messages(frame: &mut Frame, area: Rect, app: &App) {
    let visible = usize::from(area.height.saturating_sub(2));
    let end = app
        .snapshot
        .messages
        .len()
        .saturating_sub(app.message_scroll);
    let start = end.saturating_sub(visible);

    let items: Vec<ListItem> = app.snapshot.messages[start..end]
        .iter()
        .map(|(msg, status)| {
            let time = Span::styled(app.format_time(&msg.timestamp), theme::timestamp());

            let line = if msg.is_presence() {
                Line::from(vec![
                    time,
                    Span::raw(" "),
                    Span::styled(format!("· {}", msg.content), theme::system_message()),
                ])
            } else {
                let own = app.is_own(msg);
                let sender_style = if own {
                    theme::highlighted()
                } else {
                    theme::normal().fg(theme::sender_color(&msg.sender))
                };
                let mut spans = vec![
                    time,
                    Span::raw(" "),
                    Span::styled(&msg.sender, sender_style),
                    Span::raw(": "),
                    Span::styled(&msg.content, theme::normal()),
                ];
                if let (true, Some(status)) = (own, status) {
                    spans.push(Span::raw(" "));
                    spans.push(Span::styled(status.symbol(), theme::dimmed()));
                }
                Line::from(spans)
            };

            ListItem::new(line)
        })
        .collect();

    let block = Block::default()
        .title(Span::styled("Chat", theme::panel_title(theme::CHAT_TITLE)))
        .borders(Borders::ALL)
        .border_style(theme::normal());

    frame.render_widget(List::new(items).block(block), area);
}

/// Render the input box.
fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let title = if app.snapshot.typing {
        "Message (typing...)"
    } else {
        "Message"
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(theme::highlighted());

    let paragraph = Paragraph::new(input_line(app, "Type a message...")).block(block);
    frame.render_widget(paragraph, area);
}

/// The input text with a block cursor, or `placeholder` when empty.
pub fn input_line<'a>(app: &App, placeholder: &'a str) -> Line<'a> {
    if app.input.is_empty() {
        return Line::from(vec![
            Span::styled("█", theme::normal()),
            Span::styled(placeholder, theme::dimmed()),
        ]);
    }

    let mut display_text = String::with_capacity(app.input.len() + 3);
    for (i, c) in app.input.chars().enumerate() {
        if i == app.cursor_position {
            display_text.push('█');
        }
        display_text.push(c);
    }
    if app.cursor_position >= app.input.chars().count() {
        display_text.push('█');
    }
    Line::from(Span::styled(display_text, theme::normal()))
}
