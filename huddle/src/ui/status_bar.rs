//! Status bar rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::theme;
use crate::app::App;
use crate::chat::session::ConnectionState;

/// Render the status bar at the bottom of the screen.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let help_text = if app.in_chat() {
        "Enter: send | /leave: leave chat | ↑↓: scroll | Esc: quit"
    } else {
        "Enter: join | Esc: quit"
    };

    let (dot_color, status_text) = match app.snapshot.connection {
        ConnectionState::Connected => (theme::SUCCESS, "Connected"),
        ConnectionState::Connecting => (theme::WARNING, "Connecting..."),
        ConnectionState::Disconnected => (theme::OFFLINE, "Disconnected"),
    };

    let mut spans = vec![
        Span::styled(concat!("Huddle v", env!("CARGO_PKG_VERSION")), theme::bold()),
        Span::raw(" | "),
        Span::styled("●", theme::normal().fg(dot_color)),
        Span::raw(format!(" {status_text}")),
    ];
    if app.in_chat() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            app.snapshot.local_identity.as_str(),
            theme::highlighted(),
        ));
    }
    spans.push(Span::raw(" | "));
    spans.push(Span::styled(help_text, theme::dimmed()));

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::status_bar_bg());
    frame.render_widget(paragraph, area);
}
