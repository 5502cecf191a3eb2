//! Join prompt shown until the user has picked a name.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use super::{chat_panel, theme};
use crate::app::App;

/// Render the name prompt centered in `area`.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Fill(1),
        ])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(40),
            Constraint::Fill(1),
        ]);
    let input_area = columns.split(rows[1])[1];
    let notice_area = columns.split(rows[2])[1];

    let block = Block::default()
        .title(Span::styled(
            "Choose a name",
            theme::panel_title(theme::CHAT_TITLE),
        ))
        .borders(Borders::ALL)
        .border_style(theme::highlighted());
    let input = Paragraph::new(chat_panel::input_line(app, "Your name...")).block(block);
    frame.render_widget(input, input_area);

    let hint = app.notice.as_deref().map_or_else(
        || Line::from(Span::styled("Enter: join | Esc: quit", theme::dimmed())),
        |notice| Line::from(Span::styled(notice, theme::normal().fg(theme::WARNING))),
    );
    frame.render_widget(Paragraph::new(hint), notice_area);
}
