//! Sidebar rendering for the participant list.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
};

use super::theme;
use crate::app::App;

/// Render the sidebar with everyone currently online.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .snapshot
        .participants
        .iter()
        .map(|participant| {
            let is_self = participant.identity == app.snapshot.local_identity;
            let mut spans = vec![
                Span::styled(
                    format!(" {} ", participant.initial),
                    theme::initial_badge(&participant.identity),
                ),
                Span::raw(" "),
                Span::styled(
                    &participant.identity,
                    if is_self {
                        theme::highlighted()
                    } else {
                        theme::normal()
                    },
                ),
            ];
            if is_self {
                spans.push(Span::styled(" (you)", theme::dimmed()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = format!("Online ({})", app.snapshot.participants.len());
    let block = Block::default()
        .title(Span::styled(title, theme::panel_title(theme::SIDEBAR_TITLE)))
        .borders(Borders::ALL)
        .border_style(theme::normal());

    frame.render_widget(List::new(items).block(block), area);
}
