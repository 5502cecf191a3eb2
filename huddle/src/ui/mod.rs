//! Terminal UI rendering.

pub mod chat_panel;
pub mod prompt;
pub mod sidebar;
pub mod status_bar;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
};

use crate::app::App;

/// Main draw function for the entire UI.
pub fn draw(frame: &mut Frame, app: &App) {
    // Create main layout with status bar at bottom
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    let content_area = main_chunks[0];
    let status_area = main_chunks[1];

    if app.in_chat() {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(22), // Participants
                Constraint::Percentage(78), // Chat
            ])
            .split(content_area);

        sidebar::render(frame, content_chunks[0], app);
        chat_panel::render(frame, content_chunks[1], app);
    } else {
        prompt::render(frame, content_area, app);
    }

    status_bar::render(frame, status_area, app);
}
