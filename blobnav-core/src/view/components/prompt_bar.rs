//! src/view/components/prompt_bar.rs
//! ============================================================================
//! # `PromptBar`: Search and Command Entry Line
//!
//! Single line above the status bar showing the literal prefix ("/" or ":")
//! followed by the text typed so far, with the terminal cursor at its end.

use crate::model::ui_state::UIState;
use crate::view::theme;
use ratatui::{
    Frame,
    layout::{Position, Rect},
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
};

pub struct PromptBar;

impl PromptBar {
    pub fn render(frame: &mut Frame<'_>, ui_state: &UIState, area: Rect) {
        let line = Line::from(vec![
            Span::styled(
                ui_state.prompt_prefix.to_string(),
                Style::default().fg(theme::YELLOW),
            ),
            Span::styled(ui_state.input.clone(), Style::default().fg(theme::FOREGROUND)),
        ]);

        frame.render_widget(
            Paragraph::new(line).style(Style::default().bg(theme::CURRENT_LINE)),
            area,
        );

        let typed = (ui_state.prompt_prefix.chars().count() + ui_state.input.chars().count()) as u16;
        frame.set_cursor_position(Position::new(
            area.x + typed.min(area.width.saturating_sub(1)),
            area.y,
        ));
    }
}
