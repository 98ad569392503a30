//! src/view/components/status_bar.rs
//!
//! Bottom line: mode, page, item count and pending keys on the left; the
//! current notification on the right.

use crate::{
    model::ui_state::{UIMode, UIState},
    operators::navigator::PaginatedNavigator,
    view::theme,
};
use ratatui::{
    prelude::*,
    widgets::{Paragraph, Widget},
};

pub struct StatusBar;

impl StatusBar {
    pub fn render(
        frame: &mut Frame<'_>,
        ui_state: &UIState,
        navigator: &PaginatedNavigator,
        area: Rect,
    ) {
        let mode_str = match ui_state.mode {
            UIMode::Browse => "BROWSE",
            UIMode::Search => "SEARCH",
            UIMode::Command => "COMMAND",
            UIMode::Conflict => "CONFLICT",
            UIMode::Help => "HELP",
        };

        let cursor = navigator.cursor();
        let mut left_text = format!(
            " {mode_str} | page {}{} | {} items",
            cursor.page_number(),
            if cursor.has_next() { "+" } else { "" },
            navigator.items().len(),
        );
        if !ui_state.pending_keys.is_empty() {
            left_text.push_str(&format!(" | keys: {}", ui_state.pending_keys));
        }
        if !ui_state.transfers.is_empty() {
            left_text.push_str(&format!(" | {} transfer(s)", ui_state.transfers.len()));
        }

        let layout = Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(area);

        Paragraph::new(left_text)
            .style(theme::base_style())
            .alignment(Alignment::Left)
            .render(layout[0], frame.buffer_mut());

        let (right_text, color) = match &ui_state.notification {
            Some(n) => (
                format!("{} ", n.message),
                theme::notification_color(n.level),
            ),
            None => ("? help ".to_string(), theme::COMMENT),
        };

        Paragraph::new(right_text)
            .style(Style::default().fg(color).bg(theme::BACKGROUND))
            .alignment(Alignment::Right)
            .render(layout[1], frame.buffer_mut());
    }
}
