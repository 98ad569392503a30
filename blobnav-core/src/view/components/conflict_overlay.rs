//! src/view/components/conflict_overlay.rs
//! Modal question for a download whose target already exists.

use crate::{
    transfer::conflict::PendingConflict,
    util::humanize::human_readable_size,
    view::{theme, ui::centered_rect},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

pub struct ConflictOverlay;

impl ConflictOverlay {
    pub fn render(frame: &mut Frame<'_>, conflict: &PendingConflict, area: Rect) {
        let overlay_area = centered_rect(60, 40, area);
        frame.render_widget(Clear, overlay_area);

        let local_modified = conflict
            .local
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let remote_modified = conflict
            .remote
            .last_modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let text = vec![
            Line::from(Span::styled(
                "File already exists",
                Style::default().fg(theme::ORANGE).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(conflict.path.display().to_string()),
            Line::from(""),
            Line::from(format!(
                "  local:  {:>10}  {local_modified}",
                human_readable_size(conflict.local.size)
            )),
            Line::from(format!(
                "  remote: {:>10}  {remote_modified}",
                human_readable_size(conflict.remote.size)
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("[o]", Style::default().fg(theme::RED)),
                Span::raw(" overwrite   "),
                Span::styled("[s]", Style::default().fg(theme::YELLOW)),
                Span::raw(" skip   "),
                Span::styled("[r]", Style::default().fg(theme::GREEN)),
                Span::raw(" rename"),
            ]),
        ];

        let paragraph = Paragraph::new(text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Conflict ")
                    .title_alignment(Alignment::Center)
                    .border_style(Style::default().fg(theme::ORANGE))
                    .style(theme::base_style()),
            )
            .wrap(Wrap { trim: false });

        frame.render_widget(paragraph, overlay_area);
    }
}
