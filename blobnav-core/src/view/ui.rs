//! src/view/ui.rs
//! ============================================================================
//! # View: Frame Layout
//!
//! Draws the whole screen from the controller's read-only state:
//! breadcrumb header, item table, transfer panel, prompt line, status bar,
//! then the help or conflict overlay on top.

use ratatui::{
    prelude::*,
    widgets::{Block, Paragraph},
};

use crate::{
    controller::app_controller::AppController,
    model::ui_state::UIMode,
    view::{
        components::{
            conflict_overlay::ConflictOverlay, help_overlay::HelpOverlay,
            object_table::ObjectTable, prompt_bar::PromptBar, status_bar::StatusBar,
            transfer_panel::TransferPanel,
        },
        theme,
    },
};

pub struct View;

impl View {
    pub fn redraw(frame: &mut Frame<'_>, app: &AppController) {
        let ui = app.ui();
        let navigator = app.navigator();

        frame.render_widget(Block::default().style(theme::base_style()), frame.area());

        let prompt_height = u16::from(ui.is_prompt_active());
        let [header, body, transfers, prompt, status] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(TransferPanel::height(ui.transfers.len())),
            Constraint::Length(prompt_height),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        Self::draw_header(frame, app, header);
        ObjectTable::render(frame, navigator, body);

        if !ui.transfers.is_empty() {
            TransferPanel::render(frame, &ui.transfers, transfers);
        }
        if ui.is_prompt_active() {
            PromptBar::render(frame, ui, prompt);
        }
        StatusBar::render(frame, ui, navigator, status);

        match ui.mode {
            UIMode::Help => HelpOverlay::render(frame, app.bindings(), frame.area()),
            UIMode::Conflict => {
                if let Some(conflict) = &ui.conflict {
                    ConflictOverlay::render(frame, conflict, frame.area());
                }
            }
            _ => {}
        }
    }

    fn draw_header(frame: &mut Frame<'_>, app: &AppController, area: Rect) {
        let navigator = app.navigator();
        let mut spans = vec![Span::styled(
            format!(" {} ", navigator.state().breadcrumb),
            theme::title_style(),
        )];

        if let Some(error) = navigator.last_error() {
            spans.push(Span::styled(
                format!(" ! {error}"),
                Style::default().fg(theme::RED),
            ));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}

/// `percent_x` by `percent_y` rectangle centred in `area`.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let [_, middle, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(area);

    let [_, center, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(middle);

    center
}
