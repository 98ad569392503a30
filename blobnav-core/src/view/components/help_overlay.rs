//! src/view/components/help_overlay.rs
//! Key reference built from the live binding table.

use crate::{
    controller::key_sequence::BindingTable,
    view::{theme, ui::centered_rect},
};
use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

pub struct HelpOverlay;

impl HelpOverlay {
    pub fn render(frame: &mut Frame<'_>, table: &BindingTable, area: Rect) {
        let overlay_area = centered_rect(60, 80, area);
        frame.render_widget(Clear, overlay_area);

        let heading = Style::default().fg(theme::YELLOW).add_modifier(Modifier::BOLD);
        let key_style = Style::default().fg(theme::CYAN);

        let mut lines = vec![Line::from(Span::styled("Key sequences", heading))];
        for (sequence, action) in table.iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {sequence:<8}"), key_style),
                Span::raw(action.label()),
            ]));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Keys", heading)));
        for (keys, what) in [
            ("Enter/→", "Open"),
            ("Bksp/←", "Up one level"),
            ("↑/↓", "Move (hold to repeat)"),
            ("PgDn/PgUp", "Next/previous page"),
            ("Home/End", "First/last item"),
            ("Esc", "Cancel"),
            ("Ctrl+C", "Quit"),
        ] {
            lines.push(Line::from(vec![
                Span::styled(format!("  {keys:<10}"), key_style),
                Span::raw(what),
            ]));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Commands", heading)));
        for (command, what) in [
            (":q", "Quit"),
            (":r", "Refresh"),
            (":dl <glob>", "Download matching blobs here"),
            (":cancel", "Cancel downloads"),
        ] {
            lines.push(Line::from(vec![
                Span::styled(format!("  {command:<12}"), key_style),
                Span::raw(what),
            ]));
        }

        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .title_alignment(Alignment::Center)
                .border_style(Style::default().fg(theme::PURPLE))
                .style(theme::base_style()),
        );

        frame.render_widget(paragraph, overlay_area);
    }
}
