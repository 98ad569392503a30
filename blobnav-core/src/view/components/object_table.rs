//! src/view/components/object_table.rs

use crate::{
    model::navigation::{ItemKind, NavigationItem},
    operators::navigator::PaginatedNavigator,
    util::humanize::human_readable_size,
    view::{icons, theme},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, HighlightSpacing, Row, Table, TableState},
};

pub struct ObjectTable;

impl ObjectTable {
    pub fn render(frame: &mut Frame<'_>, navigator: &PaginatedNavigator, area: Rect) {
        let header = Row::new(vec!["Name", "Size", "Modified"])
            .style(Style::default().fg(theme::YELLOW).bold())
            .bottom_margin(1);

        let rows: Vec<Row> = navigator.items().iter().map(Self::row).collect();

        let widths = [
            Constraint::Fill(1),
            Constraint::Length(12),
            Constraint::Length(18),
        ];

        let mut table_state = TableState::default().with_selected(
            (!navigator.items().is_empty()).then_some(navigator.state().selected_index),
        );

        let title = if navigator.items().is_empty() {
            " (empty) ".to_string()
        } else {
            format!(" {} items ", navigator.items().len())
        };

        let table = Table::new(rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .title_style(theme::title_style())
                    .border_style(theme::border_style())
                    .style(Style::default().bg(theme::BACKGROUND)),
            )
            .row_highlight_style(theme::highlight_style())
            .highlight_symbol("▶ ")
            .highlight_spacing(HighlightSpacing::Always);

        frame.render_stateful_widget(table, area, &mut table_state);
    }

    fn row(item: &NavigationItem) -> Row<'static> {
        let (icon, style) = match item.kind {
            ItemKind::Container => (icons::CONTAINER_ICON, Style::default().fg(theme::PURPLE)),
            ItemKind::VirtualDirectory => (icons::FOLDER_ICON, Style::default().fg(theme::CYAN)),
            ItemKind::Blob => (icons::FILE_ICON, Style::default().fg(theme::FOREGROUND)),
        };

        let size = item.size.map(human_readable_size).unwrap_or_default();
        let modified = item
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        Row::new(vec![
            Cell::from(format!("{icon} {}", item.name)),
            Cell::from(size),
            Cell::from(modified),
        ])
        .style(style)
    }
}
