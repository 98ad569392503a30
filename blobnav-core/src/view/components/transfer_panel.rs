//! src/view/components/transfer_panel.rs
//! One gauge per running transfer with throughput and ETA.

use crate::{
    model::ui_state::TransferView,
    util::humanize::{format_eta, format_rate, human_readable_size},
    view::theme,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Gauge},
};

pub struct TransferPanel;

impl TransferPanel {
    /// Rows needed for `count` transfers, borders included.
    pub fn height(count: usize) -> u16 {
        if count == 0 {
            0
        } else {
            (count.min(4) as u16) + 2
        }
    }

    pub fn render(frame: &mut Frame<'_>, transfers: &[TransferView], area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Transfers ")
            .title_style(theme::title_style())
            .border_style(theme::border_style())
            .style(Style::default().bg(theme::BACKGROUND));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::vertical(vec![Constraint::Length(1); transfers.len().min(4)]).split(inner);

        for (transfer, row) in transfers.iter().zip(rows.iter()) {
            let gauge = Gauge::default()
                .gauge_style(Style::default().fg(theme::GREEN).bg(theme::CURRENT_LINE))
                .ratio(transfer.ratio())
                .label(Self::label(transfer));
            frame.render_widget(gauge, *row);
        }
    }

    fn label(transfer: &TransferView) -> String {
        let mut label = transfer.label.clone();

        if let Some(batch) = &transfer.batch {
            label.push_str(&format!(
                " [{}/{}]",
                batch.files_completed, batch.files_total
            ));
        }

        if let Some(progress) = &transfer.progress {
            label.push_str(&format!(
                " {} / {} {} eta {}",
                human_readable_size(progress.bytes_transferred),
                human_readable_size(progress.total_bytes),
                format_rate(progress.bytes_per_second),
                format_eta(progress.eta),
            ));
        }

        label
    }
}
