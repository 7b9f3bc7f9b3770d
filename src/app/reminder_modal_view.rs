use ratatui::prelude::{Line, Span};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::{
    constants::STATUS_COLORS,
    reminders::{ReminderState, format_clock, now_millis},
};

use super::{App, time_format, view_style};

impl App {
    pub(super) fn render_reminder_modal(&self, f: &mut Frame, terminal_size: Rect) {
        let modal_rect = self.modal_rect(terminal_size);
        let now = now_millis();

        let border_color = if self.reminders_blocked() {
            Color::Red
        } else {
            STATUS_COLORS[2]
        };
        let title = match self.scheduler.next_due() {
            Some(due) => format!("reminders · next {}", format_clock(due)),
            None => "reminders".to_string(),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(Line::from(Span::styled(title, view_style::title_style())))
            .title_alignment(Alignment::Center)
            .border_style(Style::default().fg(border_color));
        let inner = block.inner(modal_rect);

        f.render_widget(Clear, modal_rect);
        f.render_widget(block, modal_rect);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(2),
                Constraint::Length(1),
            ])
            .split(inner);

        let title_width = (inner.width as usize / 3).max(8);
        let items: Vec<ListItem> = self
            .scheduler
            .items()
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let (marker, marker_color) = match item.state() {
                    ReminderState::Disabled => ("off", STATUS_COLORS[0]),
                    ReminderState::Pending => ("...", STATUS_COLORS[1]),
                    ReminderState::Armed { .. } => ("on ", STATUS_COLORS[2]),
                };
                let title = format!(
                    "{:<width$}",
                    self.truncate_label(&item.title, title_width),
                    width = title_width
                );
                let line = Line::from(vec![
                    Span::styled(format!(" {marker} "), Style::default().fg(marker_color)),
                    Span::styled(title, Style::default().fg(Color::White)),
                    Span::raw(format!(
                        " {:<14}",
                        time_format::format_interval(item.interval_minutes)
                    )),
                    Span::styled(self.reminder_schedule_label(item, now), view_style::hint_style()),
                ]);

                if i == self.reminder_index {
                    ListItem::new(line).style(Style::default().add_modifier(Modifier::REVERSED))
                } else {
                    ListItem::new(line)
                }
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(self.reminder_index));
        f.render_stateful_widget(
            List::new(items).highlight_style(Style::default()),
            rows[0],
            &mut list_state,
        );

        let detail = match (self.reminder_error(), self.selected_reminder()) {
            (Some(error), _) => Line::from(Span::styled(
                error.to_string(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            (None, Some(item)) if !item.body.is_empty() => Line::from(Span::styled(
                item.body.clone(),
                Style::default().add_modifier(Modifier::ITALIC),
            )),
            _ => Line::from(""),
        };
        f.render_widget(Paragraph::new(detail).wrap(Wrap { trim: true }), rows[1]);

        let hints = Line::from(Span::styled(
            "space on/off · +/- interval · i t b edit · a add · x remove · esc back",
            view_style::hint_style(),
        ));
        f.render_widget(Paragraph::new(hints), rows[2]);
    }
}
