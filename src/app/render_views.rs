use ratatui::prelude::{Line, Span};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph},
};

use crate::sync::CloudStatus;

use super::{App, HabitInput, UiMode, ui_helpers, view_style};

impl App {
    pub(super) fn draw_frame(&mut self, f: &mut Frame) {
        let size = f.size();

        let cloud_label = match self.sync.status() {
            CloudStatus::Idle if self.services.remote.is_none() => "local only".to_string(),
            CloudStatus::Ready if self.sync.has_pending_push() => "cloud saving".to_string(),
            status => format!("cloud {}", status.label()),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(
                Line::from(Span::styled("PulseDaily", view_style::title_style()))
                    .alignment(Alignment::Left),
            )
            .title(
                Line::from(Span::styled(
                    self.today.format("%a, %b %-d").to_string(),
                    Style::default().fg(Color::White),
                ))
                .alignment(Alignment::Center),
            )
            .title(
                Line::from(Span::styled(
                    cloud_label,
                    view_style::cloud_status_style(self.sync.status(), self.sync.error().is_some()),
                ))
                .alignment(Alignment::Right),
            )
            .border_style(Style::default().fg(view_style::momentum_color(
                self.tracker.momentum_percent(),
            )));
        let inner = block.inner(size);
        f.render_widget(block, size);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(inner);

        self.render_momentum(f, rows[0]);
        self.render_checklist(f, rows[1]);
        self.render_footer(f, rows[2]);

        match self.ui_mode {
            UiMode::HabitInput(HabitInput::Add) => self.render_input_box(f, size, "New habit"),
            UiMode::HabitInput(HabitInput::Rename) => {
                self.render_input_box(f, size, "Rename habit")
            }
            UiMode::Reminders => self.render_reminder_modal(f, size),
            UiMode::ReminderInput(field) => {
                self.render_reminder_modal(f, size);
                self.render_input_box(f, size, field.label());
            }
            UiMode::Main | UiMode::ConfirmRemove => {}
        }
    }

    fn render_momentum(&self, f: &mut Frame, area: Rect) {
        let percent = self.tracker.momentum_percent();
        let label = format!(
            "{}/{} done · momentum {}%",
            self.tracker.completed_count(),
            self.tracker.habit_count(),
            percent
        );
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::BOTTOM).border_style(view_style::hint_style()))
            .gauge_style(
                Style::default()
                    .fg(view_style::momentum_color(percent))
                    .bg(Color::Black),
            )
            .percent(percent.min(100))
            .label(Span::styled(
                label,
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ));
        f.render_widget(gauge, area);
    }

    fn render_checklist(&self, f: &mut Frame, area: Rect) {
        if self.tracker.habit_count() == 0 {
            let empty = Paragraph::new(vec![
                Line::from(""),
                Line::from("No habits yet."),
                Line::from(Span::styled(
                    "Press a to add one, Tab inside the box for suggestions.",
                    view_style::hint_style(),
                )),
            ])
            .alignment(Alignment::Center);
            f.render_widget(empty, area);
            return;
        }

        let name_width = area.width.saturating_sub(4) as usize / 2;
        let items: Vec<ListItem> = self
            .tracker
            .habits()
            .iter()
            .enumerate()
            .map(|(i, habit)| {
                let status = self.tracker.status(&habit.id);
                let color = view_style::status_color(status);
                let name = format!(
                    "{:<width$}",
                    self.truncate_label(&habit.name, name_width),
                    width = name_width
                );
                let streak = self.streak_label(&habit.id);

                if i == self.selected_index {
                    let text_color = view_style::text_color_for_bg(color);
                    ListItem::new(Line::from(vec![
                        Span::raw(format!(" {} ", view_style::status_marker(status))),
                        Span::styled(name, Style::default().add_modifier(Modifier::BOLD)),
                        Span::raw(format!(" {streak}")),
                    ]))
                    .style(Style::default().fg(text_color).bg(color))
                } else {
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            format!(" {} ", view_style::status_marker(status)),
                            Style::default().fg(color),
                        ),
                        Span::styled(name, Style::default().fg(Color::White)),
                        Span::styled(format!(" {streak}"), view_style::hint_style()),
                    ]))
                }
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(self.selected_index));
        let list = List::new(items).highlight_style(Style::default());
        f.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_footer(&self, f: &mut Frame, area: Rect) {
        let line = if self.ui_mode == UiMode::ConfirmRemove {
            let name = self.selected_habit().map_or("", |habit| habit.name.as_str());
            Line::from(Span::styled(
                format!("Remove \"{name}\"? y to confirm, any other key to keep"),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ))
        } else if let Some(notice) = &self.notice {
            Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Red)))
        } else if let Some(banner) = self.notifier.banner() {
            Line::from(vec![
                Span::styled(
                    format!("\u{1F514} {}", banner.title),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("  {}", banner.body), Style::default().fg(Color::White)),
            ])
        } else if let Some(error) = self.sync.error() {
            Line::from(Span::styled(
                format!("Cloud sync: {error}"),
                Style::default().fg(Color::Red),
            ))
        } else {
            Line::from(Span::styled(
                "space cycle · 0-2 set · a add · r rename · x remove · m reminders · q quit",
                view_style::hint_style(),
            ))
        };
        f.render_widget(Paragraph::new(line), area);
    }

    /// Single-line text box centered over the current view.
    pub(super) fn render_input_box(&self, f: &mut Frame, terminal_size: Rect, title: &str) {
        let modal = self.modal_rect_ratio(terminal_size, 1, 2);
        let area = Rect::new(
            modal.x,
            modal.y + modal.height.saturating_sub(3) / 2,
            modal.width,
            3.min(terminal_size.height),
        );
        let visible_width = area.width.saturating_sub(3) as usize;

        let line = Line::from(vec![
            Span::raw(ui_helpers::visible_tail(&self.input, visible_width)),
            Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
        ]);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(Line::from(Span::styled(title.to_string(), view_style::title_style())))
            .title_alignment(Alignment::Center)
            .border_style(Style::default().fg(Color::White));

        f.render_widget(Clear, area);
        f.render_widget(Paragraph::new(line).block(block), area);
    }
}
