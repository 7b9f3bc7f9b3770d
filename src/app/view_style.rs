use ratatui::style::{Color, Modifier, Style};

use crate::{constants::STATUS_COLORS, domain::CompletionStatus, sync::CloudStatus};

pub(super) fn status_color(status: CompletionStatus) -> Color {
    STATUS_COLORS[usize::from(status.level())]
}

pub(super) fn status_marker(status: CompletionStatus) -> &'static str {
    match status {
        CompletionStatus::Empty => "○",
        CompletionStatus::Partial => "◐",
        CompletionStatus::Full => "●",
    }
}

pub(super) fn text_color_for_bg(bg_color: Color) -> Color {
    if let Color::Rgb(r, g, b) = bg_color {
        let brightness = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
        if brightness > 128 {
            Color::Black
        } else {
            Color::White
        }
    } else {
        Color::White
    }
}

pub(super) fn cloud_status_style(status: CloudStatus, has_error: bool) -> Style {
    let color = match status {
        CloudStatus::Idle => Color::DarkGray,
        CloudStatus::Loading => Color::Yellow,
        CloudStatus::Ready if has_error => Color::Yellow,
        CloudStatus::Ready => Color::Green,
        CloudStatus::Error => Color::Red,
    };
    Style::default().fg(color)
}

/// Gauge color climbs from the "empty" tone to the "full" tone with the score.
pub(super) fn momentum_color(percent: u16) -> Color {
    match percent {
        0..=33 => STATUS_COLORS[0],
        34..=99 => STATUS_COLORS[1],
        _ => STATUS_COLORS[2],
    }
}

pub(super) fn hint_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

pub(super) fn title_style() -> Style {
    Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD)
}
