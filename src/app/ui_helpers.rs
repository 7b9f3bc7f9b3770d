use crate::{
    constants::{HABIT_NAME_MAX_CHARS, REMINDER_LIMITS},
    domain::CompletionStatus,
};

use super::ReminderField;

pub fn wrap_prev_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if current == 0 {
        len - 1
    } else {
        current - 1
    }
}

pub fn wrap_next_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if current + 1 >= len {
        0
    } else {
        current + 1
    }
}

pub fn status_for_digit(digit: char) -> Option<CompletionStatus> {
    digit
        .to_digit(10)
        .and_then(|level| u8::try_from(level).ok())
        .and_then(CompletionStatus::from_level)
}

/// Leaves room for surrounding whitespace that is trimmed on save.
pub fn habit_input_limit() -> usize {
    HABIT_NAME_MAX_CHARS + 4
}

pub(super) fn reminder_input_limit(field: ReminderField) -> usize {
    match field {
        ReminderField::Interval => 6,
        ReminderField::Title | ReminderField::New => REMINDER_LIMITS.title_max_chars,
        ReminderField::Body => REMINDER_LIMITS.body_max_chars,
    }
}

pub fn input_has_room(input: &str, limit: usize) -> bool {
    input.chars().count() < limit
}

/// Keeps the tail of `value` visible when it is wider than the input box.
pub fn visible_tail(value: &str, width: usize) -> String {
    let count = value.chars().count();
    if count <= width {
        return value.to_string();
    }
    value.chars().skip(count - width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_prev_index_wraps_to_end() {
        assert_eq!(wrap_prev_index(0, 5), 4);
        assert_eq!(wrap_prev_index(3, 5), 2);
        assert_eq!(wrap_prev_index(0, 0), 0);
    }

    #[test]
    fn test_wrap_next_index_wraps_to_start() {
        assert_eq!(wrap_next_index(4, 5), 0);
        assert_eq!(wrap_next_index(1, 5), 2);
        assert_eq!(wrap_next_index(0, 0), 0);
    }

    #[test]
    fn test_status_digits_map_to_levels() {
        assert_eq!(status_for_digit('0'), Some(CompletionStatus::Empty));
        assert_eq!(status_for_digit('1'), Some(CompletionStatus::Partial));
        assert_eq!(status_for_digit('2'), Some(CompletionStatus::Full));
        assert_eq!(status_for_digit('7'), None);
    }

    #[test]
    fn test_input_room_counts_chars_not_bytes() {
        assert!(input_has_room("héllo", 6));
        assert!(!input_has_room("héllo", 5));
    }

    #[test]
    fn test_visible_tail_keeps_cursor_end() {
        assert_eq!(visible_tail("Drink Water", 20), "Drink Water");
        assert_eq!(visible_tail("Drink Water", 5), "Water");
    }
}
