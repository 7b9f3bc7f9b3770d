use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{App, HabitInput, ReminderField, UiMode, ui_helpers};

impl App {
    pub(super) fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        match self.ui_mode {
            UiMode::Main => return self.handle_normal_key(key),
            UiMode::HabitInput(purpose) => self.handle_habit_input_key(key, purpose),
            UiMode::ConfirmRemove => self.handle_confirm_key(key),
            UiMode::Reminders => self.handle_reminders_key(key),
            UiMode::ReminderInput(field) => self.handle_reminder_input_key(key, field),
        }
        self.render_needed = true;
        false
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        let count = self.tracker.habit_count();
        self.notice = None;

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_index = ui_helpers::wrap_prev_index(self.selected_index, count);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected_index = ui_helpers::wrap_next_index(self.selected_index, count);
            }
            KeyCode::Char(' ') | KeyCode::Enter => self.cycle_selected(),
            KeyCode::Char(digit @ '0'..='2') => {
                if let Some(status) = ui_helpers::status_for_digit(digit) {
                    self.set_selected_status(status);
                }
            }
            KeyCode::Char('a') => {
                self.open_input(UiMode::HabitInput(HabitInput::Add), String::new())
            }
            KeyCode::Char('r') => {
                if let Some(name) = self.selected_habit().map(|habit| habit.name.clone()) {
                    self.open_input(UiMode::HabitInput(HabitInput::Rename), name);
                }
            }
            KeyCode::Char('x') | KeyCode::Delete => {
                if self.selected_habit().is_some() {
                    self.ui_mode = UiMode::ConfirmRemove;
                }
            }
            KeyCode::Char('m') => self.open_reminders(),
            KeyCode::Esc => {
                self.notifier.dismiss();
            }
            _ => {}
        }

        self.render_needed = true;
        false
    }

    fn handle_habit_input_key(&mut self, key: KeyEvent, purpose: HabitInput) {
        match key.code {
            KeyCode::Esc => self.close_input(),
            KeyCode::Enter => {
                let accepted = match purpose {
                    HabitInput::Add => self.submit_new_habit(),
                    HabitInput::Rename => self.submit_rename(),
                };
                if accepted {
                    self.notice = None;
                    self.close_input();
                }
            }
            KeyCode::Tab if purpose == HabitInput::Add => self.next_suggestion(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => {
                if ui_helpers::input_has_room(&self.input, ui_helpers::habit_input_limit()) {
                    self.input.push(c);
                }
            }
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
            self.remove_selected();
        }
        self.ui_mode = UiMode::Main;
    }

    fn handle_reminders_key(&mut self, key: KeyEvent) {
        let count = self.scheduler.items().len();

        match key.code {
            KeyCode::Esc | KeyCode::Char('m') | KeyCode::Char('q') => self.close_reminders(),
            KeyCode::Up | KeyCode::Char('k') => {
                self.reminder_index = ui_helpers::wrap_prev_index(self.reminder_index, count);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.reminder_index = ui_helpers::wrap_next_index(self.reminder_index, count);
            }
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle_selected_reminder(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.step_selected_interval(1),
            KeyCode::Char('-') | KeyCode::Char('_') => self.step_selected_interval(-1),
            KeyCode::Char('i') => {
                if let Some(minutes) = self.selected_reminder().map(|r| r.interval_minutes) {
                    self.open_input(
                        UiMode::ReminderInput(ReminderField::Interval),
                        minutes.to_string(),
                    );
                }
            }
            KeyCode::Char('t') => {
                if let Some(title) = self.selected_reminder().map(|r| r.title.clone()) {
                    self.open_input(UiMode::ReminderInput(ReminderField::Title), title);
                }
            }
            KeyCode::Char('b') => {
                if let Some(body) = self.selected_reminder().map(|r| r.body.clone()) {
                    self.open_input(UiMode::ReminderInput(ReminderField::Body), body);
                }
            }
            KeyCode::Char('a') => {
                self.open_input(UiMode::ReminderInput(ReminderField::New), String::new());
            }
            KeyCode::Char('x') | KeyCode::Delete => self.remove_selected_reminder(),
            _ => {}
        }
    }

    fn handle_reminder_input_key(&mut self, key: KeyEvent, field: ReminderField) {
        match key.code {
            KeyCode::Esc => self.close_input(),
            KeyCode::Enter => {
                if self.submit_reminder_field(field) {
                    self.notice = None;
                    self.close_input();
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => {
                let limit = ui_helpers::reminder_input_limit(field);
                if ui_helpers::input_has_room(&self.input, limit) {
                    self.input.push(c);
                }
            }
            _ => {}
        }
    }
}
