use crossterm::event::{Event, KeyCode, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Position, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use crate::widgets::theme::Theme;

/// Single-line text input. The cursor counts characters, not bytes, so
/// Cyrillic and other multi-byte text edits correctly.
#[derive(Debug, Default, Clone)]
pub struct TextInput {
    label: String,
    placeholder: String,
    value: String,
    cursor: usize,
    active: bool,
}

impl TextInput {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self {
            label: label.into(),
            placeholder: String::new(),
            value,
            cursor,
            active: false,
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.cursor = self.cursor.min(self.len());
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    fn byte_index(&self, cursor: usize) -> usize {
        self.value
            .char_indices()
            .nth(cursor)
            .map_or(self.value.len(), |(index, _)| index)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let border = if self.active {
            theme.accent()
        } else {
            theme.border()
        };
        let block = Block::bordered()
            .title(self.label.as_str())
            .style(Style::default().bg(theme.panel_bg_alt()).fg(theme.text()))
            .border_style(Style::default().fg(border));
        let value = if self.value.is_empty() && !self.placeholder.is_empty() {
            Span::styled(self.placeholder.as_str(), Style::default().fg(theme.text_muted()))
        } else {
            Span::styled(self.value.as_str(), Style::default().fg(theme.text()))
        };
        frame.render_widget(Paragraph::new(Line::from(value)).block(block), area);

        if self.active {
            let before = &self.value[..self.byte_index(self.cursor)];
            let offset = before.width().min(area.width.saturating_sub(3) as usize) as u16;
            frame.set_cursor_position(Position::new(area.x + offset + 1, area.y + 1));
        }
    }

    /// Edits the value and reports whether the key was consumed and whether
    /// the text changed.
    pub fn handle_event(&mut self, event: &Event) -> Handled {
        if !self.active {
            return Handled::No;
        }
        let Some(key) = event.as_key_press_event() else {
            return Handled::No;
        };
        let len = self.len();
        match key.code {
            KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.cursor = 0;
            }
            KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.cursor = len;
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if self.value.is_empty() {
                    return Handled::Moved;
                }
                self.clear();
                return Handled::Changed;
            }
            KeyCode::Char(_) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Handled::No;
            }
            KeyCode::Char(c) => {
                let index = self.byte_index(self.cursor);
                self.value.insert(index, c);
                self.cursor += 1;
                return Handled::Changed;
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    let index = self.byte_index(self.cursor - 1);
                    self.value.remove(index);
                    self.cursor -= 1;
                    return Handled::Changed;
                }
            }
            KeyCode::Delete => {
                if self.cursor < len {
                    let index = self.byte_index(self.cursor);
                    self.value.remove(index);
                    return Handled::Changed;
                }
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(len);
            }
            KeyCode::Home => {
                self.cursor = 0;
            }
            KeyCode::End => {
                self.cursor = len;
            }
            _ => return Handled::No,
        }
        Handled::Moved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    No,
    Moved,
    Changed,
}

impl Handled {
    pub fn consumed(self) -> bool {
        self != Handled::No
    }
}
