use std::borrow::Cow;

use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

mod widget;

pub use widget::Widget;

use crate::widgets::theme::Theme;

/// One key binding as shown in the help bar and the help popup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<'a> {
    pub keys: Cow<'a, str>,
    pub short: Cow<'a, str>,
    pub long: Cow<'a, str>,
}

impl<'a> Entry<'a> {
    pub const fn new(keys: &'a str, short: &'a str, long: &'a str) -> Self {
        Self {
            keys: Cow::Borrowed(keys),
            short: Cow::Borrowed(short),
            long: Cow::Borrowed(long),
        }
    }

    fn to_owned_entry(&self) -> Entry<'static> {
        Entry {
            keys: Cow::Owned(self.keys.to_string()),
            short: Cow::Owned(self.short.to_string()),
            long: Cow::Owned(self.long.to_string()),
        }
    }
}

fn make_spans<'a>(entries: &[&'a Entry<'a>], theme: &Theme) -> Vec<Span<'a>> {
    let mut spans: Vec<_> = entries
        .iter()
        .filter(|entry| !entry.keys.is_empty())
        .flat_map(|entry| {
            [
                Span::styled(format!("[{}]", entry.keys), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::raw(entry.short.as_ref()),
                Span::styled(" • ", Style::default().fg(theme.text_muted())),
            ]
        })
        .collect();
    // Drop the trailing separator
    spans.pop();
    spans
}

/// Rows the help bar needs to show every entry in `area`.
pub fn height(entries: &[&Entry<'_>], area: Rect, theme: &Theme) -> u16 {
    let total_width: usize = make_spans(entries, theme)
        .iter()
        .map(|span| span.content.width())
        .sum();
    let available_width = (area.width as usize).max(1);
    total_width.div_ceil(available_width) as u16
}

pub fn render(entries: &[&Entry<'_>], frame: &mut Frame, area: Rect, theme: &Theme) {
    let spans = make_spans(entries, theme);
    let footer = Paragraph::new(Line::from(spans))
        .style(Style::default().fg(theme.text()))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRIES: [Entry<'static>; 2] = [
        Entry::new("n", "new", "Create a record"),
        Entry::new("q", "quit", "Quit"),
    ];

    #[test]
    fn spans_are_separated_without_a_trailing_bullet() {
        let theme = Theme::for_mode(crate::widgets::theme::Mode::Dark);
        let fixture = ENTRIES;
        let entries: Vec<_> = fixture.iter().collect();
        let text: String = make_spans(&entries, &theme)
            .iter()
            .map(|span| span.content.as_ref())
            .collect();
        assert_eq!(text, "[n] new • [q] quit");
    }

    #[test]
    fn height_wraps_to_the_available_width() {
        let theme = Theme::for_mode(crate::widgets::theme::Mode::Dark);
        let fixture = ENTRIES;
        let entries: Vec<_> = fixture.iter().collect();
        assert_eq!(height(&entries, Rect::new(0, 0, 80, 1), &theme), 1);
        assert_eq!(height(&entries, Rect::new(0, 0, 9, 1), &theme), 2);
    }
}
