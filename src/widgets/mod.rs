use crossterm::event::Event;
use ratatui::{Frame, layout::Rect};

pub mod confirm;
pub mod error;
pub mod input;
pub mod records;
pub mod role_picker;
pub mod theme;

pub use records::RecordsWidget;
pub use role_picker::RolePicker;

use crate::{
    env::{AppEvent, WidgetCtx, WidgetId},
    help,
};
use theme::Theme;

/// Identity shared by every widget: its own id and the widget that opened it.
pub struct WidgetInner {
    id: WidgetId,
    parent: WidgetId,
}

impl WidgetInner {
    pub fn new<T: ?Sized>(parent: WidgetId) -> Self {
        Self {
            id: WidgetId::next::<T>(),
            parent,
        }
    }

    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn parent(&self) -> WidgetId {
        self.parent
    }
}

pub trait Widget: Send {
    fn inner(&self) -> &WidgetInner;

    /// Start any background work. Called once, right after the widget is
    /// pushed.
    fn start(&self, _ctx: WidgetCtx) {}

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme);

    /// Handle input events. Returns true if the event was handled.
    fn handle_event(&self, _ctx: WidgetCtx, _event: &Event) -> bool {
        false
    }

    /// Optional help to display at the bottom while this widget is active
    fn help(&self) -> Option<&[help::Entry<'_>]> {
        None
    }

    /// Title shown in the header while the widget is on top.
    fn title(&self) -> Option<String> {
        None
    }

    /// Receives the payloads the widget emitted with
    /// [`WidgetCtx::emit_self`].
    fn on_self_event(&self, _ctx: WidgetCtx, _event: AppEvent) {}
}

pub trait Popup: Widget {
    fn rect(&self, area: Rect) -> Rect;
}

/// Centers a popup of `width` x `height` percent of `area`, bounded below by
/// `min_width` x `min_height` and above by the area minus a margin.
pub fn centered_rect(area: Rect, width: f32, height: f32, min_width: u16, min_height: u16) -> Rect {
    let width = (area.width as f32 * width) as u16;
    let height = (area.height as f32 * height) as u16;
    let width = width.max(min_width).min(area.width.saturating_sub(4));
    let height = height.max(min_height).min(area.height.saturating_sub(4));
    let x = area.x + (area.width - width) / 2;
    let y = area.y + (area.height - height) / 2;
    Rect {
        x,
        y,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_rect_respects_bounds() {
        let area = Rect::new(0, 0, 100, 40);
        let rect = centered_rect(area, 0.4, 0.2, 34, 7);
        assert_eq!(rect, Rect::new(30, 16, 40, 8));

        let small = Rect::new(0, 0, 30, 10);
        let rect = centered_rect(small, 0.4, 0.2, 34, 7);
        assert_eq!(rect.width, 26);
        assert_eq!(rect.height, 6);
    }
}
