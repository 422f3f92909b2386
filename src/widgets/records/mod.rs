mod category_picker;
mod form;
mod widget;

pub use widget::RecordsWidget;
