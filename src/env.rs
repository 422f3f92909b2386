use std::{
    any::Any,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::widgets::{Popup, Widget};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetId {
    raw: u64,
    name: &'static str,
}

impl WidgetId {
    pub const ROOT: WidgetId = WidgetId {
        raw: 0,
        name: "root",
    };

    pub fn next<T: ?Sized>() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let name = std::any::type_name::<T>();
        Self {
            raw: NEXT.fetch_add(1, Ordering::Relaxed),
            name: name.rsplit("::").next().unwrap_or(name),
        }
    }
}

impl fmt::Debug for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.raw)
    }
}

/// An event addressed to one widget. Payloads are moved out with
/// [`AppEvent::downcast`].
pub struct AppEvent {
    target: WidgetId,
    payload: Box<dyn Any + Send>,
}

impl AppEvent {
    pub fn target(&self) -> WidgetId {
        self.target
    }

    pub fn downcast<T: Any>(self) -> Result<T, AppEvent> {
        match self.payload.downcast::<T>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(AppEvent {
                target: self.target,
                payload,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub duration: Duration,
}

pub enum Message {
    // Invalidate the current frame and request a redraw
    Invalidate,
    PushWidget(Box<dyn Widget>),
    SetPopup(Box<dyn Popup>),
    // Dismiss the popup, if it is still the one that asked
    DismissPopup(WidgetId),
    ShowToast(Toast),
    Event(AppEvent),
}

/// Handle a widget uses to talk to the application loop. Cheap to clone and
/// safe to move into background tasks.
#[derive(Clone)]
pub struct WidgetCtx {
    id: WidgetId,
    tx: UnboundedSender<Message>,
}

impl WidgetCtx {
    fn send(&self, msg: Message) {
        // The receiver only goes away when the app is shutting down.
        let _ = self.tx.send(msg);
    }

    pub fn invalidate(&self) {
        self.send(Message::Invalidate);
    }

    pub fn push_widget(&self, widget: Box<dyn Widget>) {
        self.send(Message::PushWidget(widget));
    }

    pub fn set_popup(&self, popup: Box<dyn Popup>) {
        self.send(Message::SetPopup(popup));
    }

    pub fn dismiss_popup(&self) {
        self.send(Message::DismissPopup(self.id));
    }

    pub fn show_toast(&self, toast: Toast) {
        self.send(Message::ShowToast(toast));
    }

    /// Delivers `payload` back to this widget's `on_self_event` on the UI
    /// task.
    pub fn emit_self<T: Any + Send>(&self, payload: T) {
        self.send(Message::Event(AppEvent {
            target: self.id,
            payload: Box::new(payload),
        }));
    }
}

pub struct Env {
    tx: UnboundedSender<Message>,
}

impl Env {
    pub fn new() -> (Self, UnboundedReceiver<Message>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
        (Env { tx }, rx)
    }

    pub fn ctx(&self, id: WidgetId) -> WidgetCtx {
        WidgetCtx {
            id,
            tx: self.tx.clone(),
        }
    }
}
