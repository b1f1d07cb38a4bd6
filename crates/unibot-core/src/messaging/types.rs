use crate::domain::{MessageRef, Recipient, UserId};

/// Normalized inbound event.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub struct Event {
    /// `None` for events the messenger could not attribute to a user; those
    /// are dispatched but never persisted.
    pub user_id: Option<UserId>,
    pub recipient: Recipient,
    pub sender_name: Option<String>,
    pub kind: EventKind,
    pub source_message: Option<MessageRef>,
}

#[derive(Clone, Debug)]
pub enum EventKind {
    /// Typed text (or a caption) with an optional attached file id.
    Message {
        text: String,
        attachment: Option<String>,
    },
    Callback {
        id: String,
        payload: String,
    },
}

impl Event {
    pub fn text(&self) -> &str {
        match &self.kind {
            EventKind::Message { text, .. } => text,
            EventKind::Callback { .. } => "",
        }
    }

    pub fn attachment(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Message { attachment, .. } => attachment.as_deref(),
            EventKind::Callback { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextFormat {
    #[default]
    Plain,
    Markdown,
}

/// Something to render: text, optional keyboard, optional file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outbound {
    pub text: String,
    pub format: TextFormat,
    pub keyboard: Option<InlineKeyboard>,
    /// Messenger file id to attach; `text` becomes the caption.
    pub file: Option<String>,
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Markdown,
            ..Self::default()
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file = Some(file_id.into());
        self
    }
}

/// Inline keyboard, row by row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn button(self, label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        self.row(vec![InlineButton::new(label, callback_data)])
    }

    /// Every payload on the keyboard, in render order.
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
    }
}
