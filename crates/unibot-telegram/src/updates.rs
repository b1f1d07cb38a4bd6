//! Telegram updates to core events.

use teloxide::types::{CallbackQuery, Message, User};
use unibot_core::{
    domain::{ChatId, MessageId, MessageRef, Recipient, UserId},
    messaging::{Event, EventKind},
};

fn user_id(user: &User) -> UserId {
    UserId(user.id.0 as i64)
}

fn recipient(chat_id: i64, private: bool, user: Option<UserId>) -> Recipient {
    match user {
        Some(uid) if private => Recipient::User(uid),
        _ => Recipient::Chat(ChatId(chat_id)),
    }
}

/// Text (or caption) plus the file id of an attached document or the largest
/// photo. Returns `None` for updates with neither, such as stickers.
pub fn message_event(msg: &Message) -> Option<Event> {
    let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();
    let attachment = msg
        .document()
        .map(|d| d.file.id.clone())
        .or_else(|| msg.photo().and_then(|p| p.last()).map(|p| p.file.id.clone()));
    if text.is_empty() && attachment.is_none() {
        return None;
    }

    let from = msg.from();
    let uid = from.map(user_id);
    Some(Event {
        user_id: uid,
        recipient: recipient(msg.chat.id.0, msg.chat.is_private(), uid),
        sender_name: from.map(|u| u.first_name.clone()),
        kind: EventKind::Message {
            text: text.to_string(),
            attachment,
        },
        source_message: Some(MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        }),
    })
}

/// Callback queries always carry a sender; the originating message, when
/// Telegram still has it, becomes `source_message`.
pub fn callback_event(q: &CallbackQuery) -> Event {
    let uid = user_id(&q.from);
    let source = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    let to = match &q.message {
        Some(m) => recipient(m.chat.id.0, m.chat.is_private(), Some(uid)),
        None => Recipient::User(uid),
    };
    Event {
        user_id: Some(uid),
        recipient: to,
        sender_name: Some(q.from.first_name.clone()),
        kind: EventKind::Callback {
            id: q.id.clone(),
            payload: q.data.clone().unwrap_or_default(),
        },
        source_message: source,
    }
}
