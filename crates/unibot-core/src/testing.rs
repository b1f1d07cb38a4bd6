//! Fakes shared by the unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, MessageId, MessageRef, Recipient, UserId},
    handler::{Context, Handler},
    messaging::{Event, EventKind, Outbound, Responder},
    state::ConversationState,
    Result,
};

/// Handler that answers with its own name, so tests can see which one ran.
pub struct Named {
    pub name: &'static str,
}

impl Named {
    pub fn arc(name: &'static str) -> Arc<dyn Handler> {
        Arc::new(Self { name })
    }
}

#[async_trait]
impl Handler for Named {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        cx.reply_text(self.name).await
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    Send(Recipient, Outbound),
    Edit(MessageRef, Outbound),
    Delete(MessageRef),
    Answer(String, Option<String>),
}

#[derive(Default)]
pub struct FakeResponder {
    pub sent: Mutex<Vec<Sent>>,
    /// Sends to these users fail.
    pub unreachable: Mutex<Vec<UserId>>,
}

impl FakeResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of every sent or edited message, in order.
    pub fn texts(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Send(_, m) | Sent::Edit(_, m) => Some(m.text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> String {
        self.texts().pop().unwrap_or_default()
    }

    pub fn to_user(&self, user: UserId) -> Vec<Outbound> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Send(Recipient::User(u), m) if u == user => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Answer(id, text) => Some((id, text)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Responder for FakeResponder {
    async fn send(&self, to: Recipient, message: Outbound) -> Result<MessageRef> {
        if let Recipient::User(u) = to {
            if self.unreachable.lock().unwrap().contains(&u) {
                return Err(crate::Error::External(format!("user {u} blocked the bot")));
            }
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent::Send(to, message));
        Ok(MessageRef {
            chat_id: ChatId(1),
            message_id: MessageId(sent.len() as i32),
        })
    }

    async fn edit(&self, msg: MessageRef, message: Outbound) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Edit(msg, message));
        Ok(())
    }

    async fn delete(&self, msg: MessageRef) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Delete(msg));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Answer(callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

pub fn message(user: i64, text: &str) -> Event {
    Event {
        user_id: Some(UserId(user)),
        recipient: Recipient::Chat(ChatId(user)),
        sender_name: Some("Tester".to_string()),
        kind: EventKind::Message {
            text: text.to_string(),
            attachment: None,
        },
        source_message: None,
    }
}

pub fn file_message(user: i64, caption: &str, file_id: &str) -> Event {
    let mut ev = message(user, caption);
    ev.kind = EventKind::Message {
        text: caption.to_string(),
        attachment: Some(file_id.to_string()),
    };
    ev
}

pub fn callback(user: i64, payload: &str) -> Event {
    Event {
        user_id: Some(UserId(user)),
        recipient: Recipient::Chat(ChatId(user)),
        sender_name: Some("Tester".to_string()),
        kind: EventKind::Callback {
            id: format!("cb-{payload}"),
            payload: payload.to_string(),
        },
        source_message: Some(MessageRef {
            chat_id: ChatId(user),
            message_id: MessageId(100),
        }),
    }
}

/// Run a handler directly, the way the dispatcher would for a step-owned or
/// callback event, and return whatever it left in the state.
pub async fn run(
    handler: &dyn Handler,
    event: &Event,
    command: &str,
    args: &str,
    state: &mut ConversationState,
    responder: &FakeResponder,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut cx = Context::new(
        event,
        command.to_string(),
        args.to_string(),
        state,
        responder,
        now,
    );
    handler.handle(&mut cx).await
}
