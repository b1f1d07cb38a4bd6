use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{Recipient, UserId},
    errors::Error,
    messaging::{Event, EventKind, Outbound, Responder},
    state::ConversationState,
    Result,
};

/// Everything a handler sees for one event.
///
/// `state` is the caller's copy; whatever the handler leaves in it is what the
/// dispatcher persists.
pub struct Context<'a> {
    pub event: &'a Event,
    pub command: String,
    pub args: String,
    pub state: &'a mut ConversationState,
    pub responder: &'a dyn Responder,
    pub now: DateTime<Utc>,
    answered: bool,
}

impl<'a> Context<'a> {
    pub fn new(
        event: &'a Event,
        command: String,
        args: String,
        state: &'a mut ConversationState,
        responder: &'a dyn Responder,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            command,
            args,
            state,
            responder,
            now,
            answered: false,
        }
    }

    pub fn user_id(&self) -> Result<UserId> {
        self.event
            .user_id
            .ok_or_else(|| Error::Routing("event carries no user id".to_string()))
    }

    pub fn sender_name(&self) -> &str {
        self.event.sender_name.as_deref().unwrap_or("")
    }

    pub fn is_callback(&self) -> bool {
        matches!(self.event.kind, EventKind::Callback { .. })
    }

    /// Send a new message back to where the event came from.
    pub async fn reply(&self, message: Outbound) -> Result<()> {
        self.responder.send(self.event.recipient, message).await?;
        Ok(())
    }

    pub async fn reply_text(&self, text: impl Into<String> + Send) -> Result<()> {
        self.reply(Outbound::text(text)).await
    }

    /// Replace the message a button was pressed on; plain reply otherwise.
    pub async fn show(&self, message: Outbound) -> Result<()> {
        match (self.is_callback(), self.event.source_message) {
            (true, Some(msg)) => self.responder.edit(msg, message).await,
            _ => self.reply(message).await,
        }
    }

    /// Message someone other than the sender.
    pub async fn notify(&self, user: UserId, message: Outbound) -> Result<()> {
        self.responder.send(Recipient::User(user), message).await?;
        Ok(())
    }

    /// Acknowledge the pressed button with an optional toast.
    pub async fn ack(&mut self, text: Option<&str>) -> Result<()> {
        let EventKind::Callback { id, .. } = &self.event.kind else {
            return Ok(());
        };
        if self.answered {
            return Ok(());
        }
        self.answered = true;
        self.responder.answer_callback(id, text).await
    }

    pub fn answered(&self) -> bool {
        self.answered
    }
}

/// One unit of bot behaviour.
///
/// Callback handlers get the payload in `args` and an empty `command`;
/// step-owned free text arrives the same way.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()>;
}
