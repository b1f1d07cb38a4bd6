//! Telegram adapter (teloxide).
//!
//! Implements the `unibot-core` `Responder` port over the Telegram Bot API and
//! turns incoming updates into core events.

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
};
use tokio::time::sleep;

pub mod router;
pub mod updates;

use unibot_core::{
    domain::{ChatId, MessageId, MessageRef, Recipient},
    errors::Error,
    messaging::{InlineKeyboard, Outbound, Responder, TextFormat},
    Result,
};

#[derive(Clone)]
pub struct TelegramResponder {
    bot: Bot,
}

impl TelegramResponder {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Private chats share the user's id.
    fn tg_recipient(to: Recipient) -> teloxide::types::ChatId {
        match to {
            Recipient::Chat(chat) => teloxide::types::ChatId(chat.0),
            Recipient::User(user) => teloxide::types::ChatId(user.0),
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn parse_mode(format: TextFormat) -> Option<ParseMode> {
        match format {
            TextFormat::Plain => None,
            #[allow(deprecated)]
            TextFormat::Markdown => Some(ParseMode::Markdown),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// One Telegram keyboard row per core keyboard row.
pub fn markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl Responder for TelegramResponder {
    async fn send(&self, to: Recipient, message: Outbound) -> Result<MessageRef> {
        let chat = Self::tg_recipient(to);
        let mode = Self::parse_mode(message.format);
        let keyboard = message.keyboard.as_ref().map(markup);

        let sent = match &message.file {
            Some(file_id) => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_document(chat, InputFile::file_id(file_id.clone()));
                    if !message.text.is_empty() {
                        req = req.caption(message.text.clone());
                    }
                    if let Some(mode) = mode {
                        req = req.parse_mode(mode);
                    }
                    if let Some(kb) = &keyboard {
                        req = req.reply_markup(kb.clone());
                    }
                    req
                })
                .await?
            }
            None => {
                self.with_retry(|| {
                    let mut req = self.bot.send_message(chat, message.text.clone());
                    if let Some(mode) = mode {
                        req = req.parse_mode(mode);
                    }
                    if let Some(kb) = &keyboard {
                        req = req.reply_markup(kb.clone());
                    }
                    req
                })
                .await?
            }
        };

        Ok(MessageRef {
            chat_id: ChatId(sent.chat.id.0),
            message_id: MessageId(sent.id.0),
        })
    }

    async fn edit(&self, msg: MessageRef, message: Outbound) -> Result<()> {
        let mode = Self::parse_mode(message.format);
        let keyboard = message.keyboard.as_ref().map(markup);
        self.with_retry(|| {
            let mut req = self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                message.text.clone(),
            );
            if let Some(mode) = mode {
                req = req.parse_mode(mode);
            }
            if let Some(kb) = &keyboard {
                req = req.reply_markup(kb.clone());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
