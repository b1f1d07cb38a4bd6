use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    handler::{Context, Handler},
    handlers::registered_user,
    services::{TicketService, UserDirectory},
    Result,
};

const USAGE: &str = "To contact support send:\n/contact subject:message\n\n\
                     For example:\n/contact Wifi:There is no internet in dorm 3";

/// `subject:message`, both parts trimmed and non-empty.
fn parse_contact(args: &str) -> Option<(&str, &str)> {
    let (subject, message) = args.split_once(':')?;
    let (subject, message) = (subject.trim(), message.trim());
    if subject.is_empty() || message.is_empty() {
        return None;
    }
    Some((subject, message))
}

/// `/contact subject:message` opens a support ticket.
pub struct ContactHandler {
    users: Arc<dyn UserDirectory>,
    tickets: Arc<dyn TicketService>,
}

impl ContactHandler {
    pub fn new(users: Arc<dyn UserDirectory>, tickets: Arc<dyn TicketService>) -> Self {
        Self { users, tickets }
    }
}

#[async_trait]
impl Handler for ContactHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let Some(user) = registered_user(cx, self.users.as_ref()).await? else {
            return Ok(());
        };
        let Some((subject, message)) = parse_contact(&cx.args) else {
            return cx.reply_text(USAGE).await;
        };
        let ticket = self.tickets.create(user.id, subject, message).await?;
        info!(ticket_id = ticket.id, user_id = user.id.0, "ticket created");
        cx.reply_text(format!(
            "✅ Ticket #{} created. Support will get back to you soon.\nTrack it with /mytickets.",
            ticket.id
        ))
        .await
    }
}
