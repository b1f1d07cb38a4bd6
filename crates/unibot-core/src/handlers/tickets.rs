//! `/tickets`: staff side of support.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    handler::{Context, Handler},
    handlers::{callback_action, parse_id, prompt_again, user_with_role},
    messaging::{InlineKeyboard, Outbound},
    services::{Role, Ticket, TicketService, TicketStatus, UserDirectory},
    state::steps,
    wizard::{Input, Outcome, Step, Wizard},
    Result,
};

const FEATURE: &str = "ticket";
const TICKET_ID: &str = "ticket_id";

/// Plain-text rendering shared with `/mytickets`.
pub(crate) fn describe(ticket: &Ticket, author: Option<&str>) -> String {
    let mut out = format!(
        "🎫 Ticket #{}\nStatus: {}\nSubject: {}\n",
        ticket.id, ticket.status, ticket.subject
    );
    if let Some(author) = author {
        out.push_str(&format!("From: {author}\n"));
    }
    out.push_str(&format!(
        "Created: {}\n\n{}",
        ticket.created_at.format("%d.%m.%Y %H:%M"),
        ticket.message
    ));
    if let Some(response) = &ticket.response {
        out.push_str(&format!("\n\n💬 Support answer:\n{response}"));
    }
    for reply in &ticket.user_replies {
        out.push_str(&format!("\n\n↩️ Reply from author:\n{reply}"));
    }
    out
}

fn reply_wizard() -> Wizard {
    Wizard::new("ticket_reply").step(Step::text(
        steps::TICKET_REPLY,
        "response",
        Box::new(|st, _| {
            Outbound::text(format!(
                "✏️ Type your answer to ticket #{}:",
                st.get(TICKET_ID).unwrap_or("?")
            ))
        }),
    ))
}

pub struct TicketsHandler {
    users: Arc<dyn UserDirectory>,
    tickets: Arc<dyn TicketService>,
    wizard: Wizard,
}

impl TicketsHandler {
    pub fn new(users: Arc<dyn UserDirectory>, tickets: Arc<dyn TicketService>) -> Self {
        Self {
            users,
            tickets,
            wizard: reply_wizard(),
        }
    }

    async fn list(&self, cx: &mut Context<'_>) -> Result<()> {
        let open: Vec<Ticket> = self
            .tickets
            .list()
            .await?
            .into_iter()
            .filter(|t| t.status.is_open())
            .collect();
        if open.is_empty() {
            return cx.show(Outbound::text("📭 No open tickets.")).await;
        }
        let keyboard = open.iter().fold(InlineKeyboard::new(), |kb, t| {
            kb.button(
                format!("#{} {} ({})", t.id, t.subject, t.status),
                format!("ticket:view:{}", t.id),
            )
        });
        cx.show(Outbound::text(format!("🎫 Open tickets: {}", open.len())).with_keyboard(keyboard))
            .await
    }

    async fn view(&self, cx: &mut Context<'_>, id: u64) -> Result<()> {
        let Some(ticket) = self.tickets.get(id).await? else {
            return cx.ack(Some("Ticket not found")).await;
        };
        let author = self.users.get(ticket.user_id).await?.map(|u| u.full_name());

        let mut keyboard = InlineKeyboard::new();
        let awaiting_staff = ticket.response.is_none() || ticket.status == TicketStatus::InProgress;
        if ticket.status.is_open() && awaiting_staff {
            keyboard = keyboard.button("✏️ Reply", format!("ticket:reply:{id}"));
        }
        if ticket.status.is_open() {
            keyboard = keyboard.button("✅ Close", format!("ticket:close:{id}"));
        }
        keyboard = keyboard.button("⬅️ All tickets", "ticket:list");

        cx.show(Outbound::text(describe(&ticket, author.as_deref())).with_keyboard(keyboard))
            .await
    }

    async fn start_reply(&self, cx: &mut Context<'_>, id: u64) -> Result<()> {
        match self.tickets.get(id).await? {
            Some(t) if t.status.is_open() => {
                self.wizard.start(cx.state, &[(TICKET_ID, &id.to_string())]);
                prompt_again(cx, &self.wizard, None).await
            }
            Some(_) => cx.ack(Some("Ticket is already closed")).await,
            None => cx.ack(Some("Ticket not found")).await,
        }
    }

    async fn close(&self, cx: &mut Context<'_>, id: u64) -> Result<()> {
        let Some(ticket) = self.tickets.get(id).await? else {
            return cx.ack(Some("Ticket not found")).await;
        };
        self.tickets.update_status(id, TicketStatus::Closed).await?;
        info!(ticket_id = id, "ticket closed");

        let note = Outbound::text(format!(
            "🔒 Your ticket #{id} \"{}\" was closed by support.",
            ticket.subject
        ));
        if let Err(e) = cx.notify(ticket.user_id, note).await {
            warn!(ticket_id = id, error = %e, "failed to notify ticket author");
        }
        cx.show(Outbound::text(format!("✅ Ticket #{id} closed."))).await
    }

    async fn on_text(&self, cx: &mut Context<'_>) -> Result<()> {
        let manager = cx.user_id()?;
        let text = cx.args.clone();
        let outcome = self.wizard.apply(
            cx.state,
            Input::Text {
                text: &text,
                file: None,
            },
            cx.now,
        );
        match outcome {
            Outcome::Ready => {}
            Outcome::Rejected(msg) => return prompt_again(cx, &self.wizard, Some(msg.as_str())).await,
            _ => return prompt_again(cx, &self.wizard, None).await,
        }

        let Some(id) = cx.state.get(TICKET_ID).and_then(parse_id) else {
            self.wizard.cancel(cx.state);
            return cx.reply_text("Lost track of the ticket. Open it again from /tickets.").await;
        };
        let response = cx.state.get("response").unwrap_or_default().to_string();
        let ticket = self.tickets.add_response(id, &response, manager).await?;
        self.wizard.finish(cx.state);
        info!(ticket_id = id, manager = manager.0, "ticket answered");

        let note = Outbound::text(format!(
            "📬 Support answered your ticket #{id} \"{}\":\n\n{response}\n\nYou can reply from /mytickets.",
            ticket.subject
        ));
        if let Err(e) = cx.notify(ticket.user_id, note).await {
            warn!(ticket_id = id, error = %e, "failed to notify ticket author");
        }
        cx.reply_text(format!("✅ Answer sent to ticket #{id}.")).await
    }
}

#[async_trait]
impl Handler for TicketsHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        if user_with_role(cx, self.users.as_ref(), &[Role::Manager])
            .await?
            .is_none()
        {
            return Ok(());
        }

        if cx.is_callback() {
            let action = callback_action(&cx.args, FEATURE).to_string();
            let (verb, id) = action.split_once(':').unwrap_or((action.as_str(), ""));
            return match (verb, parse_id(id)) {
                ("list", _) => self.list(cx).await,
                ("view", Some(id)) => self.view(cx, id).await,
                ("reply", Some(id)) => self.start_reply(cx, id).await,
                ("close", Some(id)) => self.close(cx, id).await,
                _ => cx.ack(Some("Action not recognized")).await,
            };
        }
        if cx.command.is_empty() && self.wizard.owns(cx.state) {
            return self.on_text(cx).await;
        }
        self.list(cx).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        domain::UserId,
        services::{InMemoryTicketService, InMemoryUserDirectory, NewUser},
        state::ConversationState,
        testing::{callback, message, run, FakeResponder, Sent},
    };

    const MANAGER: i64 = 1;
    const STUDENT: i64 = 2;

    struct Fixture {
        handler: TicketsHandler,
        tickets: Arc<InMemoryTicketService>,
        responder: FakeResponder,
        state: ConversationState,
    }

    async fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserDirectory::new());
        for (id, role) in [(MANAGER, Role::Manager), (STUDENT, Role::Student)] {
            users
                .create(NewUser {
                    id: UserId(id),
                    first_name: format!("U{id}"),
                    last_name: "Test".into(),
                    age: 30,
                    gender: "female".into(),
                    email: format!("u{id}@uni.edu"),
                    role,
                })
                .await
                .unwrap();
        }
        let tickets = Arc::new(InMemoryTicketService::new());
        tickets
            .create(UserId(STUDENT), "Wifi", "No wifi in dorm 3")
            .await
            .unwrap();
        Fixture {
            handler: TicketsHandler::new(users, tickets.clone()),
            tickets,
            responder: FakeResponder::new(),
            state: ConversationState::new(Utc::now()),
        }
    }

    impl Fixture {
        async fn press(&mut self, user: i64, payload: &str) {
            let ev = callback(user, payload);
            run(&self.handler, &ev, "", payload, &mut self.state, &self.responder, Utc::now())
                .await
                .unwrap();
        }

        async fn text(&mut self, user: i64, text: &str) {
            let ev = message(user, text);
            run(&self.handler, &ev, "", text, &mut self.state, &self.responder, Utc::now())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn students_cannot_list_tickets() {
        let mut f = fixture().await;
        let ev = message(STUDENT, "/tickets");
        run(&f.handler, &ev, "/tickets", "", &mut f.state, &f.responder, Utc::now())
            .await
            .unwrap();
        assert!(f.responder.last_text().contains("only available"));
    }

    #[tokio::test]
    async fn manager_lists_open_tickets_with_view_buttons() {
        let mut f = fixture().await;
        let ev = message(MANAGER, "/tickets");
        run(&f.handler, &ev, "/tickets", "", &mut f.state, &f.responder, Utc::now())
            .await
            .unwrap();
        let Sent::Send(_, out) = f.responder.all().pop().unwrap() else {
            panic!("expected a send");
        };
        let kb = out.keyboard.unwrap();
        assert_eq!(kb.payloads().collect::<Vec<_>>(), vec!["ticket:view:1"]);
    }

    #[tokio::test]
    async fn reply_flow_answers_and_notifies_author() {
        let mut f = fixture().await;
        f.press(MANAGER, "ticket:view:1").await;
        assert!(f.responder.last_text().contains("No wifi"));

        f.press(MANAGER, "ticket:reply:1").await;
        assert_eq!(f.state.step, steps::TICKET_REPLY);
        assert_eq!(f.state.get(TICKET_ID), Some("1"));

        f.text(MANAGER, "Router rebooted").await;
        assert_eq!(f.state.step, steps::IDLE);
        assert!(f.state.data.is_empty());

        let t = f.tickets.get(1).await.unwrap().unwrap();
        assert_eq!(t.status, TicketStatus::Answered);
        assert_eq!(t.response.as_deref(), Some("Router rebooted"));
        assert_eq!(t.response_by, Some(UserId(MANAGER)));

        let to_author = f.responder.to_user(UserId(STUDENT));
        assert_eq!(to_author.len(), 1);
        assert!(to_author[0].text.contains("Router rebooted"));
    }

    #[tokio::test]
    async fn blank_reply_is_rejected() {
        let mut f = fixture().await;
        f.press(MANAGER, "ticket:reply:1").await;
        f.text(MANAGER, "   ").await;
        assert_eq!(f.state.step, steps::TICKET_REPLY);
        assert!(f.tickets.get(1).await.unwrap().unwrap().response.is_none());
    }

    #[tokio::test]
    async fn close_notifies_author() {
        let mut f = fixture().await;
        f.press(MANAGER, "ticket:close:1").await;
        assert_eq!(
            f.tickets.get(1).await.unwrap().unwrap().status,
            TicketStatus::Closed
        );
        assert!(f.responder.to_user(UserId(STUDENT))[0].text.contains("closed"));
    }

    #[tokio::test]
    async fn unreachable_author_does_not_fail_the_answer() {
        let mut f = fixture().await;
        f.responder.unreachable.lock().unwrap().push(UserId(STUDENT));
        f.press(MANAGER, "ticket:reply:1").await;
        f.text(MANAGER, "Done").await;
        assert!(f.responder.last_text().contains("Answer sent"));
    }
}
