//! `/mytickets`: a user's own support tickets and replies to staff answers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    domain::UserId,
    handler::{Context, Handler},
    handlers::{callback_action, parse_id, prompt_again, registered_user, tickets::describe},
    messaging::{InlineKeyboard, Outbound},
    services::{Ticket, TicketService, User, UserDirectory},
    state::steps,
    wizard::{Input, Outcome, Step, Wizard},
    Result,
};

const FEATURE: &str = "myticket";
const TICKET_ID: &str = "ticket_id";

fn reply_wizard() -> Wizard {
    Wizard::new("ticket_user_reply").step(Step::text(
        steps::TICKET_USER_REPLY,
        "reply",
        Box::new(|st, _| {
            Outbound::text(format!(
                "✏️ Type your reply for ticket #{}:",
                st.get(TICKET_ID).unwrap_or("?")
            ))
        }),
    ))
}

pub struct MyTicketsHandler {
    users: Arc<dyn UserDirectory>,
    tickets: Arc<dyn TicketService>,
    wizard: Wizard,
}

impl MyTicketsHandler {
    pub fn new(users: Arc<dyn UserDirectory>, tickets: Arc<dyn TicketService>) -> Self {
        Self {
            users,
            tickets,
            wizard: reply_wizard(),
        }
    }

    /// The ticket, if it exists and belongs to `owner`.
    async fn own(&self, id: u64, owner: UserId) -> Result<Option<Ticket>> {
        Ok(self
            .tickets
            .get(id)
            .await?
            .filter(|t| t.user_id == owner))
    }

    async fn list(&self, cx: &mut Context<'_>, user: &User) -> Result<()> {
        let mine = self.tickets.list_by_user(user.id).await?;
        if mine.is_empty() {
            return cx
                .show(Outbound::text(
                    "You have no tickets yet. Create one with /contact subject:message",
                ))
                .await;
        }
        let keyboard = mine.iter().fold(InlineKeyboard::new(), |kb, t| {
            kb.button(
                format!("#{} {} ({})", t.id, t.subject, t.status),
                format!("myticket:view:{}", t.id),
            )
        });
        cx.show(Outbound::text(format!("🎫 Your tickets: {}", mine.len())).with_keyboard(keyboard))
            .await
    }

    async fn view(&self, cx: &mut Context<'_>, user: &User, id: u64) -> Result<()> {
        let Some(ticket) = self.own(id, user.id).await? else {
            return cx.ack(Some("Ticket not found")).await;
        };
        let mut keyboard = InlineKeyboard::new();
        if ticket.response.is_some() && ticket.status.is_open() {
            keyboard = keyboard.button("↩️ Reply", format!("myticket:reply:{id}"));
        }
        keyboard = keyboard.button("⬅️ My tickets", "myticket:list");
        cx.show(Outbound::text(describe(&ticket, None)).with_keyboard(keyboard))
            .await
    }

    async fn start_reply(&self, cx: &mut Context<'_>, user: &User, id: u64) -> Result<()> {
        match self.own(id, user.id).await? {
            Some(t) if t.response.is_some() && t.status.is_open() => {
                self.wizard.start(cx.state, &[(TICKET_ID, &id.to_string())]);
                prompt_again(cx, &self.wizard, None).await
            }
            Some(_) => cx.ack(Some("Nothing to reply to yet")).await,
            None => cx.ack(Some("Ticket not found")).await,
        }
    }

    async fn on_text(&self, cx: &mut Context<'_>, user: &User) -> Result<()> {
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
            return cx.reply_text("Lost track of the ticket. Open it again from /mytickets.").await;
        };
        if self.own(id, user.id).await?.is_none() {
            self.wizard.cancel(cx.state);
            return cx.reply_text("Ticket not found.").await;
        }
        let reply = cx.state.get("reply").unwrap_or_default().to_string();
        let ticket = self.tickets.add_user_reply(id, &reply).await?;
        self.wizard.finish(cx.state);
        info!(ticket_id = id, user_id = user.id.0, "ticket reply from author");

        if let Some(staff) = ticket.response_by {
            let note = Outbound::text(format!(
                "↩️ {} replied on ticket #{id} \"{}\":\n\n{reply}\n\nOpen /tickets to answer.",
                user.full_name(),
                ticket.subject
            ));
            if let Err(e) = cx.notify(staff, note).await {
                warn!(ticket_id = id, error = %e, "failed to notify support staff");
            }
        }
        cx.reply_text("✅ Your reply was sent to support.").await
    }
}

#[async_trait]
impl Handler for MyTicketsHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let Some(user) = registered_user(cx, self.users.as_ref()).await? else {
            return Ok(());
        };

        if cx.is_callback() {
            let action = callback_action(&cx.args, FEATURE).to_string();
            let (verb, id) = action.split_once(':').unwrap_or((action.as_str(), ""));
            return match (verb, parse_id(id)) {
                ("list", _) => self.list(cx, &user).await,
                ("view", Some(id)) => self.view(cx, &user, id).await,
                ("reply", Some(id)) => self.start_reply(cx, &user, id).await,
                _ => cx.ack(Some("Action not recognized")).await,
            };
        }
        if cx.command.is_empty() && self.wizard.owns(cx.state) {
            return self.on_text(cx, &user).await;
        }
        self.list(cx, &user).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        services::{InMemoryTicketService, InMemoryUserDirectory, NewUser, Role, TicketStatus},
        state::ConversationState,
        testing::{callback, message, run, FakeResponder},
    };

    const STAFF: i64 = 1;
    const AUTHOR: i64 = 2;
    const OTHER: i64 = 3;

    struct Fixture {
        handler: MyTicketsHandler,
        tickets: Arc<InMemoryTicketService>,
        responder: FakeResponder,
        state: ConversationState,
    }

    async fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserDirectory::new());
        for (id, role) in [
            (STAFF, Role::Manager),
            (AUTHOR, Role::Student),
            (OTHER, Role::Student),
        ] {
            users
                .create(NewUser {
                    id: UserId(id),
                    first_name: format!("U{id}"),
                    last_name: "Test".into(),
                    age: 21,
                    gender: "male".into(),
                    email: format!("u{id}@uni.edu"),
                    role,
                })
                .await
                .unwrap();
        }
        let tickets = Arc::new(InMemoryTicketService::new());
        let t = tickets
            .create(UserId(AUTHOR), "Grades", "My grade is missing")
            .await
            .unwrap();
        tickets
            .add_response(t.id, "Which course?", UserId(STAFF))
            .await
            .unwrap();
        tickets
            .create(UserId(AUTHOR), "Library", "Card lost")
            .await
            .unwrap();
        Fixture {
            handler: MyTicketsHandler::new(users, tickets.clone()),
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
    }

    #[tokio::test]
    async fn lists_only_own_tickets() {
        let mut f = fixture().await;
        let ev = message(OTHER, "/mytickets");
        run(&f.handler, &ev, "/mytickets", "", &mut f.state, &f.responder, Utc::now())
            .await
            .unwrap();
        assert!(f.responder.last_text().contains("no tickets"));
    }

    #[tokio::test]
    async fn other_users_cannot_view() {
        let mut f = fixture().await;
        f.press(OTHER, "myticket:view:1").await;
        assert_eq!(
            f.responder.answers(),
            vec![("cb-myticket:view:1".to_string(), Some("Ticket not found".to_string()))]
        );
    }

    #[tokio::test]
    async fn reply_needs_a_staff_answer_first() {
        let mut f = fixture().await;
        f.press(AUTHOR, "myticket:reply:2").await;
        assert_eq!(f.state.step, steps::IDLE);
    }

    #[tokio::test]
    async fn reply_reopens_and_notifies_staff() {
        let mut f = fixture().await;
        f.press(AUTHOR, "myticket:reply:1").await;
        assert_eq!(f.state.step, steps::TICKET_USER_REPLY);

        let ev = message(AUTHOR, "Physics 101");
        run(&f.handler, &ev, "", "Physics 101", &mut f.state, &f.responder, Utc::now())
            .await
            .unwrap();

        assert_eq!(f.state.step, steps::IDLE);
        let t = f.tickets.get(1).await.unwrap().unwrap();
        assert_eq!(t.status, TicketStatus::InProgress);
        assert_eq!(t.user_replies, vec!["Physics 101".to_string()]);
        let to_staff = f.responder.to_user(UserId(STAFF));
        assert_eq!(to_staff.len(), 1);
        assert!(to_staff[0].text.contains("Physics 101"));
    }
}
