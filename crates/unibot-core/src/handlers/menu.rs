use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    handler::{Context, Handler},
    services::{Role, UserDirectory},
    Result,
};

const UNKNOWN_COMMAND: &str = "I don't know that command yet. Try /help to see what I can do.";

fn role_commands(role: Role) -> &'static [(&'static str, &'static str)] {
    match role {
        Role::Applicant => &[
            ("/help", "show this list"),
            ("/reminder", "personal reminders"),
        ],
        Role::Student => &[
            ("/help", "show this list"),
            ("/schedule", "today's lessons"),
            ("/myschedule", "your class schedule"),
            ("/deanery", "request documents from the dean's office"),
            ("/library", "order books from the library"),
            ("/moodle", "your Moodle account and courses"),
            ("/contact", "write to support: /contact subject:message"),
            ("/mytickets", "your support tickets"),
            ("/reminder", "personal reminders"),
        ],
        Role::Employee => &[
            ("/help", "show this list"),
            ("/schedule", "today's lessons"),
            ("/library_manage", "library desk: issue and take back books"),
            ("/contact", "write to support: /contact subject:message"),
            ("/mytickets", "your support tickets"),
            ("/reminder", "personal reminders"),
        ],
        Role::Manager => &[
            ("/help", "show this list"),
            ("/schedule", "today's lessons"),
            ("/library_manage", "library desk: issue and take back books"),
            ("/news", "latest news"),
            ("/send_news", "publish news to everyone"),
            ("/tickets", "open support tickets"),
            ("/documents", "pending document requests"),
            ("/contact", "write to support: /contact subject:message"),
            ("/reminder", "personal reminders"),
        ],
    }
}

fn command_list(role: Role) -> String {
    role_commands(role)
        .iter()
        .map(|(cmd, what)| format!("{cmd} - {what}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct StartHandler {
    users: Arc<dyn UserDirectory>,
}

impl StartHandler {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Handler for StartHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let user_id = cx.user_id()?;
        let text = match self.users.get(user_id).await? {
            None => "👋 Welcome! I'm the university assistant.\n\n\
                     You are not registered yet. Send /register to get started."
                .to_string(),
            Some(user) => format!(
                "👋 Hello, {}!\n\nYour role: {}\n\nWhat I can do for you:\n{}",
                user.first_name,
                user.role.label(),
                command_list(user.role)
            ),
        };
        cx.reply_text(text).await
    }
}

/// `/menu` and `/help`.
pub struct MenuHandler {
    users: Arc<dyn UserDirectory>,
}

impl MenuHandler {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Handler for MenuHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let user_id = cx.user_id()?;
        let Some(user) = self.users.get(user_id).await? else {
            return cx.reply_text(super::NOT_REGISTERED).await;
        };
        cx.reply_text(format!(
            "📋 Commands for {}:\n\n{}",
            user.role.label(),
            command_list(user.role)
        ))
        .await
    }
}

pub struct FallbackHandler;

#[async_trait]
impl Handler for FallbackHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        cx.reply_text(UNKNOWN_COMMAND).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        domain::UserId,
        services::{InMemoryUserDirectory, NewUser},
        state::ConversationState,
        testing::{message, run, FakeResponder},
    };

    async fn directory_with(role: Role) -> Arc<InMemoryUserDirectory> {
        let users = Arc::new(InMemoryUserDirectory::new());
        users
            .create(NewUser {
                id: UserId(5),
                first_name: "Ann".into(),
                last_name: "Lee".into(),
                age: 20,
                gender: "female".into(),
                email: "ann@uni.edu".into(),
                role,
            })
            .await
            .unwrap();
        users
    }

    #[tokio::test]
    async fn start_tells_strangers_to_register() {
        let h = StartHandler::new(Arc::new(InMemoryUserDirectory::new()));
        let r = FakeResponder::new();
        let mut st = ConversationState::new(Utc::now());
        run(&h, &message(5, "/start"), "/start", "", &mut st, &r, Utc::now())
            .await
            .unwrap();
        assert!(r.last_text().contains("/register"));
    }

    #[tokio::test]
    async fn start_greets_with_role_commands() {
        let h = StartHandler::new(directory_with(Role::Manager).await);
        let r = FakeResponder::new();
        let mut st = ConversationState::new(Utc::now());
        run(&h, &message(5, "/start"), "/start", "", &mut st, &r, Utc::now())
            .await
            .unwrap();
        let text = r.last_text();
        assert!(text.contains("Hello, Ann"));
        assert!(text.contains("Manager"));
        assert!(text.contains("/send_news"));
        assert!(!text.contains("/deanery"));
    }

    #[tokio::test]
    async fn help_lists_student_commands() {
        let h = MenuHandler::new(directory_with(Role::Student).await);
        let r = FakeResponder::new();
        let mut st = ConversationState::new(Utc::now());
        run(&h, &message(5, "/help"), "/help", "", &mut st, &r, Utc::now())
            .await
            .unwrap();
        let text = r.last_text();
        assert!(text.contains("/deanery"));
        assert!(text.contains("/moodle"));
        assert!(text.contains("/library "));
        assert!(!text.contains("/library_manage"));
        assert!(!text.contains("/tickets "));
    }

    #[tokio::test]
    async fn fallback_points_at_help() {
        let r = FakeResponder::new();
        let mut st = ConversationState::new(Utc::now());
        run(&FallbackHandler, &message(5, "hmm"), "/hmm", "", &mut st, &r, Utc::now())
            .await
            .unwrap();
        assert_eq!(r.last_text(), UNKNOWN_COMMAND);
    }
}
