//! `/register`: the six-step sign-up wizard.
//!
//! Owns every registration sub-step and, through the router's generic
//! fallback, any other step no feature claims.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::{
    handler::{Context, Handler},
    handlers::{callback_action, prompt_again, RegistrationSettings},
    messaging::{InlineButton, InlineKeyboard, Outbound},
    services::{NewUser, Role, User, UserDirectory},
    state::{steps, ConversationState},
    wizard::{non_blank, Accepts, Input, Outcome, Prompt, Rejected, Step, Wizard},
    Result,
};

const FEATURE: &str = "user_reg";
const BACK: &str = "user_reg:back";
const CANCEL: &str = "user_reg:cancel";

const MIN_AGE: u8 = 1;
const MAX_AGE: u8 = 150;

fn nav(with_back: bool) -> InlineKeyboard {
    let mut row = Vec::new();
    if with_back {
        row.push(InlineButton::new("⬅️ Back", BACK));
    }
    row.push(InlineButton::new("✖️ Cancel", CANCEL));
    InlineKeyboard::new().row(row)
}

fn ask(text: &'static str, with_back: bool) -> Prompt {
    Box::new(move |_, _| Outbound::text(text).with_keyboard(nav(with_back)))
}

fn ask_gender() -> Prompt {
    Box::new(|_, _| {
        let keyboard = InlineKeyboard::new()
            .row(vec![
                InlineButton::new("Male", "user_reg:gender:male"),
                InlineButton::new("Female", "user_reg:gender:female"),
            ])
            .row(vec![
                InlineButton::new("⬅️ Back", BACK),
                InlineButton::new("✖️ Cancel", CANCEL),
            ]);
        Outbound::text("Step 4 of 6: choose your gender.").with_keyboard(keyboard)
    })
}

fn age(input: &Input<'_>, _: &ConversationState, _: DateTime<Utc>) -> Result<String, Rejected> {
    let Input::Text { text, .. } = input else {
        return Err(Rejected::new("Please type your age."));
    };
    match text.trim().parse::<u8>() {
        Ok(n) if (MIN_AGE..=MAX_AGE).contains(&n) => Ok(n.to_string()),
        _ => Err(Rejected::new(format!(
            "Please enter your age as a whole number between {MIN_AGE} and {MAX_AGE}."
        ))),
    }
}

fn gender(input: &Input<'_>, _: &ConversationState, _: DateTime<Utc>) -> Result<String, Rejected> {
    match input {
        Input::Choice(g @ ("male" | "female")) => Ok(g.to_string()),
        _ => Err(Rejected::new("Please choose one of the buttons.")),
    }
}

fn email(input: &Input<'_>, st: &ConversationState, now: DateTime<Utc>) -> Result<String, Rejected> {
    let value = non_blank(input, st, now)?;
    if value.contains('@') {
        Ok(value)
    } else {
        Err(Rejected::new(
            "That doesn't look like an email address. Please include '@'.",
        ))
    }
}

fn wizard(code: String) -> Wizard {
    let verify = move |input: &Input<'_>, _: &ConversationState, _: DateTime<Utc>| match input {
        Input::Text { text, .. } if text.trim() == code => Ok(text.trim().to_string()),
        _ => Err(Rejected::new("Wrong code. Please try again.")),
    };

    Wizard::new("registration")
        .step(Step::text(
            steps::FIRST_NAME,
            "first_name",
            ask("📝 Registration\n\nStep 1 of 6: what is your first name?", false),
        ))
        .step(Step::text(
            steps::LAST_NAME,
            "last_name",
            ask("Step 2 of 6: what is your last name?", true),
        ))
        .step(Step::new(
            steps::AGE,
            "age",
            Accepts::Text,
            Box::new(age),
            ask("Step 3 of 6: how old are you?", true),
        ))
        .step(Step::new(
            steps::GENDER,
            "gender",
            Accepts::Choice,
            Box::new(gender),
            ask_gender(),
        ))
        .step(Step::new(
            steps::EMAIL,
            "email",
            Accepts::Text,
            Box::new(email),
            ask("Step 5 of 6: what is your email address?", true),
        ))
        .step(Step::new(
            steps::EMAIL_VERIFICATION,
            "verification_code",
            Accepts::Text,
            Box::new(verify),
            ask(
                "Step 6 of 6: we sent a verification code to your email. Type it here.",
                true,
            ),
        ))
        .finish_onto(steps::COMPLETED)
}

fn summary(user: &User) -> String {
    format!(
        "Name: {}\nAge: {}\nGender: {}\nEmail: {}\nRole: {}",
        user.full_name(),
        user.age,
        user.gender,
        user.email,
        user.role.label()
    )
}

pub struct RegistrationHandler {
    users: Arc<dyn UserDirectory>,
    role_markers: HashMap<String, Role>,
    wizard: Wizard,
}

impl RegistrationHandler {
    pub fn new(users: Arc<dyn UserDirectory>, settings: RegistrationSettings) -> Self {
        Self {
            users,
            role_markers: settings.role_markers,
            wizard: wizard(settings.verification_code),
        }
    }

    fn role_for(&self, first_name: &str) -> Role {
        match self.role_markers.get(first_name) {
            Some(role) => {
                warn!(
                    first_name,
                    role = %role,
                    "role assigned from first-name marker; this is not access control"
                );
                *role
            }
            None => Role::Student,
        }
    }

    async fn on_command(&self, cx: &mut Context<'_>) -> Result<()> {
        let user_id = cx.user_id()?;
        if let Some(user) = self.users.get(user_id).await? {
            return cx
                .reply_text(format!("You are already registered.\n\n{}", summary(&user)))
                .await;
        }
        if self.wizard.owns(cx.state) {
            return prompt_again(cx, &self.wizard, Some("Let's pick up where you left off.")).await;
        }
        self.wizard.start(cx.state, &[]);
        prompt_again(cx, &self.wizard, None).await
    }

    async fn on_callback(&self, cx: &mut Context<'_>) -> Result<()> {
        if !self.wizard.owns(cx.state) {
            return cx.ack(Some("This registration is no longer active.")).await;
        }
        let action = callback_action(&cx.args, FEATURE).to_string();
        let outcome = match action.as_str() {
            "back" => self.wizard.back(cx.state),
            "cancel" => self.wizard.cancel(cx.state),
            other => match other.strip_prefix("gender:") {
                Some(g) => self.wizard.apply(cx.state, Input::Choice(g), cx.now),
                None => Outcome::Ignored,
            },
        };
        self.follow(cx, outcome).await
    }

    async fn on_text(&self, cx: &mut Context<'_>) -> Result<()> {
        if !self.wizard.owns(cx.state) {
            warn!(
                step = %cx.state.step,
                wizard = self.wizard.name(),
                "unknown step; restarting flow"
            );
            self.wizard.start(cx.state, &[]);
            return prompt_again(cx, &self.wizard, None).await;
        }
        let text = cx.args.clone();
        let outcome = self.wizard.apply(
            cx.state,
            Input::Text {
                text: &text,
                file: None,
            },
            cx.now,
        );
        self.follow(cx, outcome).await
    }

    async fn follow(&self, cx: &mut Context<'_>, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Advanced | Outcome::WentBack => prompt_again(cx, &self.wizard, None).await,
            Outcome::Rejected(msg) => prompt_again(cx, &self.wizard, Some(msg.as_str())).await,
            Outcome::Ignored if cx.is_callback() => cx.ack(None).await,
            Outcome::Ignored => {
                prompt_again(cx, &self.wizard, Some("Please use the buttons below.")).await
            }
            Outcome::Cancelled => {
                cx.show(Outbound::text(
                    "Registration cancelled. Send /register whenever you want to start again.",
                ))
                .await
            }
            Outcome::Ready => self.complete(cx).await,
        }
    }

    async fn complete(&self, cx: &mut Context<'_>) -> Result<()> {
        let user_id = cx.user_id()?;
        if let Some(existing) = self.users.get(user_id).await? {
            self.wizard.finish(cx.state);
            return cx
                .reply_text(format!("You are already registered.\n\n{}", summary(&existing)))
                .await;
        }

        let field = |key: &str| cx.state.get(key).unwrap_or_default().to_string();
        let first_name = field("first_name");
        let new_user = NewUser {
            id: user_id,
            role: self.role_for(&first_name),
            first_name,
            last_name: field("last_name"),
            age: field("age").parse().unwrap_or_default(),
            gender: field("gender"),
            email: field("email"),
        };

        match self.users.create(new_user).await {
            Ok(user) => {
                self.wizard.finish(cx.state);
                info!(user_id = user_id.0, role = %user.role, "user registered");
                cx.reply_text(format!(
                    "✅ Registration complete!\n\n{}\n\nSend /help to see what you can do.",
                    summary(&user)
                ))
                .await
            }
            Err(e) => {
                error!(user_id = user_id.0, error = %e, "failed to create user");
                cx.reply_text("Could not finish registration right now. Please send the code again.")
                    .await
            }
        }
    }
}

#[async_trait]
impl Handler for RegistrationHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        if cx.is_callback() {
            self.on_callback(cx).await
        } else if cx.command.is_empty() {
            self.on_text(cx).await
        } else {
            self.on_command(cx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UserId,
        services::InMemoryUserDirectory,
        testing::{callback, message, run, FakeResponder},
    };

    struct Flow {
        handler: RegistrationHandler,
        users: Arc<InMemoryUserDirectory>,
        responder: FakeResponder,
        state: ConversationState,
    }

    impl Flow {
        fn new() -> Self {
            let users = Arc::new(InMemoryUserDirectory::new());
            let settings = RegistrationSettings {
                verification_code: "1111".into(),
                role_markers: HashMap::from([("Administrator".to_string(), Role::Manager)]),
            };
            Self {
                handler: RegistrationHandler::new(users.clone(), settings),
                users,
                responder: FakeResponder::new(),
                state: ConversationState::new(Utc::now()),
            }
        }

        async fn command(&mut self) {
            let ev = message(7, "/register");
            run(&self.handler, &ev, "/register", "", &mut self.state, &self.responder, Utc::now())
                .await
                .unwrap();
        }

        async fn text(&mut self, text: &str) {
            let ev = message(7, text);
            run(&self.handler, &ev, "", text, &mut self.state, &self.responder, Utc::now())
                .await
                .unwrap();
        }

        async fn press(&mut self, payload: &str) {
            let ev = callback(7, payload);
            run(&self.handler, &ev, "", payload, &mut self.state, &self.responder, Utc::now())
                .await
                .unwrap();
        }

        async fn up_to_age(&mut self, first: &str) {
            self.command().await;
            self.text(first).await;
            self.text("Lee").await;
            assert_eq!(self.state.step, steps::AGE);
        }
    }

    #[tokio::test]
    async fn full_flow_creates_a_student() {
        let mut f = Flow::new();
        f.up_to_age("Ann").await;
        f.text("20").await;
        assert_eq!(f.state.step, steps::GENDER);
        f.press("user_reg:gender:male").await;
        assert_eq!(f.state.step, steps::EMAIL);
        f.text("a@b.com").await;
        assert_eq!(f.state.step, steps::EMAIL_VERIFICATION);
        f.text("1111").await;

        assert_eq!(f.state.step, steps::COMPLETED);
        let user = f.users.get(UserId(7)).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.age, 20);
        assert_eq!(user.gender, "male");
        assert!(f.responder.last_text().contains("Registration complete"));
    }

    #[tokio::test]
    async fn role_marker_overrides_default_role() {
        let mut f = Flow::new();
        f.up_to_age("Administrator").await;
        f.text("40").await;
        f.press("user_reg:gender:female").await;
        f.text("boss@uni.edu").await;
        f.text("1111").await;
        let user = f.users.get(UserId(7)).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Manager);
    }

    #[tokio::test]
    async fn invalid_age_stays_put() {
        let mut f = Flow::new();
        f.up_to_age("Ann").await;
        for bad in ["abc", "200", "0", "-3"] {
            f.text(bad).await;
            assert_eq!(f.state.step, steps::AGE, "{bad}");
            assert_eq!(f.state.get("age"), None, "{bad}");
        }
        assert!(f.responder.texts().iter().any(|t| t.contains("between 1 and 150")));
    }

    #[tokio::test]
    async fn gender_needs_a_button() {
        let mut f = Flow::new();
        f.up_to_age("Ann").await;
        f.text("20").await;
        f.text("male").await;
        assert_eq!(f.state.step, steps::GENDER);
        assert_eq!(f.state.get("gender"), None);
        f.press("user_reg:gender:robot").await;
        assert_eq!(f.state.step, steps::GENDER);
    }

    #[tokio::test]
    async fn email_needs_at_sign_and_code_must_match() {
        let mut f = Flow::new();
        f.up_to_age("Ann").await;
        f.text("20").await;
        f.press("user_reg:gender:female").await;
        f.text("not-an-email").await;
        assert_eq!(f.state.step, steps::EMAIL);
        f.text("ann@uni.edu").await;
        f.text("0000").await;
        assert_eq!(f.state.step, steps::EMAIL_VERIFICATION);
        assert!(f.users.get(UserId(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn back_discards_the_step_returned_to() {
        let mut f = Flow::new();
        f.up_to_age("Ann").await;
        f.text("20").await;
        f.press(BACK).await;
        assert_eq!(f.state.step, steps::AGE);
        assert_eq!(f.state.get("age"), None);
        assert_eq!(f.state.get("last_name"), Some("Lee"));
        assert_eq!(f.state.get("first_name"), Some("Ann"));
    }

    #[tokio::test]
    async fn cancel_from_any_step_clears_everything() {
        let expected = [
            steps::FIRST_NAME,
            steps::LAST_NAME,
            steps::AGE,
            steps::GENDER,
            steps::EMAIL,
            steps::EMAIL_VERIFICATION,
        ];
        for (advanced, step) in expected.into_iter().enumerate() {
            let mut f = Flow::new();
            f.command().await;
            for i in 0..advanced {
                match i {
                    0 => f.text("Ann").await,
                    1 => f.text("Lee").await,
                    2 => f.text("20").await,
                    3 => f.press("user_reg:gender:male").await,
                    _ => f.text("a@b.com").await,
                }
            }
            assert_eq!(f.state.step, step);
            f.press(CANCEL).await;
            assert_eq!(f.state.step, steps::IDLE, "cancel from {step}");
            assert!(f.state.data.is_empty(), "cancel from {step}");
        }
    }

    #[tokio::test]
    async fn text_on_an_unknown_step_restarts_registration() {
        let mut f = Flow::new();
        f.state.enter("some_future_step");
        f.state.set("leftover", "x");
        f.text("Ann").await;
        assert_eq!(f.state.step, steps::FIRST_NAME);
        assert!(f.state.data.is_empty());
        assert!(f.responder.last_text().contains("Step 1 of 6"));

        f.text("Ann").await;
        assert_eq!(f.state.step, steps::LAST_NAME);
        assert_eq!(f.state.get("first_name"), Some("Ann"));
    }

    #[tokio::test]
    async fn registered_user_gets_summary() {
        let mut f = Flow::new();
        f.up_to_age("Ann").await;
        f.text("20").await;
        f.press("user_reg:gender:male").await;
        f.text("a@b.com").await;
        f.text("1111").await;
        f.command().await;
        assert!(f.responder.last_text().contains("already registered"));
        assert_eq!(f.state.step, steps::COMPLETED);
    }

    #[tokio::test]
    async fn register_command_resumes_a_flow() {
        let mut f = Flow::new();
        f.up_to_age("Ann").await;
        f.command().await;
        assert_eq!(f.state.step, steps::AGE);
        assert_eq!(f.state.get("first_name"), Some("Ann"));
        assert!(f.responder.last_text().contains("how old"));
    }

    #[tokio::test]
    async fn stale_buttons_do_not_touch_other_flows() {
        let mut f = Flow::new();
        f.state.enter(steps::REMINDER_CREATE);
        f.state.set("text", "exam");
        f.press(CANCEL).await;
        assert_eq!(f.state.step, steps::REMINDER_CREATE);
        assert_eq!(f.state.get("text"), Some("exam"));
        assert_eq!(f.responder.answers().len(), 1);
    }
}
