//! `/moodle`: link a Moodle token and browse the account behind it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{
    handler::{Context, Handler},
    handlers::{callback_action, prompt_again, user_with_role},
    messaging::{InlineKeyboard, Outbound},
    services::{Course, MoodleClient, Role, SiteInfo, UserDirectory},
    state::steps,
    wizard::{Input, Outcome, Step, Wizard},
    Result,
};

const FEATURE: &str = "moodle";
const MAX_COURSES: usize = 10;

fn token_wizard() -> Wizard {
    Wizard::new("moodle_token").step(Step::text(
        steps::MOODLE_TOKEN,
        "token",
        Box::new(|_, _| {
            Outbound::text(
                "🔗 Moodle\n\nSend your Moodle web service token. \
                 You can find it in your Moodle profile under Security keys.",
            )
        }),
    ))
}

fn account_keyboard() -> InlineKeyboard {
    InlineKeyboard::new()
        .button("🔄 Refresh", "moodle:refresh")
        .button("🔑 Change token", "moodle:change_token")
        .button("📚 My courses", "moodle:courses")
}

fn site_summary(info: &SiteInfo) -> String {
    format!(
        "Site: {}\nUser: {}\nLogin: {}\nVersion: {}",
        info.sitename, info.fullname, info.username, info.release
    )
}

fn course_line(course: &Course) -> String {
    let mut line = format!("📚 {}", course.fullname);
    if let Some(p) = course.progress {
        line.push_str(&format!("\n   📊 Progress: {p:.0}%"));
    }
    line.push_str(if course.completed == Some(true) {
        "\n   ✅ Completed"
    } else {
        "\n   ⏳ In progress"
    });
    line
}

pub struct MoodleHandler {
    users: Arc<dyn UserDirectory>,
    moodle: Option<Arc<dyn MoodleClient>>,
    wizard: Wizard,
}

impl MoodleHandler {
    pub fn new(users: Arc<dyn UserDirectory>, moodle: Option<Arc<dyn MoodleClient>>) -> Self {
        Self {
            users,
            moodle,
            wizard: token_wizard(),
        }
    }

    async fn capture_token(&self, cx: &mut Context<'_>, moodle: &dyn MoodleClient) -> Result<()> {
        let user_id = cx.user_id()?;
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

        let token = cx.state.data.remove("token").unwrap_or_default();
        let info = match moodle.site_info(&token).await {
            Ok(info) => info,
            Err(e) => {
                warn!(user_id = user_id.0, error = %e, "moodle token rejected");
                return cx
                    .reply_text("❌ That token did not work. Check it and send it again.")
                    .await;
            }
        };
        self.users.set_moodle_token(user_id, &token).await?;
        self.wizard.finish(cx.state);
        info!(user_id = user_id.0, moodle_user = info.userid, "moodle token linked");
        cx.reply(
            Outbound::text(format!("✅ Token linked!\n\n{}", site_summary(&info)))
                .with_keyboard(account_keyboard()),
        )
        .await
    }

    async fn courses(&self, cx: &mut Context<'_>, moodle: &dyn MoodleClient, token: &str) -> Result<()> {
        let courses = match moodle.site_info(token).await {
            Ok(info) => moodle.courses(token, info.userid).await,
            Err(e) => Err(e),
        };
        let courses = match courses {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to load moodle courses");
                return cx.reply_text("❌ Could not load your courses. Try again later.").await;
            }
        };
        if courses.is_empty() {
            return cx.reply_text("📚 You have no courses in Moodle yet.").await;
        }
        let mut text = courses
            .iter()
            .take(MAX_COURSES)
            .map(course_line)
            .collect::<Vec<_>>()
            .join("\n\n");
        if courses.len() > MAX_COURSES {
            text.push_str(&format!("\n\n... and {} more", courses.len() - MAX_COURSES));
        }
        cx.reply_text(text).await
    }
}

#[async_trait]
impl Handler for MoodleHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let Some(moodle) = self.moodle.as_deref() else {
            if self.wizard.owns(cx.state) {
                self.wizard.cancel(cx.state);
            }
            return cx.reply_text("Moodle integration is not configured.").await;
        };
        let Some(user) = user_with_role(cx, self.users.as_ref(), &[Role::Student]).await? else {
            return Ok(());
        };

        if cx.command.is_empty() && !cx.is_callback() && self.wizard.owns(cx.state) {
            return self.capture_token(cx, moodle).await;
        }

        if cx.is_callback() {
            let action = callback_action(&cx.args, FEATURE).to_string();
            if action == "change_token" {
                self.wizard.start(cx.state, &[]);
                return prompt_again(cx, &self.wizard, None).await;
            }
            let Some(token) = user.moodle_token.as_deref() else {
                return cx
                    .reply_text("No Moodle token linked yet. Use /moodle to add one.")
                    .await;
            };
            return match action.as_str() {
                "refresh" => match moodle.site_info(token).await {
                    Ok(info) => {
                        cx.show(
                            Outbound::text(format!("🔄 Updated\n\n{}", site_summary(&info)))
                                .with_keyboard(account_keyboard()),
                        )
                        .await
                    }
                    Err(e) => {
                        error!(user_id = user.id.0, error = %e, "moodle refresh failed");
                        cx.reply_text("❌ Could not reach Moodle. Try again later.").await
                    }
                },
                "courses" => self.courses(cx, moodle, token).await,
                _ => cx.ack(Some("Action not recognized")).await,
            };
        }

        let Some(token) = user.moodle_token.as_deref() else {
            self.wizard.start(cx.state, &[]);
            return prompt_again(cx, &self.wizard, None).await;
        };
        match moodle.site_info(token).await {
            Ok(info) => {
                cx.reply(
                    Outbound::text(format!("🔗 Moodle\n\n{}", site_summary(&info)))
                        .with_keyboard(account_keyboard()),
                )
                .await
            }
            Err(e) => {
                error!(user_id = user.id.0, error = %e, "moodle site info failed");
                cx.reply(
                    Outbound::text(
                        "❌ Could not connect to Moodle. Check your token or try again later.",
                    )
                    .with_keyboard(InlineKeyboard::new().button("🔑 Change token", "moodle:change_token")),
                )
                .await
            }
        }
    }
}
