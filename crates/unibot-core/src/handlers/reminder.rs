//! `/reminder`: personal reminders.
//!
//! Dates and times are read and shown in the server's local time zone and
//! stored as UTC.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::info;

use crate::{
    handler::{Context, Handler},
    handlers::{callback_action, prompt_again},
    messaging::{InlineButton, InlineKeyboard, Outbound},
    services::{Reminder, ReminderService, ReminderStatus},
    state::{steps, ConversationState},
    wizard::{Accepts, Input, Outcome, Rejected, Step, Wizard},
    Result,
};

const FEATURE: &str = "reminder";
const DATE_FORMAT: &str = "%d.%m.%Y";
const TIME_FORMAT: &str = "%H:%M";
const MENU_PREVIEW: usize = 5;
const LIST_LIMIT: usize = 10;

fn local_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

fn shown(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string()
}

fn due_at(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT).ok()?;
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

fn raw(input: &Input<'_>) -> String {
    match input {
        Input::Text { text, .. } => text.trim().to_string(),
        Input::Choice(c) => c.trim().to_string(),
    }
}

fn date(input: &Input<'_>, _: &ConversationState, now: DateTime<Utc>) -> Result<String, Rejected> {
    let Ok(date) = NaiveDate::parse_from_str(&raw(input), DATE_FORMAT) else {
        return Err(Rejected::new(
            "❌ Wrong date format. Use DD.MM.YYYY, for example 25.12.2026.",
        ));
    };
    if date < local_date(now) {
        return Err(Rejected::new("❌ That date has already passed. Pick another one."));
    }
    Ok(date.format(DATE_FORMAT).to_string())
}

fn time(input: &Input<'_>, st: &ConversationState, now: DateTime<Utc>) -> Result<String, Rejected> {
    let Ok(time) = NaiveTime::parse_from_str(&raw(input), TIME_FORMAT) else {
        return Err(Rejected::new(
            "❌ Wrong time format. Use HH:MM, for example 14:30.",
        ));
    };
    let time = time.format(TIME_FORMAT).to_string();
    let Some(due) = st.get("date").and_then(|d| due_at(d, &time)) else {
        return Err(Rejected::new("❌ Could not read the date. Start again with /reminder."));
    };
    if due <= now {
        return Err(Rejected::new("❌ That time has already passed. Pick a later one."));
    }
    Ok(time)
}

fn cancel_row() -> Vec<InlineButton> {
    vec![InlineButton::new("✖️ Cancel", "reminder:cancel")]
}

fn date_picker(now: DateTime<Utc>) -> InlineKeyboard {
    let today = local_date(now);
    [("Today", 0), ("Tomorrow", 1), ("In a week", 7)]
        .into_iter()
        .fold(InlineKeyboard::new(), |kb, (label, days)| {
            let day = (today + Duration::days(days)).format(DATE_FORMAT).to_string();
            kb.button(format!("📅 {label} ({day})"), format!("reminder:date:{day}"))
        })
        .button("✏️ Another date", "reminder:date:custom")
        .row(cancel_row())
}

fn create_wizard() -> Wizard {
    Wizard::new("reminder_create")
        .step(Step::text(
            steps::REMINDER_CREATE,
            "text",
            Box::new(|_, _| {
                Outbound::text("⏰ New reminder\n\nStep 1 of 3: what should I remind you about?")
                    .with_keyboard(InlineKeyboard::new().row(cancel_row()))
            }),
        ))
        .step(Step::new(
            steps::REMINDER_CREATE,
            "date",
            Accepts::Either,
            Box::new(date),
            Box::new(|_, now| {
                Outbound::text("Step 2 of 3: pick a date or type one as DD.MM.YYYY.")
                    .with_keyboard(date_picker(now))
            }),
        ))
        .step(Step::new(
            steps::REMINDER_CREATE,
            "time",
            Accepts::Text,
            Box::new(time),
            Box::new(|st, _| {
                Outbound::text(format!(
                    "Date: {}\n\nStep 3 of 3: type the time as HH:MM, for example 14:30.",
                    st.get("date").unwrap_or_default()
                ))
                .with_keyboard(InlineKeyboard::new().row(cancel_row()))
            }),
        ))
}

fn status_icon(r: &Reminder) -> &'static str {
    match r.status {
        ReminderStatus::Active => "⏰",
        ReminderStatus::Completed => "✅",
    }
}

pub struct ReminderHandler {
    reminders: Arc<dyn ReminderService>,
    wizard: Wizard,
}

impl ReminderHandler {
    pub fn new(reminders: Arc<dyn ReminderService>) -> Self {
        Self {
            reminders,
            wizard: create_wizard(),
        }
    }

    async fn menu(&self, cx: &mut Context<'_>) -> Result<()> {
        let active = self.reminders.active_by_user(cx.user_id()?).await?;
        let mut text = String::from("⏰ Reminders\n\n");
        if active.is_empty() {
            text.push_str("You have no active reminders.");
        } else {
            text.push_str(&format!("Active reminders ({}):\n", active.len()));
            for r in active.iter().take(MENU_PREVIEW) {
                text.push_str(&format!("\n• {}\n   📅 {}", r.text, shown(r.due_at)));
            }
            if active.len() > MENU_PREVIEW {
                text.push_str(&format!("\n\n... and {} more", active.len() - MENU_PREVIEW));
            }
        }
        let mut keyboard = InlineKeyboard::new().button("➕ New reminder", "reminder:create");
        if !active.is_empty() {
            keyboard = keyboard.button("📋 All reminders", "reminder:list");
        }
        cx.reply(Outbound::text(text).with_keyboard(keyboard)).await
    }

    async fn list(&self, cx: &mut Context<'_>) -> Result<()> {
        let all = self.reminders.list_by_user(cx.user_id()?).await?;
        if all.is_empty() {
            return cx.show(Outbound::text("📋 You have no reminders yet.")).await;
        }
        let mut text = format!("📋 All reminders ({}):\n", all.len());
        for r in all.iter().take(LIST_LIMIT) {
            text.push_str(&format!("\n{} {}\n   📅 {}", status_icon(r), r.text, shown(r.due_at)));
        }
        if all.len() > LIST_LIMIT {
            text.push_str(&format!("\n\n... and {} more", all.len() - LIST_LIMIT));
        }
        cx.show(Outbound::text(text)).await
    }

    async fn follow(&self, cx: &mut Context<'_>, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Ready => self.create(cx).await,
            Outcome::Rejected(msg) => prompt_again(cx, &self.wizard, Some(msg.as_str())).await,
            Outcome::Ignored if cx.is_callback() => cx.ack(Some("This button has expired")).await,
            _ => prompt_again(cx, &self.wizard, None).await,
        }
    }

    async fn create(&self, cx: &mut Context<'_>) -> Result<()> {
        let user_id = cx.user_id()?;
        let text = cx.state.get("text").unwrap_or_default().to_string();
        let due = due_at(
            cx.state.get("date").unwrap_or_default(),
            cx.state.get("time").unwrap_or_default(),
        );
        let Some(due) = due else {
            self.wizard.cancel(cx.state);
            return cx
                .reply_text("❌ Could not read the date. Start again with /reminder.")
                .await;
        };
        let reminder = self.reminders.create(user_id, &text, due).await?;
        self.wizard.finish(cx.state);
        info!(reminder_id = reminder.id, user_id = user_id.0, due_at = %reminder.due_at, "reminder created");
        cx.reply_text(format!(
            "✅ Reminder set!\n\nText: {}\nWhen: {}\n\nI'll message you at that time.",
            reminder.text,
            shown(reminder.due_at)
        ))
        .await
    }
}

#[async_trait]
impl Handler for ReminderHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        if cx.is_callback() {
            let action = callback_action(&cx.args, FEATURE).to_string();
            return match action.as_str() {
                "create" => {
                    self.wizard.start(cx.state, &[]);
                    prompt_again(cx, &self.wizard, None).await
                }
                "list" => self.list(cx).await,
                "cancel" if self.wizard.owns(cx.state) => {
                    self.wizard.cancel(cx.state);
                    cx.show(Outbound::text("Reminder cancelled.")).await
                }
                "date:custom" if self.wizard.owns(cx.state) => {
                    cx.reply_text("✏️ Type the date as DD.MM.YYYY, for example 25.12.2026.")
                        .await
                }
                other => match other.strip_prefix("date:") {
                    Some(day) if self.wizard.owns(cx.state) => {
                        let outcome = self.wizard.apply(cx.state, Input::Choice(day), cx.now);
                        self.follow(cx, outcome).await
                    }
                    _ => cx.ack(Some("This button has expired")).await,
                },
            };
        }

        if cx.command.is_empty() && self.wizard.owns(cx.state) {
            let text = cx.args.clone();
            let outcome = self.wizard.apply(
                cx.state,
                Input::Text {
                    text: &text,
                    file: None,
                },
                cx.now,
            );
            return self.follow(cx, outcome).await;
        }
        self.menu(cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UserId,
        services::InMemoryReminderService,
        testing::{callback, message, run, FakeResponder},
    };

    struct Flow {
        handler: ReminderHandler,
        reminders: Arc<InMemoryReminderService>,
        responder: FakeResponder,
        state: ConversationState,
    }

    impl Flow {
        fn new() -> Self {
            let reminders = Arc::new(InMemoryReminderService::new());
            Self {
                handler: ReminderHandler::new(reminders.clone()),
                reminders,
                responder: FakeResponder::new(),
                state: ConversationState::new(Utc::now()),
            }
        }

        async fn press(&mut self, payload: &str) {
            let ev = callback(8, payload);
            run(&self.handler, &ev, "", payload, &mut self.state, &self.responder, Utc::now())
                .await
                .unwrap();
        }

        async fn text(&mut self, text: &str) {
            let ev = message(8, text);
            run(&self.handler, &ev, "", text, &mut self.state, &self.responder, Utc::now())
                .await
                .unwrap();
        }
    }

    fn day_after(days: i64) -> String {
        (local_date(Utc::now()) + Duration::days(days))
            .format(DATE_FORMAT)
            .to_string()
    }

    #[tokio::test]
    async fn quick_pick_flow_creates_reminder() {
        let mut f = Flow::new();
        f.press("reminder:create").await;
        assert_eq!(f.state.step, steps::REMINDER_CREATE);
        f.text("Submit essay").await;

        let tomorrow = day_after(1);
        f.press(&format!("reminder:date:{tomorrow}")).await;
        assert_eq!(f.state.get("date"), Some(tomorrow.as_str()));
        f.text("09:30").await;

        assert_eq!(f.state.step, steps::IDLE);
        let mine = f.reminders.list_by_user(UserId(8)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].text, "Submit essay");
        assert_eq!(Some(mine[0].due_at), due_at(&tomorrow, "09:30"));
        assert!(f.responder.last_text().contains("Reminder set"));
    }

    #[tokio::test]
    async fn typed_date_is_validated() {
        let mut f = Flow::new();
        f.press("reminder:create").await;
        f.text("Call home").await;
        f.text("someday").await;
        assert_eq!(f.state.get("date"), None);
        f.text("01.01.2000").await;
        assert_eq!(f.state.get("date"), None);
        assert!(f.responder.texts().iter().any(|t| t.contains("already passed")));

        let next_week = day_after(7);
        f.text(&next_week).await;
        assert_eq!(f.state.get("date"), Some(next_week.as_str()));
        f.text("25:99").await;
        assert_eq!(f.state.get("time"), None);
        assert_eq!(f.state.step, steps::REMINDER_CREATE);
    }

    #[tokio::test]
    async fn time_earlier_today_is_rejected() {
        let mut f = Flow::new();
        f.press("reminder:create").await;
        f.text("Lunch").await;
        f.press(&format!("reminder:date:{}", day_after(0))).await;
        f.text("00:00").await;
        assert_eq!(f.state.get("time"), None);
        assert!(f.reminders.all_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn date_button_before_text_is_ignored() {
        let mut f = Flow::new();
        f.press("reminder:create").await;
        f.press(&format!("reminder:date:{}", day_after(1))).await;
        assert_eq!(f.state.get("date"), None);
        assert_eq!(f.responder.answers().len(), 1);
    }

    #[tokio::test]
    async fn cancel_clears_the_draft() {
        let mut f = Flow::new();
        f.press("reminder:create").await;
        f.text("Gym").await;
        f.press("reminder:cancel").await;
        assert_eq!(f.state.step, steps::IDLE);
        assert!(f.state.data.is_empty());
    }

    #[tokio::test]
    async fn menu_lists_active_reminders() {
        let mut f = Flow::new();
        let due = Utc::now() + Duration::days(2);
        f.reminders.create(UserId(8), "Library book", due).await.unwrap();
        let ev = message(8, "/reminder");
        run(&f.handler, &ev, "/reminder", "", &mut f.state, &f.responder, Utc::now())
            .await
            .unwrap();
        let text = f.responder.last_text();
        assert!(text.contains("Active reminders (1)"));
        assert!(text.contains("Library book"));
    }
}
