//! `/schedule` and `/myschedule`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::{
    handler::{Context, Handler},
    handlers::registered_user,
    services::{ScheduleService, UserDirectory},
    Result,
};

pub struct ScheduleHandler {
    users: Arc<dyn UserDirectory>,
    schedule: Arc<dyn ScheduleService>,
}

impl ScheduleHandler {
    pub fn new(users: Arc<dyn UserDirectory>, schedule: Arc<dyn ScheduleService>) -> Self {
        Self { users, schedule }
    }
}

#[async_trait]
impl Handler for ScheduleHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let Some(user) = registered_user(cx, self.users.as_ref()).await? else {
            return Ok(());
        };
        let lessons = match self.schedule.today(user.id, cx.now).await {
            Ok(lessons) => lessons,
            Err(e) => {
                error!(user_id = user.id.0, error = %e, "failed to load schedule");
                return cx
                    .reply_text("Could not load the schedule. Please try again later.")
                    .await;
            }
        };
        if lessons.is_empty() {
            return cx
                .reply_text("Nothing on the schedule today. Use /contact if you need advice.")
                .await;
        }

        let mut text = String::from("📅 Your schedule for today:\n");
        for l in &lessons {
            text.push_str(&format!(
                "\n• {} - {}\n  {}, {}\n  {}\n",
                l.starts_at.format("%H:%M"),
                l.discipline,
                l.instructor,
                l.location,
                l.description
            ));
        }
        cx.reply_text(text).await
    }
}
