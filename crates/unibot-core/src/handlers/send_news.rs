//! `/send_news`: managers compose a news item and broadcast it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    domain::Recipient,
    handler::{Context, Handler},
    handlers::{news::card, prompt_again, user_with_role},
    messaging::Outbound,
    services::{NewsService, Role, User, UserDirectory},
    state::steps,
    wizard::{Input, Outcome, Step, Wizard},
    Result,
};

fn compose_wizard() -> Wizard {
    Wizard::new("send_news")
        .step(Step::text(
            steps::SEND_NEWS,
            "title",
            Box::new(|_, _| Outbound::text("📰 New announcement\n\nStep 1 of 2: send the title.")),
        ))
        .step(Step::text(
            steps::SEND_NEWS,
            "content",
            Box::new(|st, _| {
                Outbound::text(format!(
                    "Title: {}\n\nStep 2 of 2: send the text. Markdown is allowed.",
                    st.get("title").unwrap_or_default()
                ))
            }),
        ))
}

pub struct SendNewsHandler {
    users: Arc<dyn UserDirectory>,
    news: Arc<dyn NewsService>,
    wizard: Wizard,
}

impl SendNewsHandler {
    pub fn new(users: Arc<dyn UserDirectory>, news: Arc<dyn NewsService>) -> Self {
        Self {
            users,
            news,
            wizard: compose_wizard(),
        }
    }

    async fn publish(&self, cx: &mut Context<'_>, author: &User) -> Result<()> {
        let title = cx.state.get("title").unwrap_or_default().to_string();
        let content = cx.state.get("content").unwrap_or_default().to_string();
        let item = self
            .news
            .create(&title, &content, author.id, &author.full_name())
            .await?;
        self.wizard.finish(cx.state);

        let text = card(&item);
        let (mut sent, mut failed) = (0usize, 0usize);
        for user in self.users.list().await? {
            if user.id == author.id {
                continue;
            }
            match cx
                .responder
                .send(Recipient::User(user.id), Outbound::markdown(text.clone()))
                .await
            {
                Ok(_) => sent += 1,
                Err(e) => {
                    failed += 1;
                    warn!(user_id = user.id.0, error = %e, "news delivery failed");
                }
            }
        }
        info!(news_id = item.id, sent, failed, "news broadcast");
        cx.reply_text(format!(
            "✅ News published.\nDelivered: {sent}\nFailed: {failed}"
        ))
        .await
    }
}

#[async_trait]
impl Handler for SendNewsHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let Some(author) = user_with_role(cx, self.users.as_ref(), &[Role::Manager]).await? else {
            return Ok(());
        };

        if !(cx.command.is_empty() && self.wizard.owns(cx.state)) {
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
        match outcome {
            Outcome::Ready => self.publish(cx, &author).await,
            Outcome::Rejected(msg) => prompt_again(cx, &self.wizard, Some(msg.as_str())).await,
            _ => prompt_again(cx, &self.wizard, None).await,
        }
    }
}
