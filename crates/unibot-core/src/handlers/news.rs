use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    handler::{Context, Handler},
    messaging::{markdown, Outbound},
    services::{NewsItem, NewsService},
    Result,
};

const LATEST: usize = 3;

/// Markdown card for one news item; also used for broadcasts.
///
/// Title and author are typed by staff and escaped. The content is sent as
/// written: composers are told markdown is allowed there.
pub(crate) fn card(item: &NewsItem) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        markdown::bold(&item.title),
        item.content,
        markdown::italic(&format!(
            "{}, {}",
            item.author,
            item.created_at.format("%d.%m.%Y %H:%M")
        ))
    )
}

/// `/news`
pub struct NewsHandler {
    news: Arc<dyn NewsService>,
}

impl NewsHandler {
    pub fn new(news: Arc<dyn NewsService>) -> Self {
        Self { news }
    }
}

#[async_trait]
impl Handler for NewsHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let items = self.news.latest(LATEST).await?;
        if items.is_empty() {
            return cx.reply_text("📰 No news yet.").await;
        }
        cx.reply_text("📰 Latest news").await?;
        for item in &items {
            cx.reply(Outbound::markdown(card(item))).await?;
        }
        Ok(())
    }
}
