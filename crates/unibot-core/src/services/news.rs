use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{domain::UserId, services::lock, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct NewsItem {
    pub id: u64,
    pub title: String,
    /// Markdown.
    pub content: String,
    pub author_id: Option<UserId>,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait NewsService: Send + Sync {
    /// Newest first.
    async fn latest(&self, count: usize) -> Result<Vec<NewsItem>>;
    async fn create(
        &self,
        title: &str,
        content: &str,
        author_id: UserId,
        author: &str,
    ) -> Result<NewsItem>;
}

#[derive(Default)]
pub struct InMemoryNewsService {
    items: Mutex<Vec<NewsItem>>,
}

impl InMemoryNewsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A couple of starter items so `/news` is not empty on a fresh install.
    pub fn seeded() -> Self {
        let now = Utc::now();
        let seed = |id, title: &str, content: &str, author: &str, days| NewsItem {
            id,
            title: title.to_string(),
            content: content.to_string(),
            author_id: None,
            author: author.to_string(),
            created_at: now - Duration::days(days),
        };
        Self {
            items: Mutex::new(vec![
                seed(
                    1,
                    "Welcome to the university!",
                    "*Welcome!* The academic year starts soon. Good luck with your studies.",
                    "Administration",
                    5,
                ),
                seed(
                    2,
                    "Timetable update",
                    "Next week's timetable has changed. Please check it before Monday.",
                    "Dean's office",
                    3,
                ),
                seed(
                    3,
                    "Open day",
                    "Come and meet the faculties on December 15.",
                    "Administration",
                    1,
                ),
            ]),
        }
    }
}

#[async_trait]
impl NewsService for InMemoryNewsService {
    async fn latest(&self, count: usize) -> Result<Vec<NewsItem>> {
        let mut items = lock(&self.items, "news")?.clone();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        items.truncate(count);
        Ok(items)
    }

    async fn create(
        &self,
        title: &str,
        content: &str,
        author_id: UserId,
        author: &str,
    ) -> Result<NewsItem> {
        let mut items = lock(&self.items, "news")?;
        let item = NewsItem {
            id: items.iter().map(|n| n.id).max().unwrap_or(0) + 1,
            title: title.to_string(),
            content: content.to_string(),
            author_id: Some(author_id),
            author: author.to_string(),
            created_at: Utc::now(),
        };
        items.push(item.clone());
        Ok(item)
    }
}
