use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{domain::UserId, errors::Error, services::lock, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderStatus {
    Active,
    Completed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reminder {
    pub id: u64,
    pub user_id: UserId,
    pub text: String,
    pub due_at: DateTime<Utc>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ReminderService: Send + Sync {
    async fn create(&self, user_id: UserId, text: &str, due_at: DateTime<Utc>) -> Result<Reminder>;
    /// All of a user's reminders, soonest first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Reminder>>;
    async fn active_by_user(&self, user_id: UserId) -> Result<Vec<Reminder>>;
    /// Every active reminder, soonest first.
    async fn all_active(&self) -> Result<Vec<Reminder>>;
    async fn mark_completed(&self, id: u64) -> Result<()>;
}

#[derive(Default)]
struct Reminders {
    next_id: u64,
    by_id: BTreeMap<u64, Reminder>,
}

impl Reminders {
    fn sorted<F>(&self, keep: F) -> Vec<Reminder>
    where
        F: Fn(&Reminder) -> bool,
    {
        let mut out: Vec<Reminder> = self.by_id.values().filter(|r| keep(r)).cloned().collect();
        out.sort_by_key(|r| (r.due_at, r.id));
        out
    }
}

#[derive(Default)]
pub struct InMemoryReminderService {
    inner: Mutex<Reminders>,
}

impl InMemoryReminderService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderService for InMemoryReminderService {
    async fn create(&self, user_id: UserId, text: &str, due_at: DateTime<Utc>) -> Result<Reminder> {
        let mut inner = lock(&self.inner, "reminders")?;
        inner.next_id += 1;
        let reminder = Reminder {
            id: inner.next_id,
            user_id,
            text: text.to_string(),
            due_at,
            status: ReminderStatus::Active,
            created_at: Utc::now(),
        };
        inner.by_id.insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Reminder>> {
        Ok(lock(&self.inner, "reminders")?.sorted(|r| r.user_id == user_id))
    }

    async fn active_by_user(&self, user_id: UserId) -> Result<Vec<Reminder>> {
        Ok(lock(&self.inner, "reminders")?
            .sorted(|r| r.user_id == user_id && r.status == ReminderStatus::Active))
    }

    async fn all_active(&self) -> Result<Vec<Reminder>> {
        Ok(lock(&self.inner, "reminders")?.sorted(|r| r.status == ReminderStatus::Active))
    }

    async fn mark_completed(&self, id: u64) -> Result<()> {
        let mut inner = lock(&self.inner, "reminders")?;
        let reminder = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("reminder {id}")))?;
        reminder.status = ReminderStatus::Completed;
        Ok(())
    }
}
