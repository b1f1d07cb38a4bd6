use std::{collections::BTreeMap, fmt, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{domain::UserId, errors::Error, services::lock, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketStatus {
    Received,
    /// The author answered back; waiting on staff again.
    InProgress,
    Answered,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TicketStatus::Received => "received",
            TicketStatus::InProgress => "in progress",
            TicketStatus::Answered => "answered",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ticket {
    pub id: u64,
    pub user_id: UserId,
    pub subject: String,
    pub message: String,
    pub response: Option<String>,
    pub response_by: Option<UserId>,
    /// Author replies to staff, oldest first.
    pub user_replies: Vec<String>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait TicketService: Send + Sync {
    async fn create(&self, user_id: UserId, subject: &str, message: &str) -> Result<Ticket>;
    async fn get(&self, id: u64) -> Result<Option<Ticket>>;
    async fn list(&self) -> Result<Vec<Ticket>>;
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Ticket>>;
    async fn update_status(&self, id: u64, status: TicketStatus) -> Result<()>;
    /// Staff answer; status becomes `Answered`.
    async fn add_response(&self, id: u64, response: &str, by: UserId) -> Result<Ticket>;
    /// Author reply to staff; status goes back to `InProgress`.
    async fn add_user_reply(&self, id: u64, reply: &str) -> Result<Ticket>;
}

#[derive(Default)]
struct Tickets {
    next_id: u64,
    by_id: BTreeMap<u64, Ticket>,
}

#[derive(Default)]
pub struct InMemoryTicketService {
    inner: Mutex<Tickets>,
}

impl InMemoryTicketService {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: u64, f: F) -> Result<Ticket>
    where
        F: FnOnce(&mut Ticket),
    {
        let mut inner = lock(&self.inner, "tickets")?;
        let ticket = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))?;
        f(ticket);
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }
}

#[async_trait]
impl TicketService for InMemoryTicketService {
    async fn create(&self, user_id: UserId, subject: &str, message: &str) -> Result<Ticket> {
        let mut inner = lock(&self.inner, "tickets")?;
        inner.next_id += 1;
        let now = Utc::now();
        let ticket = Ticket {
            id: inner.next_id,
            user_id,
            subject: subject.to_string(),
            message: message.to_string(),
            response: None,
            response_by: None,
            user_replies: Vec::new(),
            status: TicketStatus::Received,
            created_at: now,
            updated_at: now,
        };
        inner.by_id.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get(&self, id: u64) -> Result<Option<Ticket>> {
        Ok(lock(&self.inner, "tickets")?.by_id.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Ticket>> {
        Ok(lock(&self.inner, "tickets")?.by_id.values().cloned().collect())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Ticket>> {
        Ok(lock(&self.inner, "tickets")?
            .by_id
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: u64, status: TicketStatus) -> Result<()> {
        self.update(id, |t| t.status = status).map(|_| ())
    }

    async fn add_response(&self, id: u64, response: &str, by: UserId) -> Result<Ticket> {
        self.update(id, |t| {
            t.response = Some(response.to_string());
            t.response_by = Some(by);
            t.status = TicketStatus::Answered;
        })
    }

    async fn add_user_reply(&self, id: u64, reply: &str) -> Result<Ticket> {
        self.update(id, |t| {
            t.user_replies.push(reply.to_string());
            t.status = TicketStatus::InProgress;
        })
    }
}
